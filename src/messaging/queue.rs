//! Message Queue - per-recipient priority inbox

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, warn};

use super::message::{Message, Priority};
use crate::error::{QuorumError, Result};

/// Wraps a message with its arrival sequence for FIFO tie-breaking
#[derive(Debug)]
struct QueuedMessage {
    message: Message,
    sequence: u64,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.message.priority == other.message.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap: higher priority first, then lower sequence first
        match self.message.priority.cmp(&other.message.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ord => ord,
        }
    }
}

/// Bounded priority inbox. Pops CRITICAL before HIGH before MEDIUM before
/// LOW; equal priorities come out in arrival order.
pub struct MessageQueue {
    heap: BinaryHeap<QueuedMessage>,
    sequence_counter: u64,
    max_size: usize,
    enqueued_count: u64,
    dequeued_count: u64,
    dropped_count: u64,
}

impl MessageQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            sequence_counter: 0,
            max_size: max_size.max(1),
            enqueued_count: 0,
            dequeued_count: 0,
            dropped_count: 0,
        }
    }

    /// Add a message. When full, the newest lowest-priority message is
    /// evicted if the incoming one outranks it; otherwise the incoming
    /// message is refused.
    pub fn enqueue(&mut self, message: Message) -> Result<()> {
        if self.heap.len() >= self.max_size {
            let lowest = self
                .heap
                .iter()
                .min()
                .map(|q| (q.message.priority, q.sequence));
            match lowest {
                Some((priority, sequence)) if message.priority > priority => {
                    self.remove_sequence(sequence);
                    self.dropped_count += 1;
                    warn!(
                        recipient = %message.to,
                        evicted_priority = %priority,
                        incoming_priority = %message.priority,
                        "inbox full, evicted lowest priority message"
                    );
                }
                _ => {
                    self.dropped_count += 1;
                    return Err(QuorumError::InboxFull {
                        recipient: message.to,
                        capacity: self.max_size,
                    });
                }
            }
        }

        let sequence = self.sequence_counter;
        self.sequence_counter += 1;

        debug!(
            id = %message.id,
            from = %message.from,
            priority = %message.priority,
            "message enqueued"
        );

        self.heap.push(QueuedMessage { message, sequence });
        self.enqueued_count += 1;
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<Message> {
        let next = self.heap.pop()?;
        self.dequeued_count += 1;
        Some(next.message)
    }

    /// Drain everything in delivery order
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(message) = self.dequeue() {
            out.push(message);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn remove_sequence(&mut self, sequence: u64) {
        let items = std::mem::take(&mut self.heap).into_vec();
        self.heap = items
            .into_iter()
            .filter(|q| q.sequence != sequence)
            .collect();
    }

    pub fn stats(&self) -> QueueStats {
        let mut counts = [0usize; 4];
        for item in self.heap.iter() {
            let idx = match item.message.priority {
                Priority::Critical => 0,
                Priority::High => 1,
                Priority::Medium => 2,
                Priority::Low => 3,
            };
            counts[idx] += 1;
        }
        QueueStats {
            current_size: self.heap.len(),
            max_size: self.max_size,
            enqueued_total: self.enqueued_count,
            dequeued_total: self.dequeued_count,
            dropped_total: self.dropped_count,
            critical_count: counts[0],
            high_count: counts[1],
            medium_count: counts[2],
            low_count: counts[3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueueStats {
    pub current_size: usize,
    pub max_size: usize,
    pub enqueued_total: u64,
    pub dequeued_total: u64,
    pub dropped_total: u64,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Inbox[{}/{}, enq={}, deq={}, drop={}, C={}/H={}/M={}/L={}]",
            self.current_size,
            self.max_size,
            self.enqueued_total,
            self.dequeued_total,
            self.dropped_total,
            self.critical_count,
            self.high_count,
            self.medium_count,
            self.low_count
        )
    }
}
