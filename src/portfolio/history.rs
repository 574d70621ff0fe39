use std::collections::VecDeque;

use tracing::debug;

use crate::domain::{TradeRecord, TradeStatus};

/// Append-only trade log with a size cap; oldest records are evicted first
#[derive(Debug, Clone)]
pub struct TradeHistory {
    records: VecDeque<TradeRecord>,
    capacity: usize,
    evicted: u64,
}

impl TradeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    pub fn push(&mut self, record: TradeRecord) {
        debug!(
            id = %record.id,
            symbol = %record.symbol,
            status = %record.status,
            "trade recorded"
        );
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
            self.evicted += 1;
        }
    }

    /// Most recent `limit` records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<TradeRecord> {
        let skip = self.records.len().saturating_sub(limit);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn all(&self) -> Vec<TradeRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn count_by_status(&self, status: TradeStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
