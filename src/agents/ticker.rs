//! Cancellable evaluation ticker for an agent

use std::time::Duration;

use futures::stream::{self, AbortHandle, Abortable, BoxStream, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};

/// Stream of agent ids, one per evaluation period. Ends once aborted.
pub type AgentTicker = Abortable<BoxStream<'static, String>>;

/// Build a ticker firing every `period`, first tick one period from now
pub fn agent_ticker(agent_id: &str, period: Duration) -> (AgentTicker, AbortHandle) {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ticks = stream::unfold(
        (interval, agent_id.to_string()),
        |(mut interval, id)| async move {
            interval.tick().await;
            Some((id.clone(), (interval, id)))
        },
    )
    .boxed();

    stream::abortable(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_aborted() {
        let (mut ticker, handle) = agent_ticker("a1", Duration::from_millis(100));
        assert_eq!(ticker.next().await.as_deref(), Some("a1"));
        assert_eq!(ticker.next().await.as_deref(), Some("a1"));
        handle.abort();
        assert_eq!(ticker.next().await, None);
    }
}
