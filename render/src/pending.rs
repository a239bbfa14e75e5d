//! Placeholder shown while a message exists but has no content yet.
//!
//! The dot cycle is driven by a [`PendingTicker`] owned by whatever is displaying the pending
//! message. Start it when the message appears, drop or [`PendingTicker::cancel`] it when the
//! display goes away; the task never outlives its owner.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default interval between placeholder phases.
pub const PENDING_TICK_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingPlaceholder {
    #[default]
    One,
    Two,
    Three,
}

impl PendingPlaceholder {
    pub fn dots(self) -> &'static str {
        match self {
            PendingPlaceholder::One => ".",
            PendingPlaceholder::Two => "..",
            PendingPlaceholder::Three => "...",
        }
    }

    #[must_use]
    pub fn advance(self) -> Self {
        match self {
            PendingPlaceholder::One => PendingPlaceholder::Two,
            PendingPlaceholder::Two => PendingPlaceholder::Three,
            PendingPlaceholder::Three => PendingPlaceholder::One,
        }
    }

    /// Placeholder for a 1-based dot count; out-of-range counts wrap.
    pub fn from_dot_count(count: usize) -> Self {
        match count.saturating_sub(1) % 3 {
            0 => PendingPlaceholder::One,
            1 => PendingPlaceholder::Two,
            _ => PendingPlaceholder::Three,
        }
    }
}

/// Periodic task advancing a shared [`PendingPlaceholder`].
pub struct PendingTicker {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PendingTicker {
    /// Spawn the ticker on the current tokio runtime.
    ///
    /// The receiver starts at [`PendingPlaceholder::One`] and changes once per `period`. It
    /// observes a closed channel after the ticker is cancelled.
    pub fn start(period: Duration) -> (Self, watch::Receiver<PendingPlaceholder>) {
        let (tx, rx) = watch::channel(PendingPlaceholder::default());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        tx.send_modify(|phase| *phase = phase.advance());
                    }
                }
            }
            tracing::trace!("pending placeholder ticker stopped");
        });
        (
            Self {
                cancel,
                handle: Some(handle),
            },
            rx,
        )
    }

    /// Stop ticking and wait for the task to exit.
    pub async fn cancel(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PendingTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn phases_cycle() {
        let mut phase = PendingPlaceholder::default();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(phase.dots());
            phase = phase.advance();
        }
        assert_eq!(seen, vec![".", "..", "...", "."]);
    }

    #[test]
    fn from_dot_count_wraps() {
        assert_eq!(PendingPlaceholder::from_dot_count(0), PendingPlaceholder::One);
        assert_eq!(PendingPlaceholder::from_dot_count(2), PendingPlaceholder::Two);
        assert_eq!(PendingPlaceholder::from_dot_count(3), PendingPlaceholder::Three);
        assert_eq!(PendingPlaceholder::from_dot_count(4), PendingPlaceholder::One);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_advances_once_per_period() {
        let (ticker, mut rx) = PendingTicker::start(PENDING_TICK_PERIOD);
        let mut seen = vec![rx.borrow_and_update().dots()];
        for _ in 0..3 {
            rx.changed().await.expect("ticker alive");
            seen.push(rx.borrow_and_update().dots());
        }
        assert_eq!(seen, vec![".", "..", "...", "."]);
        ticker.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_closes_the_channel() {
        let (ticker, mut rx) = PendingTicker::start(PENDING_TICK_PERIOD);
        ticker.cancel().await;
        assert!(rx.changed().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_ticker_stops_it() {
        let (ticker, mut rx) = PendingTicker::start(PENDING_TICK_PERIOD);
        drop(ticker);
        // Drain a possible in-flight change, then the sender must be gone.
        while rx.changed().await.is_ok() {}
        assert!(rx.has_changed().is_err());
    }
}
