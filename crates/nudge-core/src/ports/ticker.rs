//! Ticker port - tick source for the scheduler loop.
//!
//! 本番は `IntervalTicker`（tokio interval）、テストは `ChannelTicker` で
//! tick を手動で送り込みます。

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

/// Ticker は次の tick まで待つ
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. `false` means the source is exhausted and the
    /// loop should stop.
    async fn tick(&mut self) -> bool;
}

/// Fixed-interval ticks. The first tick fires immediately.
///
/// A slow tick delays the following ones instead of firing a burst to catch up.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticks on demand: one tick per message. Ends when every sender is dropped.
pub struct ChannelTicker {
    rx: mpsc::Receiver<()>,
}

impl ChannelTicker {
    pub fn new(buffer: usize) -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl Ticker for ChannelTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}
