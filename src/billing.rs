//! Connection-time billing
//!
//! A session is charged a fixed cost when the channel opens and the same cost
//! again for every full interval spent connected. Charges reach the external
//! credit balance only through the delta callback; the meter never reads it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Callback applying a (negative) delta to the external credit balance
pub type CreditSink = Arc<dyn Fn(i64) + Send + Sync>;

/// Meters connection time against the credit balance
pub struct BillingMeter {
    /// Cost charged at open and per full interval
    cost: i64,

    /// Wall-clock interval between recurring charges
    interval: Duration,

    sink: CreditSink,

    /// Handle for the recurring-charge task while connected
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl BillingMeter {
    pub fn new(cost: i64, interval: Duration, sink: CreditSink) -> Self {
        Self {
            cost,
            interval,
            sink,
            timer: Mutex::new(None),
        }
    }

    /// Charge the opening cost and start the recurring timer
    ///
    /// Called exactly once per successful connection, on the channel's
    /// `opened` event. The first recurring charge lands one full interval
    /// after open; the opening charge itself is issued immediately.
    pub async fn on_open(&self) {
        (self.sink)(-self.cost);
        info!("Session opened, charged {} credits", self.cost);

        let cost = self.cost;
        let interval = self.interval;
        let sink = Arc::clone(&self.sink);

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval_at(start + interval, interval);
            loop {
                ticker.tick().await;
                (sink)(-cost);
                debug!("Interval elapsed, charged {} credits", cost);
            }
        });

        let mut timer = self.timer.lock().await;
        if let Some(previous) = timer.replace(task) {
            previous.abort();
        }
    }

    /// Cancel the recurring timer; no charge for a partial interval
    ///
    /// Safe to call multiple times and when the meter was never opened.
    pub async fn on_close(&self) {
        if let Some(task) = self.timer.lock().await.take() {
            task.abort();
            debug!("Billing timer cancelled");
        }
    }
}
