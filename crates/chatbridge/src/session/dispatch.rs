//! Recurring-send tick task.
//!
//! One task per active schedule. The task fires one full interval after
//! installation and then on every interval boundary until its cancel handle
//! is dropped. Ticks gate on a state snapshot (not the actor), so they never
//! queue behind an in-flight manual send; a failing tick is logged and
//! swallowed and the schedule keeps running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

use crate::api::SessionState;
use crate::client::AutomationClient;
use crate::store::HistoryStore;

/// The recurring dispatch loop for one schedule.
pub(super) struct ScheduleTick {
    pub tenant_id: String,
    pub destination: String,
    pub body: String,
    pub interval: Duration,
    pub client: Arc<dyn AutomationClient>,
    pub history: Arc<dyn HistoryStore>,
    pub state_rx: watch::Receiver<SessionState>,
}

impl ScheduleTick {
    /// Run until cancelled. Cancellation wins over an elapsed timer, so no
    /// tick starts after the cancel handle is dropped; a tick already
    /// executing completes, audit write included.
    pub(super) async fn run(self, mut cancel_rx: oneshot::Receiver<()>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut cancel_rx => {
                    debug!(tenant_id = %self.tenant_id, "schedule cancelled");
                    break;
                }

                _ = ticker.tick() => {
                    self.fire().await;
                }
            }
        }
    }

    async fn fire(&self) {
        let state = *self.state_rx.borrow();
        if state != SessionState::Ready {
            debug!(
                tenant_id = %self.tenant_id,
                state = %state,
                "skipping scheduled send, session not ready"
            );
            return;
        }

        if let Err(e) = self
            .client
            .send_message(&self.destination, &self.body)
            .await
        {
            warn!(
                tenant_id = %self.tenant_id,
                destination = %self.destination,
                error = %e,
                "scheduled send failed"
            );
            return;
        }

        if let Err(e) = self
            .history
            .append(&self.tenant_id, &self.destination, &self.body)
            .await
        {
            warn!(
                tenant_id = %self.tenant_id,
                destination = %self.destination,
                error = %e,
                "scheduled send dispatched but audit write failed"
            );
        }
    }
}
