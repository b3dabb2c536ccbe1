//! Process-wide suppress/revive signal.
//!
//! Re-evaluated after every reconcile tick and every processed status
//! update. While any record waits for an offer the framework must not be
//! suppressed.

use std::sync::Arc;

use keel_mesos::SchedulerClient;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::state::Records;

pub struct SuppressController {
    client: Arc<dyn SchedulerClient>,
    records: Records,
    suppressed: Mutex<bool>,
}

impl SuppressController {
    /// A fresh subscription is never suppressed.
    pub fn new(client: Arc<dyn SchedulerClient>, records: Records) -> Self {
        Self {
            client,
            records,
            suppressed: Mutex::new(false),
        }
    }

    pub async fn is_suppressed(&self) -> bool {
        *self.suppressed.lock().await
    }

    /// Forget the local signal after the manager reset it (new subscription).
    pub async fn reset(&self) {
        *self.suppressed.lock().await = false;
    }

    /// Ask for offers regardless of the current signal.
    pub async fn revive(&self) -> Result<(), CoreError> {
        let mut suppressed = self.suppressed.lock().await;
        self.client.revive().await?;
        *suppressed = false;
        debug!("offers revived");
        Ok(())
    }

    /// Bring the signal in line with the stored records and return it.
    ///
    /// `created_this_cycle` keeps offers flowing for records written by the
    /// current tick that are not promoted yet.
    pub async fn evaluate(&self, created_this_cycle: bool) -> Result<bool, CoreError> {
        let mut suppressed = self.suppressed.lock().await;
        let pending = self
            .records
            .list_all()
            .await?
            .iter()
            .filter(|r| r.state.is_pending())
            .count();

        if pending > 0 && *suppressed {
            self.client.revive().await?;
            *suppressed = false;
            info!(pending, "pending work, offers revived");
        } else if pending == 0 && !created_this_cycle && !*suppressed {
            self.client.suppress().await?;
            *suppressed = true;
            info!("no pending work, offers suppressed");
        }
        Ok(*suppressed)
    }
}
