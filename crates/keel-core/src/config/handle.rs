use std::sync::{Arc, Mutex, PoisonError};

use keel_model::Role;
use tokio::sync::watch;
use tracing::info;

use super::Config;

/// Single writer of the configuration.
///
/// Readers take an [`Arc<Config>`] snapshot and keep it for the duration of
/// one tick or one event; writers publish a fresh snapshot and never touch
/// one that was handed out.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<Config>>>,
    parked: Arc<Mutex<Option<[u32; 3]>>>,
}

impl ConfigHandle {
    pub fn new(cfg: Config) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(cfg));
        Self {
            tx: Arc::new(tx),
            parked: Arc::new(Mutex::new(None)),
        }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.tx.subscribe()
    }

    /// Publish a modified copy of the current snapshot.
    pub fn update(&self, f: impl FnOnce(&mut Config)) {
        self.tx.send_modify(|current| {
            let mut next = Config::clone(current);
            f(&mut next);
            *current = Arc::new(next);
        });
    }

    /// Set the desired instance count of `role`.
    ///
    /// While the cluster is shut down the count is remembered and applied
    /// by [`start`](Self::start).
    pub fn scale(&self, role: Role, n: u32) {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(counts) = parked.as_mut() {
            counts[role_index(role)] = n;
            info!(%role, instances = n, "scale recorded while shut down");
            return;
        }
        drop(parked);

        self.update(|cfg| cfg.set_desired(role, n));
        info!(%role, instances = n, "desired instances changed");
    }

    /// Set every desired count to zero, remembering the current counts.
    /// Idempotent.
    pub fn shutdown(&self) {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        if parked.is_some() {
            return;
        }
        let cfg = self.snapshot();
        *parked = Some(Role::ALL.map(|r| cfg.desired(r)));
        drop(parked);

        self.update(|cfg| Role::ALL.iter().for_each(|r| cfg.set_desired(*r, 0)));
        info!("cluster shutdown requested");
    }

    /// Restore the counts saved by [`shutdown`](Self::shutdown).
    pub fn start(&self) {
        let counts = self
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(counts) = counts else {
            return;
        };

        self.update(|cfg| {
            for role in Role::ALL {
                cfg.set_desired(role, counts[role_index(role)]);
            }
        });
        info!("cluster start requested");
    }

    pub fn is_shut_down(&self) -> bool {
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

fn role_index(role: Role) -> usize {
    match role {
        Role::Datastore => 0,
        Role::Server => 1,
        Role::Agent => 2,
    }
}
