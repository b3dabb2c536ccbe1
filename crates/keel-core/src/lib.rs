//! Scheduling and reconciliation engine of the keel framework.
//!
//! The persisted store is the only state shared between the reconcile loop
//! and the event processor; everything else is passed explicitly.

pub mod error;
pub use error::{BuildError, CoreError, StoreError};

pub mod config;
pub use config::{Config, ConfigHandle};

pub mod state;
pub use state::{FileStore, KeyCursor, MemoryStore, Records, TaskStore};

pub mod builder;
pub use builder::{BuildContext, BuilderRouter, TaskBuilder};

pub mod health;
pub use health::{HealthProbe, NetProbe};

pub mod nodes;
pub use nodes::{NodeInfo, NodeView, Readiness, StoredNodes};

pub mod suppress;
pub use suppress::SuppressController;

pub mod engine;
pub use engine::LaunchEngine;

pub mod reconcile;
pub use reconcile::{Reconciler, TickReport};

pub mod control;
pub use control::Operator;

pub mod runtime;
pub use runtime::Runtime;
