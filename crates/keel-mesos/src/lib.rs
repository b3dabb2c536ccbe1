//! Codec and client for the cluster manager's v1 scheduler HTTP API.
//!
//! - [`proto`] holds the JSON message types (`Call` outbound, `Event` inbound).
//! - [`recordio`] splits the subscription stream into records.
//! - [`convert`] translates task records into launchable `TaskInfo`s.
//! - [`SchedulerClient`] is the seam the scheduler core talks through;
//!   [`HttpSchedulerClient`] is its HTTP implementation.

pub mod proto;
pub mod recordio;
pub mod convert;

mod client;
pub use client::{EventStream, HttpSchedulerClient, SchedulerClient, SchedulerEndpoint};

mod error;
pub use error::MesosError;
