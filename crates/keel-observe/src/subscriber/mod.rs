//! Supervisor event logging for the runtime's long-lived tasks.

mod view;
pub use view::{Severity, classify, log_event};

mod journal;
pub use journal::{JOURNAL_CAPACITY, Journal};
