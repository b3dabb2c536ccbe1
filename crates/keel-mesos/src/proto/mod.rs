//! JSON message types of the v1 scheduler API.
//!
//! Field names follow the manager's protobuf JSON mapping (snake_case
//! fields, SCREAMING_CASE enums). Unknown fields are ignored on decode.

mod common;
pub use common::*;

mod task;
pub use task::*;

mod call;
pub use call::*;

mod event;
pub use event::*;
