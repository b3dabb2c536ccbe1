//! Domain types shared by the keel scheduler crates.
//!
//! Everything here is plain data: task records and their container
//! descriptors, lifecycle states, roles and the keys under which records
//! live in the persisted store.

mod domain;
pub use domain::*;

pub mod keys;
