//! Persistence gateway for the Voxcast platform.
//!
//! Every state change to a single call goes through one of the atomic
//! mutation operations in [`calls`]; each is a single UPDATE with a
//! compare-and-set guard, which is what serializes webhook-originated and
//! dispatch-originated writes to the same row. The gateway is the single
//! source of truth — callers never hold call state across await points.

pub mod broadcasts;
pub mod calls;
pub mod error;
pub mod optouts;

pub use error::StoreError;
