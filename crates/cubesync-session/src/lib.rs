//! Player state registry for cubesync.
//!
//! Both sides of a cubesync session keep a [`SessionRegistry`]: the server's
//! is authoritative and feeds every snapshot, each client's mirrors the most
//! recent snapshot plus its own locally-owned state.
//!
//! # How it fits in the stack
//!
//! ```text
//! Reconciliation (above)  ← merges updates and snapshots into the registry
//!     ↕
//! Session Layer (this crate)  ← one PlayerState per identifier
//!     ↕
//! Protocol Layer (below)  ← provides PlayerId, PlayerState
//! ```

mod error;
mod registry;

pub use error::SessionError;
pub use registry::SessionRegistry;
