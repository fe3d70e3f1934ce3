//! Timing for cubesync's single-threaded update model.
//!
//! Two pieces:
//!
//! - [`FrameScheduler`] paces the frame loop. Each frame the owner drains
//!   every pending transport event and polls its cadences. Inbound dispatch
//!   is never interval-gated.
//! - [`Cadence`] is a restartable fixed-interval timer polled with the
//!   frame's `now`. Broadcast, self-report, drop-check and recolor each own
//!   one and run independently of the frame rate and of each other.
//!
//! # Integration
//!
//! ```ignore
//! let mut frames = FrameScheduler::with_rate(60);
//! loop {
//!     tokio::select! {
//!         _ = tokio::signal::ctrl_c() => break,
//!         frame = frames.wait_for_frame() => {
//!             server.update(frame.now);
//!             frames.record_frame_end();
//!         }
//!     }
//! }
//! ```
//!
//! All instants are [`tokio::time::Instant`] so tests can drive them with a
//! paused clock.

mod cadence;
mod frame;

pub use cadence::Cadence;
pub use frame::{FrameConfig, FrameInfo, FrameScheduler};
