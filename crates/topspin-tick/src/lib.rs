//! Update-loop timing for Topspin clients.
//!
//! Every participant runs one logical loop. This crate provides the three
//! timing primitives that loop is built from:
//!
//! - [`FrameScheduler`]: fires frames at a fixed rate and reports loop
//!   time, so all logic reads one clock.
//! - [`TimerQueue`]: one-shot timers keyed by loop time, each with a
//!   [`TimerToken`] that cancels it. Retries and fallbacks are timers,
//!   never sleeping tasks.
//! - [`Cadence`]: an "at most once per interval" gate (snapshot rate).
//!
//! The scheduler sits inside the client's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(event) = link_rx.recv() => { /* dispatch */ }
//!         frame = scheduler.wait_for_frame() => {
//!             for (_, timer) in timers.drain_due(frame.now) { /* fire */ }
//!             scheduler.record_frame_end();
//!         }
//!     }
//! }
//! ```

mod cadence;
mod scheduler;
mod timer;

pub use cadence::Cadence;
pub use scheduler::{FrameConfig, FrameInfo, FrameMetrics, FrameScheduler};
pub use timer::{TimerQueue, TimerToken};
