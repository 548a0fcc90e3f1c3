//! `queue` crate — the delayed-continuation bridge.
//!
//! A delay node never sleeps in-process. It hands a [`ContinuationToken`] to a
//! [`DelayedScheduler`], which delivers the token back to a worker once the
//! delay has elapsed.

pub mod error;
pub mod pg;
pub mod scheduler;
pub mod token;

pub use error::QueueError;
pub use pg::{poll_due_jobs, PgScheduler};
pub use scheduler::{DelayedScheduler, RecordingScheduler, TimerScheduler};
pub use token::ContinuationToken;
