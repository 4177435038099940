//! Cooperative cancellation for pipeline runs.
//!
//! A [`CancellationToken`] is checked at every attempt boundary and wakes a
//! task that is waiting out its retry delay.

mod token;

pub use token::CancellationToken;
