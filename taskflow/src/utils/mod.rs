//! Utility functions for timestamp handling.

pub mod timestamps;

pub use timestamps::{format_timestamp, iso_timestamp, now_utc, Timestamp};
