//! Recovery policy for supervised connections

pub mod backoff;

pub use backoff::{BackoffConfig, BackoffStrategy, ExponentialBackoff};
