//! Client for the remote content API.
//!
//! Every request goes through an [`ApiExecutor`]: a fixed-window
//! [`RateLimiter`] plus retry with exponential backoff. [`ContentClient`]
//! handles pagination, publish-date backfill, and block fetching, and
//! implements [`ContentSource`], the seam the sync orchestrator depends on.

pub mod client;
pub mod properties;
pub mod rate_limit;
pub mod retry;

pub use client::{ContentClient, ContentSource};
pub use properties::{PropertyError, extract_metadata};
pub use rate_limit::RateLimiter;
pub use retry::{ApiExecutor, RetryPolicy};
