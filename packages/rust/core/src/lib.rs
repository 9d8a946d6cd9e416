//! Core orchestration and domain logic for pagesmith.
//!
//! This crate ties the remote client, block processor, and content store
//! together into the two end-to-end workflows: `sync` (remote -> store) and
//! `build` (store -> site, incrementally).

pub mod build_cache;
pub mod incremental;
pub mod indexes;
pub mod progress;
pub mod sync;

pub use build_cache::{BuildCache, DependencySnapshot, GeneratedFile};
pub use incremental::{BuildReport, IncrementalBuilder, SiteContext, SiteRenderer};
pub use indexes::{IndexReport, write_indexes};
pub use progress::{ProgressReporter, SilentProgress};
pub use sync::{SyncOrchestrator, SyncSummary};
