//! In-memory job registry
//!
//! Maps deterministic job keys to running or finished jobs. Each entry owns
//! the job's [`ProgressBus`](crate::progress::ProgressBus) and cancel token.
//! Finished jobs stay readable until the eviction sweeper drops them after
//! a period without reads.

pub mod error;
pub mod eviction;
pub mod keys;
pub mod store;

pub use error::{RegistryError, Result};
pub use eviction::spawn_sweeper;
pub use keys::{JobSpec, OutputFormat, canonical_url, job_key};
pub use store::{JobEntry, JobRegistry, JobSnapshot, JobStatus, RegistryStats};
