//! Job scheduling and execution engine.
//!
//! A [`JobRunner`] pass reclaims stale locks, claims a batch of due jobs from
//! a [`JobStore`], dispatches each to its handler and applies the retry
//! policy in [`queue`]. Handlers drive the per-platform providers and the
//! discovery pipeline in [`discovery`].

pub mod clock;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod queue;
pub mod runner;
pub mod sounds;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use discovery::{DiscoveryConfig, DiscoveryResult};
pub use error::{JobError, JobErrorKind, RunnerError, StoreError};
pub use queue::{JobCompletion, QueuePolicy};
pub use runner::{JobOutcome, JobRunner, RunSummary, RunnerConfig};
pub use sounds::{
    enqueue_due_refreshes, enqueue_sound_job, track_sound, TrackSoundRequest, TrackedSoundResult,
};
pub use store::{JobStore, MemoryStore, PgStore};
