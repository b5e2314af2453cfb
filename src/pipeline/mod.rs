//! # Run Pipeline
//!
//! ## Overview
//!
//! Everything between "poll this source" and "here is what happened":
//!
//! - **Outcome types**: [`FetchReport`] from integrations in,
//!   [`RunOutcome`] with full error provenance out
//! - **Run log**: bounded in-memory history that feeds health scoring
//! - **Orchestrator**: admission, rate limiting, timeout, retry, and
//!   post-run bookkeeping around every operation
//! - **Coordinator**: bounded-concurrency poll cycles over the catalog,
//!   plus restart persistence for the resilience layer
//! - **State store**: snapshot persistence behind a small trait, with
//!   JSON-file and in-memory implementations
//!
//! ## Architecture
//!
//! The orchestrator is the only writer of run outcomes and the only
//! caller of breaker verdict methods, which keeps the admission protocol
//! (admit, then exactly one of release or record) in one place.
//!
//! ## Usage
//!
//! Integrations implement [`SourceFetcher`] and nothing else; the
//! pipeline owns every resilience decision around the call:
//!
//! ```rust
//! use async_trait::async_trait;
//! use vigil_core::error::Result;
//! use vigil_core::pipeline::{FetchReport, SourceFetcher};
//!
//! struct StaticFetcher;
//!
//! #[async_trait]
//! impl SourceFetcher for StaticFetcher {
//!     async fn fetch(&self) -> Result<FetchReport> {
//!         Ok(FetchReport::records(3))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let report = StaticFetcher.fetch().await.unwrap();
//! assert_eq!(report.record_count, 3);
//! # });
//! ```

pub mod coordinator;
pub mod orchestrator;
pub mod outcome;
pub mod run_log;
pub mod state_store;

pub use coordinator::{CycleReport, PollCoordinator, SourceFetcher};
pub use orchestrator::LifecycleOrchestrator;
pub use outcome::{ErrorDescriptor, FetchReport, RunOutcome};
pub use run_log::{InMemoryRunLog, RunLog};
pub use state_store::{
    InMemoryStateStore, JsonFileStateStore, ResilienceSnapshot, StateStore,
};
