//! # Resilience Module
//!
//! Fault tolerance primitives protecting every outbound call the runtime
//! makes: circuit breakers isolate failing sources, token buckets pace
//! polite clients, and the retry executor absorbs transient faults with
//! bounded backoff.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: Per-source three-state breakers with bounded
//!   half-open trial calls, owned by a name-keyed registry
//! - **Rate Limiting**: Lazily refilled token buckets, non-blocking
//! - **Retry**: Exponential backoff with jitter, driven by error class
//! - **Persistence**: Breaker and bucket state snapshots survive restarts
//!
//! ## Usage
//!
//! ```rust
//! use vigil_core::resilience::{BreakerConfig, BreakerRegistry};
//!
//! let registry = BreakerRegistry::new(BreakerConfig::default());
//!
//! // Ask before calling, report afterwards
//! if registry.admit("fr-bulk").is_allowed() {
//!     // ... dial the dependency ...
//!     registry.record_success("fr-bulk");
//! }
//! ```

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    Admission, BreakerConfig, BreakerSnapshot, BreakerStatus, BreakerTransition, CircuitBreaker,
    CircuitState,
};
pub use rate_limiter::{BucketSnapshot, RateLimitConfig, RateLimiter};
pub use registry::BreakerRegistry;
pub use retry::{AttemptFailure, RetryExecutor, RetryPolicy, RetryReport};
