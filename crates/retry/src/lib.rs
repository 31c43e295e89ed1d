//! Conflict-retry updates for versioned resources.
//!
//! The one place in Keel where anything is retried. [`ConflictRetry`] runs
//! a fetch → mutate → write cycle against a
//! [`ResourceClient`](keel_client::ResourceClient), re-fetching after every
//! conflict so the write always carries the latest version token. The
//! [`RetryPolicy`] bounds the number of attempts and paces them with
//! exponential backoff; an optional deadline bounds the whole operation.
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_retry::{ConflictRetry, RetryPolicy};
//!
//! let updated = ConflictRetry::new(&deployments, "hello-world")
//!     .policy(RetryPolicy::default())
//!     .timeout(Duration::from_secs(30))
//!     .run(|mut deployment| {
//!         deployment.spec["replicas"] = 1.into();
//!         deployment
//!     })
//!     .await?;
//! ```

pub mod errors;
pub mod executor;
pub mod policy;

#[cfg(test)]
mod tests;

pub use errors::UpdateError;
pub use executor::{retry_on_conflict, ConflictRetry};
pub use policy::{PolicyError, RetryPolicy};
