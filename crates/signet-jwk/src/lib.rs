//! # signet-jwk - auto-refreshing verification key sets
//!
//! A concurrent cache of verification key sets keyed by source URL. URLs are
//! registered up front with per-target options; afterwards [`KeySetCache::fetch`]
//! returns the cached set, performing the first HTTP fetch on demand while
//! coalescing concurrent cold-cache callers into a single request.
//!
//! A single background task refreshes every registered URL on a schedule
//! derived from the response's `Cache-Control`/`Expires` headers (or an
//! explicitly configured interval), floored at a per-target minimum. A
//! refresh failure is recorded for observability but never evicts the
//! previously cached value.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use signet_jwk::{BackoffPolicy, KeySetCache, TargetOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> signet_jwk::Result<()> {
//! let lifetime = CancellationToken::new();
//! let cache = KeySetCache::new(lifetime.clone());
//!
//! cache.configure("https://auth.example.com/jwks.json", TargetOptions {
//!     min_refresh_interval: Some(Duration::from_secs(15 * 60)),
//!     fetch_backoff: BackoffPolicy::Constant {
//!         interval: Duration::from_secs(1),
//!         max_attempts: 3,
//!     },
//!     ..TargetOptions::default()
//! });
//!
//! let keys = cache.fetch("https://auth.example.com/jwks.json").await?;
//! if let Some(key) = keys.lookup_key_id("2024-signing-key") {
//!     // hand the key material to a verifier
//!     let _ = key;
//! }
//!
//! // Shuts down the background worker
//! lifetime.cancel();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`keyset`] - the key-set data model
//! - [`fetch`] - single-GET pipeline and refresh-interval computation
//! - [`backoff`] - retry pacing policies
//! - [`registry`] - the cache, coalescing, and the background worker
//! - [`error`] - the failure taxonomy

pub mod backoff;
pub mod error;
pub mod fetch;
pub mod keyset;
pub mod registry;

pub use backoff::BackoffPolicy;
pub use error::{RegistryError, Result};
pub use fetch::{FetchOutcome, fetch_key_set_document, next_refresh_interval};
pub use keyset::{Jwk, KeySet};
pub use registry::{DEFAULT_MIN_REFRESH_INTERVAL, KeySetCache, TargetOptions, TargetSnapshot};
