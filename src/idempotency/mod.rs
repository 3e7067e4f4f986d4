//! Idempotent request handling.
//!
//! A client that retries a request with the same `Idempotency-Key` header
//! receives the previously produced response instead of re-executing the
//! handler. Three pieces cooperate:
//!
//! - [`store::IdempotencyStore`]: process-local map from key to a captured
//!   response, with lazy time-based eviction and claim-or-join slots.
//! - [`guard::idempotency_guard`]: pre-handler middleware that short-circuits
//!   known keys and claims unknown ones.
//! - [`middleware::capture_responses`]: outer middleware that buffers a
//!   successful response body, records it under the pending key and re-emits
//!   an equivalent response.
//!
//! The cache is in-memory and best-effort: a restart forgets everything.

mod lock;

pub mod guard;
pub mod middleware;
pub mod store;

pub use guard::{IDEMPOTENCY_KEY_HEADER, REPLAYED_HEADER, idempotency_guard};
pub use middleware::capture_responses;
pub use store::{CachedEntry, Claim, IdempotencyStore, PendingCapture};
