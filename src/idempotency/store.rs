//! Idempotency cache storage.
//!
//! Maps client-supplied keys to captured responses. Entries expire after the
//! configured window; expired entries are purged lazily whenever the map is
//! accessed, never by a background task. A slot can also be *in flight*: the
//! first caller for a key claims it and executes, concurrent callers bearing
//! the same key wait for the claim to settle instead of racing the handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use time::{Duration, OffsetDateTime};
use tokio::sync::watch;

use crate::util::clock::Clock;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "idempotency::store";

/// A response captured for replay. Replaced whole on overwrite, never
/// mutated in place.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub status: u16,
    pub body: serde_json::Value,
    pub recorded_at: OffsetDateTime,
}

enum Slot {
    /// Claimed by a request still executing. The sender is dropped when the
    /// claim settles, which wakes every subscribed waiter.
    InFlight {
        claimed_at: OffsetDateTime,
        settled: watch::Sender<()>,
    },
    Done(CachedEntry),
}

/// Outcome of [`IdempotencyStore::claim`].
pub enum Claim {
    /// Key was vacant; the caller owns the claim and must settle the ticket.
    Fresh(ClaimTicket),
    /// Key has a recorded response; serve it without running the handler.
    Replay(CachedEntry),
    /// Another request holds the claim; await the receiver, then re-claim.
    Pending(watch::Receiver<()>),
}

pub struct IdempotencyStore {
    entries: RwLock<HashMap<String, Slot>>,
    ttl: Duration,
    max_body_bytes: usize,
    clock: Arc<dyn Clock>,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration, max_body_bytes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_body_bytes,
            clock,
        }
    }

    /// Largest response body the capture middleware will buffer.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Return the recorded response for `key`, purging expired entries first.
    pub fn lookup(&self, key: &str) -> Option<CachedEntry> {
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "lookup");
        Self::purge_expired(&mut entries, now, self.ttl);
        match entries.get(key) {
            Some(Slot::Done(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Unconditionally record a response for `key`, overwriting any prior
    /// slot. Dropping a replaced in-flight sender wakes its waiters.
    pub fn insert(&self, key: &str, status: u16, body: serde_json::Value) {
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "insert");
        Self::purge_expired(&mut entries, now, self.ttl);
        entries.insert(
            key.to_string(),
            Slot::Done(CachedEntry {
                status,
                body,
                recorded_at: now,
            }),
        );
    }

    /// Atomically resolve what a request bearing `key` should do.
    pub fn claim(self: &Arc<Self>, key: &str) -> Claim {
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "claim");
        Self::purge_expired(&mut entries, now, self.ttl);
        match entries.get(key) {
            Some(Slot::Done(entry)) => Claim::Replay(entry.clone()),
            Some(Slot::InFlight { settled, .. }) => Claim::Pending(settled.subscribe()),
            None => {
                let (settled, _) = watch::channel(());
                entries.insert(
                    key.to_string(),
                    Slot::InFlight {
                        claimed_at: now,
                        settled,
                    },
                );
                Claim::Fresh(ClaimTicket {
                    store: Arc::clone(self),
                    key: key.to_string(),
                    settled: AtomicBool::new(false),
                })
            }
        }
    }

    /// Number of live slots. Test hook.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the slot for `key` if it is still in flight.
    fn release(&self, key: &str) {
        let mut entries = rw_write(&self.entries, SOURCE, "release");
        if matches!(entries.get(key), Some(Slot::InFlight { .. })) {
            entries.remove(key);
        }
    }

    fn purge_expired(entries: &mut HashMap<String, Slot>, now: OffsetDateTime, ttl: Duration) {
        entries.retain(|_, slot| {
            let stamped_at = match slot {
                Slot::Done(entry) => entry.recorded_at,
                Slot::InFlight { claimed_at, .. } => *claimed_at,
            };
            now - stamped_at <= ttl
        });
    }
}

/// Owned claim on a key. Settles exactly once: either [`fulfill`] records a
/// response, or [`abort`]/drop releases the claim so a later request can try
/// again. Dropping covers handler faults and client disconnects mid-capture.
///
/// [`fulfill`]: ClaimTicket::fulfill
/// [`abort`]: ClaimTicket::abort
pub struct ClaimTicket {
    store: Arc<IdempotencyStore>,
    key: String,
    settled: AtomicBool,
}

impl ClaimTicket {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fulfill(&self, status: u16, body: serde_json::Value) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            self.store.insert(&self.key, status, body);
        }
    }

    pub fn abort(&self) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            self.store.release(&self.key);
        }
    }
}

impl Drop for ClaimTicket {
    fn drop(&mut self) {
        if !self.settled.load(Ordering::SeqCst) {
            self.store.release(&self.key);
        }
    }
}

/// Clonable handle attached to a response so the capture middleware can
/// settle the claim taken by the guard.
#[derive(Clone)]
pub struct PendingCapture {
    ticket: Arc<ClaimTicket>,
}

impl PendingCapture {
    pub fn new(ticket: ClaimTicket) -> Self {
        Self {
            ticket: Arc::new(ticket),
        }
    }

    pub fn key(&self) -> &str {
        self.ticket.key()
    }

    pub fn fulfill(&self, status: u16, body: serde_json::Value) {
        self.ticket.fulfill(status, body);
    }

    pub fn abort(&self) {
        self.ticket.abort();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use crate::util::clock::ManualClock;

    use super::*;

    fn store_with_clock() -> (Arc<IdempotencyStore>, ManualClock) {
        let clock = ManualClock::new(datetime!(2024-06-01 00:00 UTC));
        let store = Arc::new(IdempotencyStore::new(
            Duration::hours(24),
            1024 * 1024,
            Arc::new(clock.clone()),
        ));
        (store, clock)
    }

    #[test]
    fn lookup_of_unknown_key_is_absent() {
        let (store, _) = store_with_clock();
        assert!(store.lookup("abc123").is_none());
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let (store, _) = store_with_clock();
        store.insert("abc123", 200, json!({"report_type": "Stock Report"}));
        let entry = store.lookup("abc123").expect("entry recorded");
        assert_eq!(entry.status, 200);
        assert_eq!(entry.body["report_type"], "Stock Report");
    }

    #[test]
    fn insert_overwrites_existing_entry() {
        let (store, clock) = store_with_clock();
        store.insert("k", 200, json!({"v": 1}));
        clock.advance(Duration::hours(1));
        store.insert("k", 201, json!({"v": 2}));
        let entry = store.lookup("k").expect("entry recorded");
        assert_eq!(entry.status, 201);
        assert_eq!(entry.body["v"], 2);
        assert_eq!(entry.recorded_at, datetime!(2024-06-01 01:00 UTC));
    }

    #[test]
    fn entries_expire_after_window() {
        let (store, clock) = store_with_clock();
        store.insert("k", 200, json!({}));
        clock.advance(Duration::hours(23));
        assert!(store.lookup("k").is_some());
        clock.advance(Duration::hours(2));
        assert!(store.lookup("k").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn claim_on_vacant_key_is_fresh() {
        let (store, _) = store_with_clock();
        assert!(matches!(store.claim("k"), Claim::Fresh(_)));
    }

    #[test]
    fn claim_on_recorded_key_replays() {
        let (store, _) = store_with_clock();
        store.insert("k", 200, json!({"x": 1}));
        match store.claim("k") {
            Claim::Replay(entry) => assert_eq!(entry.body["x"], 1),
            _ => panic!("expected replay"),
        }
    }

    #[test]
    fn concurrent_claim_is_pending_until_settled() {
        let (store, _) = store_with_clock();
        let ticket = match store.claim("k") {
            Claim::Fresh(ticket) => ticket,
            _ => panic!("expected fresh claim"),
        };
        assert!(matches!(store.claim("k"), Claim::Pending(_)));
        ticket.fulfill(200, json!({"done": true}));
        match store.claim("k") {
            Claim::Replay(entry) => assert_eq!(entry.status, 200),
            _ => panic!("expected replay after fulfill"),
        }
    }

    #[test]
    fn dropping_unsettled_ticket_releases_claim() {
        let (store, _) = store_with_clock();
        {
            let _ticket = match store.claim("k") {
                Claim::Fresh(ticket) => ticket,
                _ => panic!("expected fresh claim"),
            };
        }
        assert!(matches!(store.claim("k"), Claim::Fresh(_)));
    }

    #[test]
    fn abort_releases_claim_without_recording() {
        let (store, _) = store_with_clock();
        let ticket = match store.claim("k") {
            Claim::Fresh(ticket) => ticket,
            _ => panic!("expected fresh claim"),
        };
        ticket.abort();
        assert!(store.lookup("k").is_none());
        assert!(matches!(store.claim("k"), Claim::Fresh(_)));
    }

    #[tokio::test]
    async fn settling_wakes_pending_waiter() {
        let (store, _) = store_with_clock();
        let ticket = match store.claim("k") {
            Claim::Fresh(ticket) => ticket,
            _ => panic!("expected fresh claim"),
        };
        let mut rx = match store.claim("k") {
            Claim::Pending(rx) => rx,
            _ => panic!("expected pending claim"),
        };
        ticket.fulfill(201, json!({"joined": true}));
        // Sender dropped on settle; changed() resolves either way.
        let _ = rx.changed().await;
        match store.claim("k") {
            Claim::Replay(entry) => assert_eq!(entry.status, 201),
            _ => panic!("expected replay for joiner"),
        }
    }

    #[test]
    fn stale_in_flight_claim_is_purged() {
        let (store, clock) = store_with_clock();
        let ticket = match store.claim("k") {
            Claim::Fresh(ticket) => ticket,
            _ => panic!("expected fresh claim"),
        };
        clock.advance(Duration::hours(25));
        assert!(matches!(store.claim("k"), Claim::Fresh(_)));
        drop(ticket);
    }
}
