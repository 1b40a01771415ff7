//! Per-client request throttling with a fixed-window counter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::schema::RateLimitConfig;
use crate::observability::metrics;

/// Records inspected when the table is full and a new client arrives.
const EVICTION_SAMPLE: usize = 32;

/// Request count for one client within its current window.
#[derive(Debug, Clone, Copy)]
pub struct ClientRecord {
    pub window_start: Instant,
    pub count: u32,
}

impl ClientRecord {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 1,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) > window
    }

    fn admit(&mut self, now: Instant, window: Duration, max_requests: u32) -> bool {
        if self.is_expired(now, window) {
            *self = Self::new(now);
            return true;
        }

        // Rejections leave the count untouched.
        if self.count >= max_requests {
            return false;
        }

        self.count += 1;
        true
    }
}

struct EvictionCandidate {
    key: String,
    expired: bool,
    inspected: usize,
}

/// Fixed-window rate limiter keyed by client identifier.
///
/// The read-modify-write for one key happens under that key's shard lock,
/// so concurrent requests from one client cannot lose updates. Clients in
/// other shards are not blocked.
pub struct RateLimiter {
    records: DashMap<String, ClientRecord>,
    window: Duration,
    max_requests: u32,
    max_tracked_clients: usize,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            records: DashMap::new(),
            window: Duration::from_millis(config.window_ms),
            max_requests: config.max_requests,
            max_tracked_clients: config.max_tracked_clients.max(1),
        }
    }

    /// Returns true if the request is admitted.
    pub fn admit(&self, client_id: &str) -> bool {
        self.admit_at(client_id, Instant::now())
    }

    /// [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&self, client_id: &str, now: Instant) -> bool {
        if let Some(mut record) = self.records.get_mut(client_id) {
            return record.admit(now, self.window, self.max_requests);
        }

        self.make_room(now);

        match self.records.entry(client_id.to_string()) {
            // Another request from the same client inserted first.
            Entry::Occupied(mut entry) => entry.get_mut().admit(now, self.window, self.max_requests),
            Entry::Vacant(entry) => {
                entry.insert(ClientRecord::new(now));
                true
            }
        }
    }

    /// Remove records whose window has expired. Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.records.len();
        let window = self.window;
        self.records.retain(|_, record| !record.is_expired(now, window));
        before.saturating_sub(self.records.len())
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.records.len()
    }

    /// Current record for `client_id`, if any.
    pub fn record(&self, client_id: &str) -> Option<ClientRecord> {
        self.records.get(client_id).map(|r| *r)
    }

    /// Keep the table under `max_tracked_clients` before inserting a new key.
    ///
    /// Only a bounded sample of records is inspected, so a full table costs
    /// the same per insert regardless of its size. The periodic sweeper does
    /// the exhaustive cleanup.
    fn make_room(&self, now: Instant) {
        if self.records.len() < self.max_tracked_clients {
            return;
        }

        let Some(victim) = self.eviction_candidate(now) else {
            return;
        };
        self.records.remove(&victim.key);
        if victim.expired {
            tracing::debug!(inspected = victim.inspected, "Evicted expired rate limit record at capacity");
        } else {
            tracing::warn!(
                max_tracked_clients = self.max_tracked_clients,
                inspected = victim.inspected,
                "Rate limit table full, evicted oldest sampled client record"
            );
        }
    }

    /// Pick a record to evict from at most [`EVICTION_SAMPLE`] entries:
    /// the first expired one, else the oldest window seen.
    fn eviction_candidate(&self, now: Instant) -> Option<EvictionCandidate> {
        let mut oldest: Option<(String, Instant)> = None;
        let mut inspected = 0;

        for record in self.records.iter().take(EVICTION_SAMPLE) {
            inspected += 1;
            if record.is_expired(now, self.window) {
                return Some(EvictionCandidate {
                    key: record.key().clone(),
                    expired: true,
                    inspected,
                });
            }
            let start = record.value().window_start;
            if oldest.as_ref().map_or(true, |(_, seen)| start < *seen) {
                oldest = Some((record.key().clone(), start));
            }
        }

        oldest.map(|(key, _)| EvictionCandidate {
            key,
            expired: false,
            inspected,
        })
    }

    /// Periodically sweep expired records until shutdown.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        let tracked = self.tracked_clients();
                        metrics::set_tracked_clients(tracked);
                        tracing::debug!(removed, tracked, "Rate limit sweep");
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate limit sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}
