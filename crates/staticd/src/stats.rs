//! Request statistics shared by all workers

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Counters {
    total_requests: u64,
    cache_hits: u64,
    total_latency: Duration,
}

/// Aggregated request count, cache hits and latency
///
/// Counters only change together under one lock, so a reader never sees a
/// request counted without its latency.
#[derive(Debug)]
pub struct Stats {
    counters: Mutex<Counters>,
    started: Instant,
    started_at: DateTime<Utc>,
}

/// Consistent copy of the counters at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    /// Requests answered
    pub total_requests: u64,
    /// Requests answered from the cache
    pub cache_hits: u64,
    /// Sum of all request latencies
    pub total_latency: Duration,
    /// Wall-clock time the stats were created
    pub started_at: DateTime<Utc>,
    /// Time since the stats were created
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// Requests divided by elapsed seconds
    pub fn requests_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return 0.0;
        }
        self.total_requests as f64 / seconds
    }

    /// Mean latency in milliseconds
    pub fn average_response_ms(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_latency.as_secs_f64() * 1000.0 / self.total_requests as f64
    }

    /// Fraction of requests served from the cache
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / self.total_requests as f64
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    /// Create stats with the clock starting now
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Record one answered request
    pub fn record_request(&self, duration: Duration, cache_hit: bool) {
        let mut counters = self.counters.lock();
        counters.total_requests += 1;
        if cache_hit {
            counters.cache_hits += 1;
        }
        counters.total_latency += duration;
    }

    /// Copy all counters under the lock
    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = self.counters.lock();
        StatsSnapshot {
            total_requests: counters.total_requests,
            cache_hits: counters.cache_hits,
            total_latency: counters.total_latency,
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
        }
    }

    /// Requests per second since creation
    pub fn requests_per_second(&self) -> f64 {
        self.snapshot().requests_per_second()
    }

    /// Mean latency in milliseconds, 0.0 before any request
    pub fn average_response_ms(&self) -> f64 {
        self.snapshot().average_response_ms()
    }

    /// Fraction of requests served from the cache, 0.0 before any request
    pub fn cache_hit_rate(&self) -> f64 {
        self.snapshot().cache_hit_rate()
    }

    /// Requests answered so far
    pub fn total_requests(&self) -> u64 {
        self.counters.lock().total_requests
    }
}
