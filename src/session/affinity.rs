//! Session affinity map.
//!
//! # Design Decisions
//! - `DashMap` shards its locks, so writes are serialized per key, never globally
//! - TTL is measured from creation and not refreshed on access
//! - Bounded by `max_entries`; expired mappings are swept first, then the oldest evicted
//! - The bound is enforced after each insert, so concurrent binds may overshoot it
//!   only until each binder has trimmed the map back

use dashmap::DashMap;
use axum::http::{header, HeaderMap};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use crate::config::SessionAffinityConfig;
use crate::observability::metrics;

/// One sticky-session binding.
#[derive(Debug, Clone)]
pub struct SessionMapping {
    /// Identity of the bound backend.
    pub backend: String,
    pub created: Instant,
}

impl SessionMapping {
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created) >= ttl
    }
}

/// Wire shape of the affinity state for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub enabled: bool,
    pub active_sessions: usize,
    pub total_entries: usize,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug)]
pub struct SessionAffinity {
    inner: DashMap<String, SessionMapping>,
    config: SessionAffinityConfig,
}

impl SessionAffinity {
    pub fn new(config: SessionAffinityConfig) -> Self {
        Self {
            inner: DashMap::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &SessionAffinityConfig {
        &self.config
    }

    /// Backend identity bound to `key`, if the mapping is still live.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let ttl = self.config.ttl();
        {
            let entry = self.inner.get(key)?;
            if !entry.is_expired(ttl, now) {
                return Some(entry.backend.clone());
            }
        }
        // The read guard must be dropped before removing, or the shard deadlocks.
        self.inner.remove_if(key, |_, m| m.is_expired(ttl, now));
        metrics::record_sessions(self.inner.len());
        None
    }

    /// Create or overwrite the mapping for `key` with a fresh timestamp.
    pub fn bind(&self, key: &str, backend: &str) {
        self.bind_at(key, backend, Instant::now());
    }

    pub fn bind_at(&self, key: &str, backend: &str, now: Instant) {
        let previous = self.inner.insert(
            key.to_string(),
            SessionMapping {
                backend: backend.to_string(),
                created: now,
            },
        );
        if previous.is_none() && self.inner.len() > self.config.max_entries {
            self.make_room(key, now);
        }
        metrics::record_sessions(self.inner.len());
        tracing::debug!(session = %key, backend = %backend, "Session bound");
    }

    /// Trim the map back to `max_entries`, never evicting `keep`.
    fn make_room(&self, keep: &str, now: Instant) {
        self.purge_expired_at(now);
        while self.inner.len() > self.config.max_entries {
            let oldest = self
                .inner
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().created)
                .map(|entry| entry.key().clone());
            let Some(victim) = oldest else { break };
            self.inner.remove(&victim);
            tracing::debug!(session = %victim, "Evicted oldest session at capacity");
        }
    }

    /// Drop every mapping. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let count = self.inner.len();
        self.inner.clear();
        metrics::record_sessions(0);
        tracing::info!(cleared = count, "Sessions cleared");
        count
    }

    /// Remove expired mappings. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let ttl = self.config.ttl();
        let before = self.inner.len();
        self.inner.retain(|_, m| !m.is_expired(ttl, now));
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            metrics::record_sessions(self.inner.len());
            tracing::debug!(removed, "Purged expired sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn summary(&self) -> SessionSummary {
        let ttl = self.config.ttl();
        let now = Instant::now();
        let active = self.inner.iter().filter(|e| !e.value().is_expired(ttl, now)).count();
        SessionSummary {
            enabled: self.config.enabled,
            active_sessions: active,
            total_entries: self.inner.len(),
            ttl_secs: self.config.ttl_secs,
            max_entries: self.config.max_entries,
        }
    }

    /// Periodically purge expired mappings until shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let period = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval = ?period, "Session sweeper started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.purge_expired();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper stopping");
                    break;
                }
            }
        }
    }
}

/// Extract the session key: the configured header first, then the cookie.
pub fn session_key(headers: &HeaderMap, config: &SessionAffinityConfig) -> Option<String> {
    if !config.header.is_empty() {
        if let Some(value) = headers.get(config.header.as_str()).and_then(|v| v.to_str().ok()) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    if config.cookie.is_empty() {
        return None;
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == config.cookie)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
