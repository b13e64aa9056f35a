//! Per-peer idle clock.
//!
//! The transport records activity per peer; peers silent for longer than the
//! idle timeout are handed back to the caller, which closes whatever it had
//! bound to them.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tracing::debug;

/// Default idle expiry: 60 seconds without a datagram from the peer.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Tracks the last time each peer was heard from.
#[derive(Debug)]
pub struct IdleTracker<K> {
    timeout: Duration,
    last_seen: HashMap<K, Instant>,
}

impl<K: Eq + Hash + Clone + std::fmt::Debug> IdleTracker<K> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen: HashMap::new(),
        }
    }

    /// Record activity from `peer` at `now`.
    pub fn touch(&mut self, peer: K, now: Instant) {
        self.last_seen.insert(peer, now);
    }

    /// Remove and return every peer idle for at least the timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<K> {
        let timeout = self.timeout;
        let expired: Vec<K> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) >= timeout)
            .map(|(peer, _)| peer.clone())
            .collect();
        for peer in &expired {
            self.last_seen.remove(peer);
            debug!(?peer, "peer idle expired");
        }
        expired
    }

    /// Earliest instant at which some tracked peer would expire.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.last_seen.values().min().map(|seen| *seen + self.timeout)
    }

    /// Number of tracked peers.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_only_silent_peers() {
        let start = Instant::now();
        let mut tracker = IdleTracker::new(Duration::from_secs(10));
        tracker.touch("a", start);
        tracker.touch("b", start + Duration::from_secs(5));

        let expired = tracker.expire(start + Duration::from_secs(10));

        assert_eq!(expired, vec!["a"]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn touch_resets_the_clock() {
        let start = Instant::now();
        let mut tracker = IdleTracker::new(Duration::from_secs(10));
        tracker.touch(1u32, start);
        tracker.touch(1u32, start + Duration::from_secs(8));

        assert!(tracker.expire(start + Duration::from_secs(12)).is_empty());
        assert_eq!(tracker.expire(start + Duration::from_secs(18)), vec![1]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn next_deadline_tracks_oldest_peer() {
        let start = Instant::now();
        let mut tracker = IdleTracker::new(Duration::from_secs(3));
        assert_eq!(tracker.next_deadline(), None);

        tracker.touch("late", start + Duration::from_secs(2));
        tracker.touch("early", start);

        assert_eq!(tracker.next_deadline(), Some(start + Duration::from_secs(3)));
    }
}
