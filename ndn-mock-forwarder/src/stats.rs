use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Running forwarding counters, updated without locks
#[derive(Debug, Default)]
pub struct ForwardingStats {
    interests_received: AtomicU64,
    interests_suppressed: AtomicU64,
    interests_forwarded: AtomicU64,
    interests_unrouted: AtomicU64,
    data_received: AtomicU64,
    data_delivered: AtomicU64,
    data_unsolicited: AtomicU64,
    decode_failures: AtomicU64,
    unknown_packets: AtomicU64,
}

/// Point-in-time copy of [`ForwardingStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Interests decoded from any face
    pub interests_received: u64,
    /// Interests dropped because the same name was already pending
    pub interests_suppressed: u64,
    /// Deliveries to FIB entries; one Interest may count several times
    pub interests_forwarded: u64,
    /// Interests with no matching FIB entry
    pub interests_unrouted: u64,
    /// Data decoded from any face
    pub data_received: u64,
    /// Deliveries to PIT requesters
    pub data_delivered: u64,
    /// Data that satisfied no PIT entry
    pub data_unsolicited: u64,
    pub decode_failures: u64,
    pub unknown_packets: u64,
}

impl ForwardingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn interest_received(&self) {
        self.interests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn interest_suppressed(&self) {
        self.interests_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn interest_forwarded(&self) {
        self.interests_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn interest_unrouted(&self) {
        self.interests_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn data_received(&self) {
        self.data_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn data_delivered(&self) {
        self.data_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn data_unsolicited(&self) {
        self.data_unsolicited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unknown_packet(&self) {
        self.unknown_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            interests_received: self.interests_received.load(Ordering::Relaxed),
            interests_suppressed: self.interests_suppressed.load(Ordering::Relaxed),
            interests_forwarded: self.interests_forwarded.load(Ordering::Relaxed),
            interests_unrouted: self.interests_unrouted.load(Ordering::Relaxed),
            data_received: self.data_received.load(Ordering::Relaxed),
            data_delivered: self.data_delivered.load(Ordering::Relaxed),
            data_unsolicited: self.data_unsolicited.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            unknown_packets: self.unknown_packets.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = ForwardingStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());

        stats.interest_received();
        stats.interest_received();
        stats.interest_suppressed();
        stats.data_unsolicited();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.interests_received, 2);
        assert_eq!(snapshot.interests_suppressed, 1);
        assert_eq!(snapshot.data_unsolicited, 1);
        assert_eq!(snapshot.data_delivered, 0);
    }
}
