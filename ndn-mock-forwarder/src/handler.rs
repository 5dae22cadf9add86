//! Forwarding engine run on every buffer a connected face sends.

use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use ndn_mock_core::{Data, Interest, Packet, PacketType};

use crate::fib::Fib;
use crate::pit::{Pit, PitEntry};
use crate::stats::ForwardingStats;
use crate::transport::{MockTransport, OnSendBlock};

/// Tables shared by every face of one forwarder
#[derive(Debug, Default)]
pub struct ForwardingTables {
    pub fib: Fib,
    pub pit: Pit,
    pub stats: ForwardingStats,
}

impl ForwardingTables {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Send hook installed on a forwarder-side transport.
///
/// Holds both the source transport and the tables weakly; a buffer sent
/// after either is gone is dropped.
pub struct BufferHandler {
    source: Weak<MockTransport>,
    tables: Weak<ForwardingTables>,
}

impl BufferHandler {
    pub fn new(source: &Arc<MockTransport>, tables: &Arc<ForwardingTables>) -> Self {
        Self {
            source: Arc::downgrade(source),
            tables: Arc::downgrade(tables),
        }
    }

    /// Install a handler as `source`'s send hook
    pub fn attach(source: &Arc<MockTransport>, tables: &Arc<ForwardingTables>) {
        source.set_on_send(Arc::new(Self::new(source, tables)));
    }

    fn on_interest(
        &self,
        tables: &ForwardingTables,
        source: &Arc<MockTransport>,
        interest: Interest,
    ) {
        tables.stats.interest_received();

        if tables.pit.has(&interest) {
            debug!(
                "Interest {} from face {} already pending, suppressing",
                interest.name,
                source.id()
            );
            tables.stats.interest_suppressed();
            return;
        }
        tables.pit.add(PitEntry::new(interest.clone(), source.clone()));

        let entries = tables.fib.find(&interest);
        if entries.is_empty() {
            info!("No FIB entry for Interest {}, dropping", interest.name);
            tables.stats.interest_unrouted();
            return;
        }

        for entry in entries {
            match entry.forward(&interest, source) {
                Ok(()) => tables.stats.interest_forwarded(),
                Err(e) => warn!(
                    "Failed to forward Interest {} to {}: {}",
                    interest.name, entry.prefix, e
                ),
            }
        }
    }

    fn on_data(&self, tables: &ForwardingTables, data: Data) {
        tables.stats.data_received();

        let entries = tables.pit.extract(&data.name);
        if entries.is_empty() {
            debug!("No PIT entry for Data {}, dropping", data.name);
            tables.stats.data_unsolicited();
            return;
        }

        for mut entry in entries {
            match entry.forward(&data) {
                Ok(()) => tables.stats.data_delivered(),
                Err(e) => warn!("Failed to deliver Data {}: {}", data.name, e),
            }
        }
    }
}

impl OnSendBlock for BufferHandler {
    fn on_send(&self, buffer: &[u8]) {
        let (Some(source), Some(tables)) = (self.source.upgrade(), self.tables.upgrade()) else {
            debug!("Forwarder is gone, dropping {} bytes", buffer.len());
            return;
        };

        if PacketType::peek(buffer).is_none() {
            warn!(
                "Face {} sent unknown packet type {:?}, dropping",
                source.id(),
                buffer.first()
            );
            tables.stats.unknown_packet();
            return;
        }

        match Packet::decode(buffer) {
            Ok(Packet::Interest(interest)) => self.on_interest(&tables, &source, interest),
            Ok(Packet::Data(data)) => self.on_data(&tables, data),
            Err(e) => {
                warn!("Failed to decode packet from face {}: {}", source.id(), e);
                tables.stats.decode_failure();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fib::FibEntry;
    use ndn_mock_core::{ForwardingFlags, Name};

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn attached(tables: &Arc<ForwardingTables>) -> Arc<MockTransport> {
        let transport = Arc::new(MockTransport::new());
        BufferHandler::attach(&transport, tables);
        transport
    }

    #[test]
    fn test_interest_routed_to_remote_entry() {
        let tables = Arc::new(ForwardingTables::new());
        let consumer = attached(&tables);
        let producer = attached(&tables);
        tables.fib.add(FibEntry::remote(name("/p"), producer.clone(), ForwardingFlags::default()));

        let interest = Interest::new(name("/p/1")).with_nonce(7);
        consumer.send(&interest.encode().unwrap()).unwrap();

        assert_eq!(producer.drain(), vec![interest.encode().unwrap()]);
        assert!(tables.pit.contains(&name("/p/1")));
        assert_eq!(tables.stats.snapshot().interests_forwarded, 1);
    }

    #[test]
    fn test_data_returns_to_requester() {
        let tables = Arc::new(ForwardingTables::new());
        let consumer = attached(&tables);
        let producer = attached(&tables);
        tables.fib.add(FibEntry::remote(name("/p"), producer.clone(), ForwardingFlags::default()));

        consumer.send(&Interest::new(name("/p/1")).encode().unwrap()).unwrap();
        let data = Data::new(name("/p/1"), b"content".to_vec());
        producer.send(&data.encode().unwrap()).unwrap();

        assert_eq!(consumer.drain(), vec![data.encode().unwrap()]);
        assert!(tables.pit.is_empty());
        assert_eq!(tables.stats.snapshot().data_delivered, 1);
    }

    #[test]
    fn test_duplicate_interest_suppressed() {
        let tables = Arc::new(ForwardingTables::new());
        let consumer = attached(&tables);
        let producer = attached(&tables);
        tables.fib.add(FibEntry::remote(name("/p"), producer.clone(), ForwardingFlags::default()));

        let wire = Interest::new(name("/p/1")).encode().unwrap();
        consumer.send(&wire).unwrap();
        consumer.send(&wire).unwrap();

        assert_eq!(producer.drain().len(), 1);
        assert_eq!(tables.pit.len(), 1);
        assert_eq!(tables.stats.snapshot().interests_suppressed, 1);
    }

    #[test]
    fn test_unrouted_interest_stays_pending() {
        let tables = Arc::new(ForwardingTables::new());
        let consumer = attached(&tables);

        consumer.send(&Interest::new(name("/nowhere")).encode().unwrap()).unwrap();
        assert_eq!(tables.stats.snapshot().interests_unrouted, 1);
        assert!(tables.pit.contains(&name("/nowhere")));
    }

    #[test]
    fn test_unsolicited_data_dropped() {
        let tables = Arc::new(ForwardingTables::new());
        let producer = attached(&tables);

        producer.send(&Data::new(name("/x"), vec![]).encode().unwrap()).unwrap();
        assert_eq!(tables.stats.snapshot().data_unsolicited, 1);
    }

    #[test]
    fn test_malformed_buffers_dropped() {
        let tables = Arc::new(ForwardingTables::new());
        let face = attached(&tables);

        face.send(&[0x64, 0x00]).unwrap();
        face.send(&[0x05, 0x10, 0x07]).unwrap();
        face.send(&[]).unwrap();

        let snapshot = tables.stats.snapshot();
        assert_eq!(snapshot.unknown_packets, 2);
        assert_eq!(snapshot.decode_failures, 1);
        assert_eq!(snapshot.interests_received, 0);
    }

    #[test]
    fn test_dropped_tables_make_handler_inert() {
        let tables = Arc::new(ForwardingTables::new());
        let face = attached(&tables);
        drop(tables);

        assert!(face.send(&Interest::new(name("/a")).encode().unwrap()).is_ok());
        assert!(face.sent_bytes().is_empty());
    }
}
