use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, trace, warn};
use ndn_mock_core::{Data, Interest, Packet, TlvError};

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// Errors raised by a [`MockTransport`]
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport {0} is closed")]
    Closed(u64),
    #[error("Encoding error: {0}")]
    Encoding(#[from] TlvError),
}

/// Receives every buffer a transport sends
pub trait OnSendBlock: Send + Sync {
    fn on_send(&self, buffer: &[u8]);
}

impl<F> OnSendBlock for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn on_send(&self, buffer: &[u8]) {
        self(buffer)
    }
}

/// In-memory packet channel backing one face.
///
/// Outbound buffers go to the installed [`OnSendBlock`] hook. Without a hook
/// the transport records what was sent so tests can inspect it. Inbound
/// buffers wait in a FIFO until the owning face drains them.
pub struct MockTransport {
    id: u64,
    connected: AtomicBool,
    on_send: RwLock<Option<Arc<dyn OnSendBlock>>>,
    receive_queue: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<SentRecord>,
}

#[derive(Default)]
struct SentRecord {
    bytes: Vec<Vec<u8>>,
    interests: Vec<Interest>,
    data: Vec<Data>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
            connected: AtomicBool::new(true),
            on_send: RwLock::new(None),
            receive_queue: Mutex::new(VecDeque::new()),
            sent: Mutex::new(SentRecord::default()),
        }
    }

    /// Create a transport whose outbound buffers go to `hook`
    pub fn with_on_send(hook: Arc<dyn OnSendBlock>) -> Self {
        let transport = Self::new();
        transport.set_on_send(hook);
        transport
    }

    /// Process-unique identifier, used as the face id in control responses
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn connect(&self) {
        debug!("Transport {} connecting", self.id);
        self.connected.store(true, Ordering::Release);
    }

    pub fn close(&self) {
        debug!("Transport {} closing", self.id);
        self.connected.store(false, Ordering::Release);
    }

    pub fn set_on_send(&self, hook: Arc<dyn OnSendBlock>) {
        if let Ok(mut slot) = self.on_send.write() {
            *slot = Some(hook);
        }
    }

    pub fn clear_on_send(&self) {
        if let Ok(mut slot) = self.on_send.write() {
            *slot = None;
        }
    }

    /// Hand `buffer` to the send hook, or record it when no hook is set
    pub fn send(&self, buffer: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed(self.id));
        }
        trace!("Transport {} sending {} bytes", self.id, buffer.len());

        // Clone the hook out so no lock is held while it runs
        let hook = self.on_send.read().ok().and_then(|slot| slot.clone());
        match hook {
            Some(hook) => hook.on_send(buffer),
            None => self.record_sent(buffer),
        }
        Ok(())
    }

    fn record_sent(&self, buffer: &[u8]) {
        let packet = Packet::decode(buffer);
        let Ok(mut sent) = self.sent.lock() else {
            return;
        };
        sent.bytes.push(buffer.to_vec());
        match packet {
            Ok(Packet::Interest(interest)) => sent.interests.push(interest),
            Ok(Packet::Data(data)) => sent.data.push(data),
            Err(e) => debug!("Transport {} recorded undecodable buffer: {}", self.id, e),
        }
    }

    /// Queue an inbound buffer for the owning face
    pub fn receive(&self, buffer: Vec<u8>) {
        if !self.is_connected() {
            warn!("Transport {} is closed, dropping {} inbound bytes", self.id, buffer.len());
            return;
        }
        if let Ok(mut queue) = self.receive_queue.lock() {
            queue.push_back(buffer);
        }
    }

    /// Queue an encoded packet as if it arrived from the network
    pub fn respond_with(&self, packet: &Packet) -> Result<(), TlvError> {
        self.receive(packet.encode()?);
        Ok(())
    }

    /// Remove and return every queued inbound buffer in arrival order
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.receive_queue
            .lock()
            .map(|mut queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn pending(&self) -> usize {
        self.receive_queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn sent_bytes(&self) -> Vec<Vec<u8>> {
        self.sent.lock().map(|s| s.bytes.clone()).unwrap_or_default()
    }

    pub fn sent_interests(&self) -> Vec<Interest> {
        self.sent.lock().map(|s| s.interests.clone()).unwrap_or_default()
    }

    pub fn sent_data(&self) -> Vec<Data> {
        self.sent.lock().map(|s| s.data.clone()).unwrap_or_default()
    }

    /// Forget recorded sends and pending inbound buffers
    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            *sent = SentRecord::default();
        }
        if let Ok(mut queue) = self.receive_queue.lock() {
            queue.clear();
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending())
            .finish()
    }
}
