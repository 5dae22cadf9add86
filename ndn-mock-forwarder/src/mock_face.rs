//! Standalone face for single-party tests.
//!
//! A [`MockFace`] has no forwarder behind it. Every packet the face sends is
//! intercepted on its transport: Interests can be answered from a table of
//! canned responses or by registered handlers, NFD prefix registration
//! commands are answered with a signed success response, and everything sent
//! is optionally logged for later inspection.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use log::{debug, info, warn};
use ndn_mock_core::control::{parse_command, REGISTER_VERB, RIB_PREFIX};
use ndn_mock_core::{
    ControlResponse, Data, ForwardingFlags, Interest, KeyChain, Name, Packet, PacketType, Signer,
    TlvError,
};
use serde::{Deserialize, Serialize};

use crate::config::MockFaceSection;
use crate::face::Face;
use crate::transport::{MockTransport, OnSendBlock};

/// Face id reported in registration replies
pub const MOCK_FACE_ID: u64 = 1;

pub const DEFAULT_IDENTITY: &str = "/mock/key";

pub type SignalOnSendInterest = Arc<dyn Fn(&Interest) + Send + Sync>;
pub type SignalOnSendData = Arc<dyn Fn(&Data) + Send + Sync>;

/// Produces Data for Interests under a prefix registered with
/// [`MockFace::add_handler`]
pub trait InterestHandler: Send + Sync {
    fn handle(&self, prefix: &Name, interest: &Interest) -> Option<Data>;
}

impl<F> InterestHandler for F
where
    F: Fn(&Name, &Interest) -> Option<Data> + Send + Sync,
{
    fn handle(&self, prefix: &Name, interest: &Interest) -> Option<Data> {
        self(prefix, interest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockFaceOptions {
    /// Append every sent packet to `sent_interests` / `sent_data`
    pub enable_packet_logging: bool,
    /// Answer `/localhost/nfd/rib` commands with a successful response
    pub enable_registration_reply: bool,
}

impl Default for MockFaceOptions {
    fn default() -> Self {
        Self {
            enable_packet_logging: true,
            enable_registration_reply: true,
        }
    }
}

impl From<&MockFaceSection> for MockFaceOptions {
    fn from(section: &MockFaceSection) -> Self {
        Self {
            enable_packet_logging: section.enable_packet_logging,
            enable_registration_reply: section.enable_registration_reply,
        }
    }
}

#[derive(Clone)]
struct HandlerEntry {
    prefix: Name,
    flags: ForwardingFlags,
    handler: Arc<dyn InterestHandler>,
}

impl HandlerEntry {
    fn matches(&self, name: &Name) -> bool {
        self.prefix == *name || (self.flags.child_inherit && self.prefix.is_prefix_of(name))
    }
}

#[derive(Default)]
struct MockFaceState {
    sent_interests: Vec<Interest>,
    sent_data: Vec<Data>,
    on_send_interest: Vec<SignalOnSendInterest>,
    on_send_data: Vec<SignalOnSendData>,
    responses: HashMap<Name, Data>,
    handlers: BTreeMap<u64, HandlerEntry>,
}

struct MockFaceShared {
    options: MockFaceOptions,
    key_chain: Arc<KeyChain>,
    reply_signer: RwLock<Arc<dyn Signer>>,
    rib_prefix: Name,
    state: Mutex<MockFaceState>,
    next_handler_id: AtomicU64,
}

impl MockFaceShared {
    fn state(&self) -> MutexGuard<'_, MockFaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reply_signer(&self) -> Arc<dyn Signer> {
        self.reply_signer
            .read()
            .map(|signer| signer.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn on_interest(&self, interest: Interest, transport: &MockTransport) {
        let signals = {
            let mut state = self.state();
            if self.options.enable_packet_logging {
                state.sent_interests.push(interest.clone());
            }
            state.on_send_interest.clone()
        };
        for signal in signals {
            signal(&interest);
        }

        if self.options.enable_registration_reply && self.rib_prefix.is_prefix_of(&interest.name)
        {
            self.reply_to_command(&interest, transport);
            return;
        }

        match self.answer(&interest) {
            Some(data) => deliver(transport, &data),
            None => debug!("No response or handler for Interest {}", interest.name),
        }
    }

    fn on_data(&self, data: Data) {
        let signals = {
            let mut state = self.state();
            if self.options.enable_packet_logging {
                state.sent_data.push(data.clone());
            }
            state.on_send_data.clone()
        };
        for signal in signals {
            signal(&data);
        }
    }

    /// Canned response for the exact name, else the first matching handler
    /// in registration order
    fn answer(&self, interest: &Interest) -> Option<Data> {
        let handlers: Vec<HandlerEntry> = {
            let state = self.state();
            if let Some(data) = state.responses.get(&interest.name) {
                return Some(data.clone());
            }
            state.handlers.values().cloned().collect()
        };

        let entry = handlers.into_iter().find(|entry| entry.matches(&interest.name))?;
        entry.handler.handle(&entry.prefix, interest)
    }

    fn reply_to_command(&self, interest: &Interest, transport: &MockTransport) {
        let Some((verb, params)) = parse_command(&self.rib_prefix, &interest.name) else {
            warn!("Malformed RIB command {}, not replying", interest.name);
            return;
        };
        let mut params = match params {
            Ok(params) => params.with_face_id(MOCK_FACE_ID).with_origin(0),
            Err(e) => {
                warn!("Failed to decode ControlParameters in {}: {}", interest.name, e);
                return;
            }
        };
        if verb == REGISTER_VERB {
            params = params.with_cost(0);
        }

        let content = match ControlResponse::ok(params).encode() {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to encode RIB {} response: {}", verb, e);
                return;
            }
        };
        let mut data = Data::new(interest.name.clone(), content);
        if let Err(e) = self.reply_signer().sign(&mut data) {
            warn!("Failed to sign RIB {} response, sending unsigned: {}", verb, e);
        }
        info!("Replying to RIB {} command", verb);
        deliver(transport, &data);
    }
}

fn deliver(transport: &MockTransport, data: &Data) {
    if let Err(e) = transport.respond_with(&Packet::Data(data.clone())) {
        warn!("Failed to encode Data {}: {}", data.name, e);
    }
}

/// Send hook of a mock face's transport
struct MockFaceSink {
    shared: Arc<MockFaceShared>,
    transport: Weak<MockTransport>,
}

impl OnSendBlock for MockFaceSink {
    fn on_send(&self, buffer: &[u8]) {
        let Some(transport) = self.transport.upgrade() else {
            return;
        };
        if PacketType::peek(buffer).is_none() {
            info!("Mock face sent an unknown packet, ignoring");
            return;
        }
        match Packet::decode(buffer) {
            Ok(Packet::Interest(interest)) => self.shared.on_interest(interest, &transport),
            Ok(Packet::Data(data)) => self.shared.on_data(data),
            Err(e) => warn!("Failed to decode packet sent by mock face: {}", e),
        }
    }
}

/// Face with canned responses and emulated prefix registration
pub struct MockFace {
    face: Face,
    shared: Arc<MockFaceShared>,
}

impl MockFace {
    /// Logs packets and emulates NFD prefix registration
    pub fn new() -> Self {
        Self::with_options(MockFaceOptions::default())
    }

    pub fn with_options(options: MockFaceOptions) -> Self {
        let identity: Name = DEFAULT_IDENTITY.parse().unwrap_or_default();
        Self::build(options, &identity)
    }

    pub fn from_config(section: &MockFaceSection) -> Self {
        let identity = section.identity.parse::<Name>().unwrap_or_else(|e| {
            warn!("Invalid mock face identity {}: {}", section.identity, e);
            Name::new()
        });
        Self::build(section.into(), &identity)
    }

    fn build(options: MockFaceOptions, identity: &Name) -> Self {
        let key_chain = Arc::new(KeyChain::configure(identity));
        let shared = Arc::new(MockFaceShared {
            options,
            key_chain: key_chain.clone(),
            reply_signer: RwLock::new(key_chain.clone()),
            rib_prefix: RIB_PREFIX.parse().unwrap_or_default(),
            state: Mutex::new(MockFaceState::default()),
            next_handler_id: AtomicU64::new(1),
        });

        let transport = Arc::new(MockTransport::new());
        transport.set_on_send(Arc::new(MockFaceSink {
            shared: shared.clone(),
            transport: Arc::downgrade(&transport),
        }));

        let face = Face::new(transport);
        face.set_command_signing_info(key_chain);
        Self { face, shared }
    }

    /// Client API of this mock face
    pub fn face(&self) -> &Face {
        &self.face
    }

    pub fn transport(&self) -> &Arc<MockTransport> {
        self.face.transport()
    }

    pub fn options(&self) -> MockFaceOptions {
        self.shared.options
    }

    pub fn key_chain(&self) -> &Arc<KeyChain> {
        &self.shared.key_chain
    }

    /// Sign registration replies with `signer` instead of the key chain
    pub fn set_reply_signer(&self, signer: Arc<dyn Signer>) {
        if let Ok(mut slot) = self.shared.reply_signer.write() {
            *slot = signer;
        }
    }

    /// Interests sent so far; empty unless packet logging is enabled
    pub fn sent_interests(&self) -> Vec<Interest> {
        self.shared.state().sent_interests.clone()
    }

    /// Data sent so far; empty unless packet logging is enabled
    pub fn sent_data(&self) -> Vec<Data> {
        self.shared.state().sent_data.clone()
    }

    pub fn clear_sent(&self) {
        let mut state = self.shared.state();
        state.sent_interests.clear();
        state.sent_data.clear();
    }

    /// Run `signal` for every Interest the face sends
    pub fn on_send_interest<F>(&self, signal: F)
    where
        F: Fn(&Interest) + Send + Sync + 'static,
    {
        self.shared.state().on_send_interest.push(Arc::new(signal));
    }

    /// Run `signal` for every Data the face sends
    pub fn on_send_data<F>(&self, signal: F)
    where
        F: Fn(&Data) + Send + Sync + 'static,
    {
        self.shared.state().on_send_data.push(Arc::new(signal));
    }

    /// Answer every Interest named exactly `name` with `data`
    pub fn add_response(&self, name: Name, data: Data) {
        debug!("Adding response for {}", name);
        self.shared.state().responses.insert(name, data);
    }

    pub fn remove_response(&self, name: &Name) -> Option<Data> {
        self.shared.state().responses.remove(name)
    }

    /// Answer Interests under `prefix` with whatever `handler` returns.
    /// Without `child_inherit` only the exact prefix matches.
    pub fn add_handler<H>(&self, prefix: Name, flags: ForwardingFlags, handler: H) -> u64
    where
        H: InterestHandler + 'static,
    {
        let id = self.shared.next_handler_id.fetch_add(1, Ordering::Relaxed);
        debug!("Adding handler {} for {}", id, prefix);
        self.shared.state().handlers.insert(
            id,
            HandlerEntry {
                prefix,
                flags,
                handler: Arc::new(handler),
            },
        );
        id
    }

    pub fn remove_handler(&self, id: u64) -> bool {
        self.shared.state().handlers.remove(&id).is_some()
    }

    /// Queue `interest` as if it arrived from the network
    pub fn receive_interest(&self, interest: &Interest) -> Result<(), TlvError> {
        self.transport().respond_with(&Packet::Interest(interest.clone()))
    }

    /// Queue `data` as if it arrived from the network
    pub fn receive_data(&self, data: &Data) -> Result<(), TlvError> {
        self.transport().respond_with(&Packet::Data(data.clone()))
    }

    pub fn process_events(&self) -> usize {
        self.face.process_events()
    }

    pub fn shutdown(&self) {
        self.face.shutdown();
    }
}

impl Default for MockFace {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFace")
            .field("face", &self.face)
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndn_mock_core::{ControlParameters, KeyLocator, SignatureError, SignatureType};
    use std::sync::atomic::AtomicUsize;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (count.clone(), count)
    }

    #[test]
    fn test_with_responses() {
        let face = MockFace::new();
        let response = Data::new(name("/test/with/responses"), b"...".to_vec());
        face.add_response(name("/test/with/responses"), response);

        let (count, seen) = counter();
        for _ in 0..2 {
            let seen = seen.clone();
            face.face()
                .express_interest(Interest::new(name("/test/with/responses")), move |_, data| {
                    assert_eq!(data.content, b"...");
                    seen.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            face.process_events();
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(face.sent_interests().len(), 2);
    }

    #[test]
    fn test_remove_response() {
        let face = MockFace::new();
        let response = Data::new(name("/r"), vec![]);
        face.add_response(name("/r"), response.clone());
        assert_eq!(face.remove_response(&name("/r")), Some(response));

        let (count, seen) = counter();
        face.face()
            .express_interest(Interest::new(name("/r")), move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        face.process_events();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_responses_are_exact_match_only() {
        let face = MockFace::new();
        face.add_response(name("/a"), Data::new(name("/a"), vec![]));

        face.face()
            .express_interest(Interest::new(name("/a/b")), |_, _| panic!("unexpected"))
            .unwrap();
        face.process_events();
        assert_eq!(face.face().pending_interest_count(), 1);
    }

    #[test]
    fn test_with_handlers() {
        let face = MockFace::new();
        face.add_handler(
            name("/test/with/handlers"),
            ForwardingFlags::default(),
            |prefix: &Name, interest: &Interest| {
                assert_eq!(prefix, &name("/test/with/handlers"));
                Some(Data::new(interest.name.clone(), b"...".to_vec()))
            },
        );

        let (count, seen) = counter();
        face.face()
            .express_interest(Interest::new(name("/test/with/handlers/1")), move |_, data| {
                assert_eq!(data.name, name("/test/with/handlers/1"));
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        face.process_events();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_without_child_inherit_matches_exact_prefix() {
        let face = MockFace::new();
        let id = face.add_handler(
            name("/h"),
            ForwardingFlags::new(false, false),
            |_: &Name, interest: &Interest| Some(Data::new(interest.name.clone(), vec![])),
        );

        face.face()
            .express_interest(Interest::new(name("/h/child")), |_, _| panic!("unexpected"))
            .unwrap();
        let (count, seen) = counter();
        face.face()
            .express_interest(Interest::new(name("/h")), move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        face.process_events();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(face.remove_handler(id));
        assert!(!face.remove_handler(id));
    }

    #[test]
    fn test_response_takes_precedence_over_handler() {
        let face = MockFace::new();
        face.add_handler(name("/p"), ForwardingFlags::default(), |_: &Name, interest: &Interest| {
            Some(Data::new(interest.name.clone(), b"handler".to_vec()))
        });
        face.add_response(name("/p/x"), Data::new(name("/p/x"), b"canned".to_vec()));

        let (count, seen) = counter();
        face.face()
            .express_interest(Interest::new(name("/p/x")), move |_, data| {
                assert_eq!(data.content, b"canned");
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        face.process_events();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_registered_handler_wins() {
        let face = MockFace::new();
        face.add_handler(name("/p"), ForwardingFlags::default(), |_: &Name, interest: &Interest| {
            Some(Data::new(interest.name.clone(), b"first".to_vec()))
        });
        face.add_handler(name("/p/x"), ForwardingFlags::default(), |_: &Name, interest: &Interest| {
            Some(Data::new(interest.name.clone(), b"second".to_vec()))
        });

        let (count, seen) = counter();
        face.face()
            .express_interest(Interest::new(name("/p/x")), move |_, data| {
                assert_eq!(data.content, b"first");
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        face.process_events();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_prefix_gets_signed_reply() {
        let face = MockFace::new();
        let outcome = Arc::new(Mutex::new(None));
        let sink = outcome.clone();

        face.face()
            .register_prefix(
                name("/app"),
                ForwardingFlags::default(),
                |_: &Name, _: &Interest, _: &Face| {},
                move |_, result| {
                    *sink.lock().unwrap() = Some(result.is_ok());
                },
            )
            .unwrap();
        face.process_events();

        assert_eq!(*outcome.lock().unwrap(), Some(true));
        assert_eq!(face.face().interest_filter_count(), 1);

        // The command itself is logged like any other Interest
        let command = &face.sent_interests()[0];
        let (verb, _) = parse_command(&name(RIB_PREFIX), &command.name).unwrap();
        assert_eq!(verb, "register");
    }

    #[test]
    fn test_registration_reply_contents() {
        let face = MockFace::new();
        let replies = Arc::new(Mutex::new(Vec::new()));
        let sink = replies.clone();

        let params = ControlParameters::new().with_name(name("/app"));
        let unsigned =
            ndn_mock_core::control::command_name(&name(RIB_PREFIX), "register", &params).unwrap();
        let command = face.key_chain().sign_command(&unsigned).unwrap();
        face.face()
            .express_interest(Interest::new(command), move |_, data| {
                sink.lock().unwrap().push(data.clone());
            })
            .unwrap();
        face.process_events();

        let replies = replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert!(face.key_chain().verify(&replies[0]).unwrap());
        let response = ControlResponse::decode(&replies[0].content).unwrap();
        assert_eq!(response.status_code, 200);
        let body = response.body.unwrap();
        assert_eq!(body.face_id, Some(MOCK_FACE_ID));
        assert_eq!(body.origin, Some(0));
        assert_eq!(body.cost, Some(0));
    }

    struct ExpiredKey;

    impl Signer for ExpiredKey {
        fn signature_type(&self) -> SignatureType {
            SignatureType::Ed25519
        }

        fn key_locator(&self) -> Option<KeyLocator> {
            None
        }

        fn sign_bytes(&self, _bytes: &[u8]) -> Result<Vec<u8>, SignatureError> {
            Err(SignatureError::KeyError("key expired".to_string()))
        }
    }

    #[test]
    fn test_unsigned_reply_when_signing_fails() {
        let face = MockFace::new();
        face.set_reply_signer(Arc::new(ExpiredKey));
        let replies = Arc::new(Mutex::new(Vec::new()));
        let sink = replies.clone();
        let outcome = Arc::new(Mutex::new(None));
        let result_sink = outcome.clone();

        face.face()
            .register_prefix(
                name("/app"),
                ForwardingFlags::default(),
                |_: &Name, _: &Interest, _: &Face| {},
                move |_, result| {
                    *result_sink.lock().unwrap() = Some(result.is_ok());
                },
            )
            .unwrap();
        face.process_events();
        assert_eq!(*outcome.lock().unwrap(), Some(true));
        assert_eq!(face.face().interest_filter_count(), 1);

        let params = ControlParameters::new().with_name(name("/other"));
        let unsigned =
            ndn_mock_core::control::command_name(&name(RIB_PREFIX), "register", &params).unwrap();
        let command = face.key_chain().sign_command(&unsigned).unwrap();
        face.face()
            .express_interest(Interest::new(command), move |_, data| {
                sink.lock().unwrap().push(data.clone());
            })
            .unwrap();
        face.process_events();

        let replies = replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].signature_info.is_none());
        assert!(replies[0].signature_value.is_none());
        let response = ControlResponse::decode(&replies[0].content).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body.unwrap().face_id, Some(MOCK_FACE_ID));
    }

    #[test]
    fn test_registration_reply_disabled() {
        let face = MockFace::with_options(MockFaceOptions {
            enable_packet_logging: false,
            enable_registration_reply: false,
        });
        let (count, seen) = counter();

        face.face()
            .register_prefix(
                name("/app"),
                ForwardingFlags::default(),
                |_: &Name, _: &Interest, _: &Face| {},
                move |_, _| {
                    seen.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        face.process_events();

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(face.face().interest_filter_count(), 0);
        assert!(face.sent_interests().is_empty());
    }

    #[test]
    fn test_send_signals_and_data_log() {
        let face = MockFace::new();
        let (interests, seen_interest) = counter();
        let (datas, seen_data) = counter();
        face.on_send_interest(move |_| {
            seen_interest.fetch_add(1, Ordering::SeqCst);
        });
        face.on_send_data(move |_| {
            seen_data.fetch_add(1, Ordering::SeqCst);
        });

        face.face().express_interest(Interest::new(name("/i")), |_, _| {}).unwrap();
        let data = Data::new(name("/d"), b"v".to_vec());
        face.face().put_data(&data).unwrap();

        assert_eq!(interests.load(Ordering::SeqCst), 1);
        assert_eq!(datas.load(Ordering::SeqCst), 1);
        assert_eq!(face.sent_data(), vec![data]);

        face.clear_sent();
        assert!(face.sent_interests().is_empty());
        assert!(face.sent_data().is_empty());
    }

    #[test]
    fn test_receive_interest_reaches_filters() {
        let face = MockFace::new();
        let (count, seen) = counter();
        face.face().set_interest_filter(name("/in"), move |_: &Name, _: &Interest, _: &Face| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        face.receive_interest(&Interest::new(name("/in/x"))).unwrap();
        face.process_events();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_receive_data_satisfies_pending_interest() {
        let face = MockFace::new();
        let (count, seen) = counter();
        face.face()
            .express_interest(Interest::new(name("/remote")), move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        face.receive_data(&Data::new(name("/remote/1"), vec![])).unwrap();
        face.process_events();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_options_from_config() {
        let mut section = MockFaceSection::default();
        section.enable_packet_logging = false;
        section.identity = "/lab/face".to_string();

        let face = MockFace::from_config(&section);
        assert!(!face.options().enable_packet_logging);
        assert!(face.options().enable_registration_reply);
        assert_eq!(face.key_chain().identity(), &name("/lab/face"));
    }
}
