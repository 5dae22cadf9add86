//! Minimal client node driving a [`MockTransport`].
//!
//! A `Face` expresses Interests, installs Interest filters, registers
//! prefixes through the NFD RIB command protocol and publishes Data. Nothing
//! happens on its own: inbound packets and Interest timeouts are handled when
//! the owner calls [`Face::process_events`].

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use ndn_mock_core::control::{self, REGISTER_VERB, RIB_PREFIX};
use ndn_mock_core::{
    ControlParameters, ControlResponse, Data, DigestSigner, ForwardingFlags, Interest, Name,
    Packet, SignatureError, Signer, TlvError,
};

use crate::transport::{MockTransport, TransportError};

/// Lifetime of prefix registration command Interests
pub const COMMAND_INTEREST_LIFETIME: Duration = Duration::from_secs(4);

/// Callback run for an Interest matching a filter or a local FIB entry
pub trait OnInterestReceived: Send + Sync {
    fn on_interest(&self, prefix: &Name, interest: &Interest, face: &Face);
}

impl<F> OnInterestReceived for F
where
    F: Fn(&Name, &Interest, &Face) + Send + Sync,
{
    fn on_interest(&self, prefix: &Name, interest: &Interest, face: &Face) {
        self(prefix, interest, face)
    }
}

pub type OnData = Arc<dyn Fn(&Interest, &Data) + Send + Sync>;
pub type OnTimeout = Arc<dyn Fn(&Interest) + Send + Sync>;
pub type OnRegisterResult = Arc<dyn Fn(&Name, Result<u64, FaceError>) + Send + Sync>;

/// Packet logs kept by a face
pub trait MeasurableFace {
    fn sent_interests(&self) -> Vec<Interest>;
    fn sent_datas(&self) -> Vec<Data>;
    fn received_interests(&self) -> Vec<Interest>;
    fn received_datas(&self) -> Vec<Data>;
}

/// Errors returned by the face API
#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] TlvError),
    #[error("Signing error: {0}")]
    Signing(#[from] SignatureError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Registration of {prefix} rejected: {status_code} {status_text}")]
    RegistrationRejected {
        prefix: Name,
        status_code: u64,
        status_text: String,
    },
    #[error("Registration of {0} timed out")]
    RegistrationTimeout(Name),
}

struct PendingInterest {
    id: u64,
    interest: Interest,
    on_data: OnData,
    on_timeout: Option<OnTimeout>,
    /// `None` when the lifetime is too long to represent
    expires_at: Option<Instant>,
}

struct InterestFilter {
    prefix: Name,
    on_interest: Arc<dyn OnInterestReceived>,
}

struct RegisteredPrefix {
    prefix: Name,
    filter_id: Option<u64>,
}

#[derive(Default)]
struct FaceState {
    pending: Vec<PendingInterest>,
    filters: BTreeMap<u64, InterestFilter>,
    registered: HashMap<u64, RegisteredPrefix>,
}

#[derive(Default)]
struct Measurements {
    sent_interests: Vec<Interest>,
    sent_datas: Vec<Data>,
    received_interests: Vec<Interest>,
    received_datas: Vec<Data>,
}

struct FaceInner {
    transport: Arc<MockTransport>,
    state: Mutex<FaceState>,
    measurements: Mutex<Measurements>,
    signer: RwLock<Option<Arc<dyn Signer>>>,
    next_id: AtomicU64,
    command_prefix: RwLock<Name>,
    // Keeps whatever the transport's send hook depends on alive
    _owner: Option<Arc<dyn Any + Send + Sync>>,
}

/// Cheaply cloneable handle; clones share the same transport and tables
#[derive(Clone)]
pub struct Face {
    inner: Arc<FaceInner>,
}

impl Face {
    pub fn new(transport: Arc<MockTransport>) -> Self {
        Self::build(transport, None)
    }

    /// Face that keeps `owner` alive for as long as any clone exists
    pub(crate) fn with_owner(
        transport: Arc<MockTransport>,
        owner: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self::build(transport, Some(owner))
    }

    fn build(transport: Arc<MockTransport>, owner: Option<Arc<dyn Any + Send + Sync>>) -> Self {
        let command_prefix: Name = RIB_PREFIX.parse().unwrap_or_default();
        Self {
            inner: Arc::new(FaceInner {
                transport,
                state: Mutex::new(FaceState::default()),
                measurements: Mutex::new(Measurements::default()),
                signer: RwLock::new(None),
                next_id: AtomicU64::new(1),
                command_prefix: RwLock::new(command_prefix),
                _owner: owner,
            }),
        }
    }

    /// Face id as seen by the forwarder
    pub fn id(&self) -> u64 {
        self.inner.transport.id()
    }

    pub fn transport(&self) -> &Arc<MockTransport> {
        &self.inner.transport
    }

    /// Signer used for prefix registration commands; SHA256 digests otherwise
    pub fn set_command_signing_info(&self, signer: Arc<dyn Signer>) {
        if let Ok(mut slot) = self.inner.signer.write() {
            *slot = Some(signer);
        }
    }

    /// Module prefix registration commands are sent under, by default
    /// `/localhost/nfd/rib`
    pub fn set_command_prefix(&self, prefix: Name) {
        if let Ok(mut slot) = self.inner.command_prefix.write() {
            *slot = prefix;
        }
    }

    fn command_prefix(&self) -> Name {
        self.inner
            .command_prefix
            .read()
            .map(|prefix| prefix.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn command_signer(&self) -> Arc<dyn Signer> {
        self.inner
            .signer
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| Arc::new(DigestSigner))
    }

    fn state(&self) -> MutexGuard<'_, FaceState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn measure(&self, record: impl FnOnce(&mut Measurements)) {
        let mut measurements = self
            .inner
            .measurements
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        record(&mut measurements);
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send an Interest; `on_data` runs for the first matching Data
    pub fn express_interest<D>(&self, interest: Interest, on_data: D) -> Result<u64, FaceError>
    where
        D: Fn(&Interest, &Data) + Send + Sync + 'static,
    {
        self.express(interest, Arc::new(on_data), None)
    }

    /// Like [`Face::express_interest`], with a callback for when the
    /// Interest lifetime elapses before any Data arrives
    pub fn express_interest_with_timeout<D, T>(
        &self,
        interest: Interest,
        on_data: D,
        on_timeout: T,
    ) -> Result<u64, FaceError>
    where
        D: Fn(&Interest, &Data) + Send + Sync + 'static,
        T: Fn(&Interest) + Send + Sync + 'static,
    {
        self.express(interest, Arc::new(on_data), Some(Arc::new(on_timeout)))
    }

    fn express(
        &self,
        mut interest: Interest,
        on_data: OnData,
        on_timeout: Option<OnTimeout>,
    ) -> Result<u64, FaceError> {
        interest.ensure_nonce();
        let wire = interest.encode()?;
        let id = self.next_id();

        self.state().pending.push(PendingInterest {
            id,
            interest: interest.clone(),
            on_data,
            on_timeout,
            expires_at: Instant::now().checked_add(interest.lifetime()),
        });
        debug!("Face {} expressing Interest {}", self.id(), interest.name);
        self.measure(|m| m.sent_interests.push(interest));

        if let Err(e) = self.inner.transport.send(&wire) {
            self.remove_pending_interest(id);
            return Err(e.into());
        }
        Ok(id)
    }

    /// Drop a pending Interest without running any callback
    pub fn remove_pending_interest(&self, id: u64) -> bool {
        let mut state = self.state();
        let before = state.pending.len();
        state.pending.retain(|p| p.id != id);
        state.pending.len() != before
    }

    pub fn pending_interest_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Dispatch Interests under `prefix` to `on_interest`
    pub fn set_interest_filter<C>(&self, prefix: Name, on_interest: C) -> u64
    where
        C: OnInterestReceived + 'static,
    {
        self.install_filter(prefix, Arc::new(on_interest))
    }

    fn install_filter(&self, prefix: Name, on_interest: Arc<dyn OnInterestReceived>) -> u64 {
        let id = self.next_id();
        debug!("Face {} setting Interest filter {} for {}", self.id(), id, prefix);
        self.state().filters.insert(id, InterestFilter { prefix, on_interest });
        id
    }

    pub fn unset_interest_filter(&self, id: u64) -> bool {
        self.state().filters.remove(&id).is_some()
    }

    pub fn interest_filter_count(&self) -> usize {
        self.state().filters.len()
    }

    /// Ask the forwarder to route `prefix` here.
    ///
    /// Sends a signed `/localhost/nfd/rib/register` command. The Interest
    /// filter is installed, and `on_result` called with the registration id,
    /// once a 200 response is processed.
    pub fn register_prefix<C, R>(
        &self,
        prefix: Name,
        flags: ForwardingFlags,
        on_interest: C,
        on_result: R,
    ) -> Result<u64, FaceError>
    where
        C: OnInterestReceived + 'static,
        R: Fn(&Name, Result<u64, FaceError>) + Send + Sync + 'static,
    {
        let params = ControlParameters::new()
            .with_name(prefix.clone())
            .with_forwarding_flags(flags);
        let unsigned = control::command_name(&self.command_prefix(), REGISTER_VERB, &params)?;
        let signed = self.command_signer().sign_command(&unsigned)?;

        let id = self.next_id();
        self.state().registered.insert(
            id,
            RegisteredPrefix {
                prefix: prefix.clone(),
                filter_id: None,
            },
        );

        let on_interest: Arc<dyn OnInterestReceived> = Arc::new(on_interest);
        let on_result: OnRegisterResult = Arc::new(on_result);

        let on_data: OnData = {
            let weak = Arc::downgrade(&self.inner);
            let prefix = prefix.clone();
            let on_result = on_result.clone();
            Arc::new(move |_: &Interest, data: &Data| {
                if let Some(face) = Face::upgrade(&weak) {
                    face.complete_registration(id, &prefix, on_interest.clone(), data, &on_result);
                }
            })
        };
        let on_timeout: OnTimeout = {
            let weak = Arc::downgrade(&self.inner);
            let prefix = prefix.clone();
            Arc::new(move |_: &Interest| {
                if let Some(face) = Face::upgrade(&weak) {
                    face.state().registered.remove(&id);
                }
                warn!("Registration of {} timed out", prefix);
                on_result(&prefix, Err(FaceError::RegistrationTimeout(prefix.clone())));
            })
        };

        let command = Interest::new(signed).with_lifetime(COMMAND_INTEREST_LIFETIME);
        if let Err(e) = self.express(command, on_data, Some(on_timeout)) {
            self.state().registered.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    fn upgrade(weak: &Weak<FaceInner>) -> Option<Face> {
        weak.upgrade().map(|inner| Face { inner })
    }

    fn complete_registration(
        &self,
        id: u64,
        prefix: &Name,
        on_interest: Arc<dyn OnInterestReceived>,
        data: &Data,
        on_result: &OnRegisterResult,
    ) {
        let response = match ControlResponse::decode(&data.content) {
            Ok(response) => response,
            Err(e) => {
                warn!("Undecodable registration response for {}: {}", prefix, e);
                self.state().registered.remove(&id);
                on_result(prefix, Err(e.into()));
                return;
            }
        };

        if !response.is_ok() {
            self.state().registered.remove(&id);
            on_result(
                prefix,
                Err(FaceError::RegistrationRejected {
                    prefix: prefix.clone(),
                    status_code: response.status_code,
                    status_text: response.status_text,
                }),
            );
            return;
        }

        if !self.state().registered.contains_key(&id) {
            debug!("Registration {} for {} was removed before completing", id, prefix);
            return;
        }
        let filter_id = self.install_filter(prefix.clone(), on_interest);
        if let Some(entry) = self.state().registered.get_mut(&id) {
            entry.filter_id = Some(filter_id);
        }
        info!("Face {} registered prefix {}", self.id(), prefix);
        on_result(prefix, Ok(id));
    }

    /// Forget a registration and its Interest filter locally
    pub fn remove_registered_prefix(&self, id: u64) -> bool {
        let mut state = self.state();
        match state.registered.remove(&id) {
            Some(entry) => {
                if let Some(filter_id) = entry.filter_id {
                    state.filters.remove(&filter_id);
                }
                debug!("Face removed registration {} for {}", id, entry.prefix);
                true
            }
            None => false,
        }
    }

    pub fn put_data(&self, data: &Data) -> Result<(), FaceError> {
        let wire = data.encode()?;
        debug!("Face {} putting Data {}", self.id(), data.name);
        self.measure(|m| m.sent_datas.push(data.clone()));
        self.inner.transport.send(&wire)?;
        Ok(())
    }

    /// Drain the transport, dispatch what arrived, then expire Interests
    /// whose lifetime has elapsed. Returns the number of inbound buffers.
    pub fn process_events(&self) -> usize {
        let buffers = self.inner.transport.drain();
        let count = buffers.len();

        for buffer in buffers {
            match Packet::decode(&buffer) {
                Ok(Packet::Interest(interest)) => self.dispatch_interest(interest),
                Ok(Packet::Data(data)) => self.dispatch_data(data),
                Err(e) => warn!("Face {} dropping undecodable packet: {}", self.id(), e),
            }
        }

        self.expire_interests(Instant::now());
        count
    }

    fn dispatch_interest(&self, interest: Interest) {
        self.measure(|m| m.received_interests.push(interest.clone()));

        let matched: Vec<(Name, Arc<dyn OnInterestReceived>)> = self
            .state()
            .filters
            .values()
            .filter(|filter| filter.prefix.is_prefix_of(&interest.name))
            .map(|filter| (filter.prefix.clone(), filter.on_interest.clone()))
            .collect();

        if matched.is_empty() {
            debug!("Face {} has no filter for Interest {}", self.id(), interest.name);
        }
        for (prefix, on_interest) in matched {
            on_interest.on_interest(&prefix, &interest, self);
        }
    }

    fn dispatch_data(&self, data: Data) {
        self.measure(|m| m.received_datas.push(data.clone()));

        let satisfied: Vec<PendingInterest> = {
            let mut state = self.state();
            let (satisfied, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|p| p.interest.matches_data(&data.name));
            state.pending = remaining;
            satisfied
        };

        if satisfied.is_empty() {
            debug!("Face {} received unsolicited Data {}", self.id(), data.name);
        }
        for pending in satisfied {
            (pending.on_data)(&pending.interest, &data);
        }
    }

    fn expire_interests(&self, now: Instant) {
        let expired: Vec<PendingInterest> = {
            let mut state = self.state();
            let (expired, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|p| p.expires_at.is_some_and(|at| at <= now));
            state.pending = remaining;
            expired
        };

        for pending in expired {
            debug!("Interest {} timed out", pending.interest.name);
            if let Some(on_timeout) = pending.on_timeout {
                on_timeout(&pending.interest);
            }
        }
    }

    /// Close the transport and drop every pending Interest and filter
    pub fn shutdown(&self) {
        self.inner.transport.close();
        let mut state = self.state();
        state.pending.clear();
        state.filters.clear();
        state.registered.clear();
    }
}

impl MeasurableFace for Face {
    fn sent_interests(&self) -> Vec<Interest> {
        self.inner.measurements.lock().map(|m| m.sent_interests.clone()).unwrap_or_default()
    }

    fn sent_datas(&self) -> Vec<Data> {
        self.inner.measurements.lock().map(|m| m.sent_datas.clone()).unwrap_or_default()
    }

    fn received_interests(&self) -> Vec<Interest> {
        self.inner.measurements.lock().map(|m| m.received_interests.clone()).unwrap_or_default()
    }

    fn received_datas(&self) -> Vec<Data> {
        self.inner.measurements.lock().map(|m| m.received_datas.clone()).unwrap_or_default()
    }
}

impl std::fmt::Debug for Face {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Face")
            .field("id", &self.id())
            .field("transport", &self.inner.transport)
            .finish_non_exhaustive()
    }
}
