//! In-process forwarder tying faces, FIB and PIT together.
//!
//! ```
//! use ndn_mock_core::{Data, ForwardingFlags, Interest, Name};
//! use ndn_mock_forwarder::{Face, MockForwarder};
//!
//! let forwarder = MockForwarder::new();
//! let prefix: Name = "/test".parse().unwrap();
//! forwarder.register(prefix, |_: &Name, interest: &Interest, face: &Face| {
//!     face.put_data(&Data::new(interest.name.clone(), b"hi".to_vec())).unwrap();
//! }, ForwardingFlags::default());
//!
//! let face = forwarder.connect();
//! face.express_interest(Interest::new("/test/a".parse().unwrap()), |_, data| {
//!     assert_eq!(data.content, b"hi");
//! }).unwrap();
//! face.process_events();
//! ```

use std::sync::Arc;

use log::{info, warn};
use ndn_mock_core::control::{split_command_prefix, REGISTER_VERB};
use ndn_mock_core::{ForwardingFlags, KeyChain, Name, Signer};

use crate::config::ForwarderConfig;
use crate::face::{Face, OnInterestReceived};
use crate::fib::{CallbackHandler, Fib, FibEntry, LocalHandler};
use crate::handler::{BufferHandler, ForwardingTables};
use crate::pit::Pit;
use crate::registration::PrefixRegistration;
use crate::stats::{ForwardingStats, StatsSnapshot};
use crate::transport::MockTransport;

/// Single-hop forwarder connecting any number of in-memory faces
pub struct MockForwarder {
    tables: Arc<ForwardingTables>,
    key_chain: Arc<KeyChain>,
    /// Module prefix connected faces send registration commands under
    command_prefix: Option<Name>,
    config: ForwarderConfig,
}

impl MockForwarder {
    pub fn new() -> Self {
        Self::with_config(ForwarderConfig::default())
    }

    pub fn with_config(config: ForwarderConfig) -> Self {
        let identity = config.forwarder.identity.parse::<Name>().unwrap_or_else(|e| {
            warn!("Invalid forwarder identity {}: {}", config.forwarder.identity, e);
            Name::new()
        });
        let key_chain = Arc::new(KeyChain::configure(&identity));
        Self::with_signer(config, key_chain.clone(), key_chain)
    }

    /// Like [`MockForwarder::with_config`], with registration responses
    /// signed by `signer` instead of `key_chain`
    pub fn with_signer(
        config: ForwarderConfig,
        key_chain: Arc<KeyChain>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        let mut forwarder = Self {
            tables: Arc::new(ForwardingTables::new()),
            key_chain,
            command_prefix: None,
            config,
        };

        let configured = &forwarder.config.forwarder.registration_prefix;
        let prefix = match configured.parse::<Name>() {
            Ok(prefix) => prefix,
            Err(e) => {
                warn!(
                    "Invalid registration prefix {}, prefix registration disabled: {}",
                    configured, e
                );
                return forwarder;
            }
        };
        let module_prefix = match split_command_prefix(&prefix) {
            Some((module_prefix, verb)) if verb == REGISTER_VERB => module_prefix,
            _ => {
                warn!(
                    "Registration prefix {} does not end in /{}, prefix registration disabled",
                    prefix, REGISTER_VERB
                );
                return forwarder;
            }
        };

        let registration =
            PrefixRegistration::new(signer, module_prefix.clone(), &forwarder.tables);
        forwarder.register_handler(prefix, Arc::new(registration), ForwardingFlags::default());
        forwarder.command_prefix = Some(module_prefix);
        forwarder
    }

    /// New client face whose sends are processed by this forwarder
    pub fn connect(&self) -> Face {
        let transport = Arc::new(MockTransport::new());
        BufferHandler::attach(&transport, &self.tables);
        info!("Connected face {}", transport.id());
        let face = Face::with_owner(transport, self.tables.clone());
        face.set_command_signing_info(self.key_chain.clone());
        if let Some(prefix) = &self.command_prefix {
            face.set_command_prefix(prefix.clone());
        }
        face
    }

    /// Route Interests under `prefix` to `callback`, which answers through
    /// the face it is given
    pub fn register<C>(&self, prefix: Name, callback: C, flags: ForwardingFlags)
    where
        C: OnInterestReceived + 'static,
    {
        self.register_handler(prefix, Arc::new(CallbackHandler(callback)), flags);
    }

    fn register_handler(
        &self,
        prefix: Name,
        handler: Arc<dyn LocalHandler>,
        flags: ForwardingFlags,
    ) {
        // No owner: the FIB holds this face, so it must not hold the tables
        let transport = Arc::new(MockTransport::new());
        BufferHandler::attach(&transport, &self.tables);
        let face = Face::new(transport);
        self.tables.fib.add(FibEntry::local(prefix, handler, face, flags));
    }

    pub fn fib(&self) -> &Fib {
        &self.tables.fib
    }

    pub fn pit(&self) -> &Pit {
        &self.tables.pit
    }

    pub fn stats(&self) -> &ForwardingStats {
        &self.tables.stats
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.tables.stats.snapshot()
    }

    pub fn key_chain(&self) -> &Arc<KeyChain> {
        &self.key_chain
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }
}

impl Default for MockForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockForwarder")
            .field("fib_entries", &self.tables.fib.len())
            .field("pit_entries", &self.tables.pit.len())
            .field("key_chain", &self.key_chain)
            .finish()
    }
}
