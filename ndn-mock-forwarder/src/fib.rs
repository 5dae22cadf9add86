use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};
use ndn_mock_core::{ForwardingFlags, Interest, Name, TlvError};

use crate::face::{Face, OnInterestReceived};
use crate::transport::MockTransport;

/// In-process consumer of Interests routed to a local FIB entry
pub trait LocalHandler: Send + Sync {
    fn handle(&self, prefix: &Name, interest: &Interest, face: &Face, source: &Arc<MockTransport>);
}

/// Application callback behind a local entry; it never sees the source face
pub struct CallbackHandler<C>(pub C);

impl<C: OnInterestReceived> LocalHandler for CallbackHandler<C> {
    fn handle(
        &self,
        prefix: &Name,
        interest: &Interest,
        face: &Face,
        _source: &Arc<MockTransport>,
    ) {
        self.0.on_interest(prefix, interest, face)
    }
}

/// Where a FIB entry sends matching Interests
#[derive(Clone)]
pub enum FibDestination {
    /// Handled in-process; `face` is the forwarder-side face of the handler
    Local {
        handler: Arc<dyn LocalHandler>,
        face: Face,
    },
    /// Queued on a connected client's transport
    Remote { transport: Arc<MockTransport> },
}

/// FIB entry: one prefix, one destination
#[derive(Clone)]
pub struct FibEntry {
    pub prefix: Name,
    pub flags: ForwardingFlags,
    pub destination: FibDestination,
}

impl FibEntry {
    pub fn local(
        prefix: Name,
        handler: Arc<dyn LocalHandler>,
        face: Face,
        flags: ForwardingFlags,
    ) -> Self {
        Self {
            prefix,
            flags,
            destination: FibDestination::Local { handler, face },
        }
    }

    pub fn remote(prefix: Name, transport: Arc<MockTransport>, flags: ForwardingFlags) -> Self {
        Self {
            prefix,
            flags,
            destination: FibDestination::Remote { transport },
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.destination, FibDestination::Local { .. })
    }

    /// Deliver `interest`, which arrived from `source`, to this entry's destination
    pub fn forward(
        &self,
        interest: &Interest,
        source: &Arc<MockTransport>,
    ) -> Result<(), TlvError> {
        match &self.destination {
            FibDestination::Local { handler, face } => {
                debug!(
                    "Forwarding {} from face {} to local handler for {}",
                    interest.name,
                    source.id(),
                    self.prefix
                );
                handler.handle(&self.prefix, interest, face, source);
            }
            FibDestination::Remote { transport } => {
                debug!(
                    "Forwarding {} from face {} to face {}",
                    interest.name,
                    source.id(),
                    transport.id()
                );
                transport.receive(interest.encode()?);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FibEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let destination = match &self.destination {
            FibDestination::Local { face, .. } => format!("local(face {})", face.id()),
            FibDestination::Remote { transport } => format!("remote(face {})", transport.id()),
        };
        f.debug_struct("FibEntry")
            .field("prefix", &self.prefix)
            .field("flags", &self.flags)
            .field("destination", &destination)
            .finish()
    }
}

/// Forwarding Information Base: exact prefix to entry, queried by
/// longest-prefix match
#[derive(Debug, Default)]
pub struct Fib {
    entries: RwLock<HashMap<Name, Arc<FibEntry>>>,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry`, replacing any entry for the same prefix
    pub fn add(&self, entry: FibEntry) {
        let prefix = entry.prefix.clone();
        let replaced = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(prefix.clone(), Arc::new(entry))
            .is_some();
        if replaced {
            info!("Replaced FIB entry for prefix: {}", prefix);
        } else {
            info!("Added FIB entry for prefix: {}", prefix);
        }
    }

    pub fn remove(&self, prefix: &Name) -> Option<Arc<FibEntry>> {
        let entry = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(prefix);
        if entry.is_some() {
            info!("Removed FIB entry for prefix: {}", prefix);
        }
        entry
    }

    pub fn get(&self, prefix: &Name) -> Option<Arc<FibEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(prefix)
            .cloned()
    }

    /// Entries matching `interest`, longest prefix first.
    ///
    /// Walks every prefix of the Interest name from full length down to the
    /// empty name, stopping after an entry that does not let shorter
    /// prefixes through (`!child_inherit || capture`).
    pub fn find(&self, interest: &Interest) -> Vec<Arc<FibEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut found = Vec::new();

        for length in (0..=interest.name.len()).rev() {
            if let Some(entry) = entries.get(&interest.name.get_prefix(length)) {
                found.push(entry.clone());
                if entry.flags.stops_lookup() {
                    break;
                }
            }
        }

        debug!("FIB lookup for {}: {} entries", interest.name, found.len());
        found
    }

    pub fn contains(&self, prefix: &Name) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(prefix)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered prefixes in no particular order
    pub fn prefixes(&self) -> Vec<Name> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
