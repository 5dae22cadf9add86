use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, warn};
use ndn_mock_core::{Data, Interest, Name, TlvError};

use crate::transport::MockTransport;

/// PIT entry tracking one outstanding Interest and who asked for it
#[derive(Debug, Clone)]
pub struct PitEntry {
    pub interest: Interest,
    pub requester: Arc<MockTransport>,
    satisfied: bool,
}

impl PitEntry {
    pub fn new(interest: Interest, requester: Arc<MockTransport>) -> Self {
        Self {
            interest,
            requester,
            satisfied: false,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    /// Queue `data` on the requester's transport and mark the entry satisfied.
    /// Forwarding through an already satisfied entry is logged and still done.
    pub fn forward(&mut self, data: &Data) -> Result<(), TlvError> {
        if self.satisfied {
            warn!(
                "Data {} forwarded again through satisfied PIT entry {}",
                data.name, self.interest.name
            );
        }
        debug!("Delivering Data {} to face {}", data.name, self.requester.id());
        self.requester.receive(data.encode()?);
        self.satisfied = true;
        Ok(())
    }
}

/// Pending Interest Table: exact Interest name to the entries waiting on it
#[derive(Debug, Default)]
pub struct Pit {
    entries: RwLock<HashMap<Name, Vec<PitEntry>>>,
}

impl Pit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` to the bucket for its Interest name
    pub fn add(&self, entry: PitEntry) {
        let name = entry.interest.name.clone();
        debug!("Adding PIT entry for {} from face {}", name, entry.requester.id());
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name)
            .or_default()
            .push(entry);
    }

    /// True when any entry is pending under the exact Interest name.
    /// The requester is not considered.
    pub fn has(&self, interest: &Interest) -> bool {
        self.contains(&interest.name)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(false, |bucket| !bucket.is_empty())
    }

    /// Remove and return the entries of every prefix of `name`, longest first
    pub fn extract(&self, name: &Name) -> Vec<PitEntry> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut extracted = Vec::new();

        for length in (0..=name.len()).rev() {
            if let Some(bucket) = entries.remove(&name.get_prefix(length)) {
                extracted.extend(bucket);
            }
        }

        debug!("Extracted {} PIT entries for {}", extracted.len(), name);
        extracted
    }

    /// Total number of pending entries across all names
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
