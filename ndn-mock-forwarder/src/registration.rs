use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use ndn_mock_core::control::{parse_command, REGISTER_VERB};
use ndn_mock_core::{ControlResponse, Data, Interest, Name, Signer};

use crate::face::Face;
use crate::fib::{FibEntry, LocalHandler};
use crate::handler::ForwardingTables;
use crate::transport::MockTransport;

/// Answers `<module_prefix>/register` commands by routing the requested
/// prefix back to the face that sent the command
pub struct PrefixRegistration {
    signer: Arc<dyn Signer>,
    module_prefix: Name,
    tables: Weak<ForwardingTables>,
}

impl PrefixRegistration {
    /// `module_prefix` is the command prefix without the verb, normally
    /// `/localhost/nfd/rib`
    pub fn new(
        signer: Arc<dyn Signer>,
        module_prefix: Name,
        tables: &Arc<ForwardingTables>,
    ) -> Self {
        Self {
            signer,
            module_prefix,
            tables: Arc::downgrade(tables),
        }
    }

    fn respond(&self, interest: &Interest, response: ControlResponse, face: &Face) {
        let content = match response.encode() {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to encode registration response for {}: {}", interest.name, e);
                return;
            }
        };

        let mut data = Data::new(interest.name.clone(), content);
        if let Err(e) = self.signer.sign(&mut data) {
            error!("Failed to sign registration response, sending unsigned: {}", e);
        }
        if let Err(e) = face.put_data(&data) {
            warn!("Failed to send registration response for {}: {}", interest.name, e);
        }
    }
}

impl LocalHandler for PrefixRegistration {
    fn handle(
        &self,
        _prefix: &Name,
        interest: &Interest,
        face: &Face,
        source: &Arc<MockTransport>,
    ) {
        let Some((verb, params)) = parse_command(&self.module_prefix, &interest.name) else {
            warn!("Malformed RIB command {}, ignoring", interest.name);
            return;
        };
        if verb != REGISTER_VERB {
            warn!("Unsupported RIB command verb '{}', ignoring", verb);
            return;
        }
        let params = match params {
            Ok(params) => params,
            Err(e) => {
                error!("Failed to decode ControlParameters in {}: {}", interest.name, e);
                return;
            }
        };
        let Some(prefix) = params.name.clone() else {
            error!("RIB register command {} carries no name", interest.name);
            return;
        };
        let Some(tables) = self.tables.upgrade() else {
            debug!("Forwarder is gone, ignoring registration of {}", prefix);
            return;
        };

        let flags = params.forwarding_flags();
        tables.fib.add(FibEntry::remote(prefix.clone(), source.clone(), flags));
        info!("Registered prefix {} to face {}", prefix, source.id());

        let body = params.with_face_id(source.id()).with_origin(0).with_cost(0);
        self.respond(interest, ControlResponse::ok(body), face);
    }
}
