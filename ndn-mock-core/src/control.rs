//! NFD management structures used by prefix registration.
//!
//! Only the RIB subset is modelled: `ControlParameters` carried inside a
//! command name, and the `ControlResponse` placed in the reply Data.

use crate::name::{Name, NameComponent};
use crate::packets::tlv_types;
use crate::tlv::{
    decode_tlv_sequence, duration_to_millis, encode_tlv_sequence, TlvElement, TlvError,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Management prefix of the RIB module
pub const RIB_PREFIX: &str = "/localhost/nfd/rib";

/// Prefix under which register commands arrive
pub const RIB_REGISTER_PREFIX: &str = "/localhost/nfd/rib/register";

/// Verb of a prefix registration command
pub const REGISTER_VERB: &str = "register";

/// Number of components a signed command appends after the parameters:
/// timestamp, nonce, SignatureInfo and SignatureValue
pub const SIGNED_COMMAND_SUFFIX_LEN: usize = 4;

/// Status code of a successful command
pub const STATUS_OK: u64 = 200;

/// Route inheritance flags attached to a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForwardingFlags {
    pub child_inherit: bool,
    pub capture: bool,
}

impl ForwardingFlags {
    pub const CHILD_INHERIT: u64 = 1;
    pub const CAPTURE: u64 = 2;

    pub fn new(child_inherit: bool, capture: bool) -> Self {
        Self {
            child_inherit,
            capture,
        }
    }

    pub fn with_child_inherit(mut self, child_inherit: bool) -> Self {
        self.child_inherit = child_inherit;
        self
    }

    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// True when a longest-prefix-match walk must stop at this entry
    pub fn stops_lookup(&self) -> bool {
        !self.child_inherit || self.capture
    }

    pub fn to_u64(&self) -> u64 {
        let mut bits = 0;
        if self.child_inherit {
            bits |= Self::CHILD_INHERIT;
        }
        if self.capture {
            bits |= Self::CAPTURE;
        }
        bits
    }

    pub fn from_u64(bits: u64) -> Self {
        Self {
            child_inherit: bits & Self::CHILD_INHERIT != 0,
            capture: bits & Self::CAPTURE != 0,
        }
    }
}

impl Default for ForwardingFlags {
    fn default() -> Self {
        Self {
            child_inherit: true,
            capture: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlParameters {
    pub name: Option<Name>,
    pub face_id: Option<u64>,
    pub origin: Option<u64>,
    pub cost: Option<u64>,
    pub flags: Option<u64>,
    pub expiration_period: Option<Duration>,
}

impl ControlParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: Name) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_face_id(mut self, face_id: u64) -> Self {
        self.face_id = Some(face_id);
        self
    }

    pub fn with_origin(mut self, origin: u64) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_forwarding_flags(mut self, flags: ForwardingFlags) -> Self {
        self.flags = Some(flags.to_u64());
        self
    }

    pub fn with_expiration_period(mut self, period: Duration) -> Self {
        self.expiration_period = Some(period);
        self
    }

    /// Flags carried by the parameters; absent flags mean the registration
    /// defaults (child-inherit only)
    pub fn forwarding_flags(&self) -> ForwardingFlags {
        self.flags.map(ForwardingFlags::from_u64).unwrap_or_default()
    }

    pub fn to_tlv(&self) -> Result<TlvElement, TlvError> {
        let mut elements = Vec::new();

        if let Some(name) = &self.name {
            elements.push(name.to_tlv()?);
        }
        if let Some(face_id) = self.face_id {
            elements.push(TlvElement::from_u64(tlv_types::FACE_ID, face_id));
        }
        if let Some(origin) = self.origin {
            elements.push(TlvElement::from_u64(tlv_types::ORIGIN, origin));
        }
        if let Some(cost) = self.cost {
            elements.push(TlvElement::from_u64(tlv_types::COST, cost));
        }
        if let Some(flags) = self.flags {
            elements.push(TlvElement::from_u64(tlv_types::FLAGS, flags));
        }
        if let Some(period) = self.expiration_period {
            elements.push(TlvElement::from_u64(
                tlv_types::EXPIRATION_PERIOD,
                duration_to_millis(period),
            ));
        }

        Ok(TlvElement::new(
            tlv_types::CONTROL_PARAMETERS,
            encode_tlv_sequence(&elements)?,
        ))
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        if element.type_ != tlv_types::CONTROL_PARAMETERS {
            return Err(TlvError::InvalidType(element.type_));
        }

        let mut params = ControlParameters::new();
        for inner in decode_tlv_sequence(&element.value)? {
            match inner.type_ {
                tlv_types::NAME => params.name = Some(Name::from_tlv(&inner)?),
                tlv_types::FACE_ID => params.face_id = Some(inner.as_u64()?),
                tlv_types::ORIGIN => params.origin = Some(inner.as_u64()?),
                tlv_types::COST => params.cost = Some(inner.as_u64()?),
                tlv_types::FLAGS => params.flags = Some(inner.as_u64()?),
                tlv_types::EXPIRATION_PERIOD => {
                    params.expiration_period = Some(Duration::from_millis(inner.as_u64()?));
                }
                _ => {}
            }
        }
        Ok(params)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv()?.encode()
    }

    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        let (element, _) = TlvElement::decode(data)?;
        Self::from_tlv(&element)
    }

    /// Parameters embedded as a generic name component of a command Interest
    pub fn from_component(component: &NameComponent) -> Result<Self, TlvError> {
        Self::decode(&component.value)
    }

    pub fn to_component(&self) -> Result<NameComponent, TlvError> {
        Ok(NameComponent::new(self.encode()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status_code: u64,
    pub status_text: String,
    pub body: Option<ControlParameters>,
}

impl ControlResponse {
    pub fn new(status_code: u64, status_text: impl Into<String>) -> Self {
        Self {
            status_code,
            status_text: status_text.into(),
            body: None,
        }
    }

    /// 200 "OK" carrying the accepted parameters
    pub fn ok(body: ControlParameters) -> Self {
        Self::new(STATUS_OK, "OK").with_body(body)
    }

    pub fn with_body(mut self, body: ControlParameters) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == STATUS_OK
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut elements = vec![
            TlvElement::from_u64(tlv_types::STATUS_CODE, self.status_code),
            TlvElement::new(tlv_types::STATUS_TEXT, self.status_text.as_bytes().to_vec()),
        ];
        if let Some(body) = &self.body {
            elements.push(body.to_tlv()?);
        }

        TlvElement::new(tlv_types::CONTROL_RESPONSE, encode_tlv_sequence(&elements)?).encode()
    }

    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        let (element, _) = TlvElement::decode(data)?;
        if element.type_ != tlv_types::CONTROL_RESPONSE {
            return Err(TlvError::InvalidType(element.type_));
        }

        let mut status_code = None;
        let mut status_text = String::new();
        let mut body = None;

        for inner in decode_tlv_sequence(&element.value)? {
            match inner.type_ {
                tlv_types::STATUS_CODE => status_code = Some(inner.as_u64()?),
                tlv_types::STATUS_TEXT => {
                    status_text = String::from_utf8_lossy(&inner.value).into_owned();
                }
                tlv_types::CONTROL_PARAMETERS => body = Some(ControlParameters::from_tlv(&inner)?),
                _ => {}
            }
        }

        Ok(Self {
            status_code: status_code.ok_or(TlvError::MissingElement(tlv_types::STATUS_CODE))?,
            status_text,
            body,
        })
    }
}

/// Unsigned command name `<module_prefix>/<verb>/<ControlParameters>`
pub fn command_name(
    module_prefix: &Name,
    verb: &str,
    params: &ControlParameters,
) -> Result<Name, TlvError> {
    let mut name = module_prefix.clone();
    name.push(verb);
    name.push(params.to_component()?);
    Ok(name)
}

/// Split a register prefix such as `/localhost/nfd/rib/register` into the
/// module prefix commands are sent under and the verb
pub fn split_command_prefix(prefix: &Name) -> Option<(Name, String)> {
    let verb = prefix.get_from_end(1)?.as_str().ok()?.to_string();
    Some((prefix.get_prefix(prefix.len() - 1), verb))
}

/// Verb and parameters of a signed command under `module_prefix`, if the
/// name has that shape
pub fn parse_command(
    module_prefix: &Name,
    name: &Name,
) -> Option<(String, Result<ControlParameters, TlvError>)> {
    if !module_prefix.is_prefix_of(name)
        || name.len() < module_prefix.len() + 2 + SIGNED_COMMAND_SUFFIX_LEN
    {
        return None;
    }
    let verb = name.get(module_prefix.len())?.as_str().ok()?.to_string();
    let params = name
        .get_from_end(SIGNED_COMMAND_SUFFIX_LEN + 1)
        .ok_or(TlvError::BufferTooShort)
        .and_then(ControlParameters::from_component);
    Some((verb, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rib() -> Name {
        RIB_PREFIX.parse().unwrap()
    }

    #[test]
    fn test_forwarding_flags_bits() {
        let defaults = ForwardingFlags::default();
        assert!(defaults.child_inherit);
        assert!(!defaults.capture);
        assert_eq!(defaults.to_u64(), 1);

        let both = ForwardingFlags::new(true, true);
        assert_eq!(both.to_u64(), 3);
        assert_eq!(ForwardingFlags::from_u64(3), both);
        assert_eq!(ForwardingFlags::from_u64(0), ForwardingFlags::new(false, false));
    }

    #[test]
    fn test_stops_lookup() {
        assert!(!ForwardingFlags::default().stops_lookup());
        assert!(ForwardingFlags::default().with_capture(true).stops_lookup());
        assert!(ForwardingFlags::default().with_child_inherit(false).stops_lookup());
    }

    #[test]
    fn test_control_parameters_encoding() {
        let params = ControlParameters::new()
            .with_name("/a/b".parse().unwrap())
            .with_face_id(7)
            .with_origin(0)
            .with_cost(0)
            .with_forwarding_flags(ForwardingFlags::new(false, true))
            .with_expiration_period(Duration::from_secs(60));

        let encoded = params.encode().unwrap();
        assert_eq!(encoded[0], tlv_types::CONTROL_PARAMETERS);
        let decoded = ControlParameters::decode(&encoded).unwrap();
        assert_eq!(decoded, params);
        assert_eq!(decoded.forwarding_flags(), ForwardingFlags::new(false, true));
    }

    #[test]
    fn test_missing_flags_default_to_child_inherit() {
        let params = ControlParameters::new().with_name("/a".parse().unwrap());
        assert_eq!(params.forwarding_flags(), ForwardingFlags::default());
    }

    #[test]
    fn test_control_response_encoding() {
        let body = ControlParameters::new().with_name("/a".parse().unwrap()).with_face_id(2);
        let response = ControlResponse::ok(body.clone());

        let decoded = ControlResponse::decode(&response.encode().unwrap()).unwrap();
        assert!(decoded.is_ok());
        assert_eq!(decoded.status_text, "OK");
        assert_eq!(decoded.body, Some(body));
    }

    #[test]
    fn test_parse_signed_command() {
        let params = ControlParameters::new().with_name("/test".parse().unwrap());
        let mut name = command_name(&RIB_PREFIX.parse().unwrap(), "register", &params).unwrap();
        for suffix in ["ts", "nonce", "siginfo", "sigvalue"] {
            name.push(suffix);
        }

        let (verb, decoded) = parse_command(&rib(), &name).unwrap();
        assert_eq!(verb, "register");
        assert_eq!(decoded.unwrap(), params);
    }

    #[test]
    fn test_parse_command_rejects_short_or_foreign_names() {
        assert!(parse_command(&rib(), &"/localhost/nfd/rib/register".parse().unwrap()).is_none());
        assert!(parse_command(&rib(), &"/other/a/b/c/d/e/f/g".parse().unwrap()).is_none());

        let garbage: Name = "/localhost/nfd/rib/register/junk/1/2/3/4".parse().unwrap();
        let (_, params) = parse_command(&rib(), &garbage).unwrap();
        assert!(params.is_err());
    }

    #[test]
    fn test_parse_command_under_custom_module() {
        let (module, verb) = split_command_prefix(&"/custom/register".parse().unwrap()).unwrap();
        assert_eq!(module, "/custom".parse::<Name>().unwrap());
        assert_eq!(verb, REGISTER_VERB);

        let params = ControlParameters::new().with_name("/p".parse().unwrap());
        let mut name = command_name(&module, &verb, &params).unwrap();
        for suffix in ["ts", "nonce", "siginfo", "sigvalue"] {
            name.push(suffix);
        }
        let (parsed_verb, decoded) = parse_command(&module, &name).unwrap();
        assert_eq!(parsed_verb, "register");
        assert_eq!(decoded.unwrap(), params);
        assert!(parse_command(&rib(), &name).is_none());

        assert!(split_command_prefix(&Name::new()).is_none());
    }

    #[test]
    fn test_expiration_period_saturates_on_wire() {
        let params = ControlParameters::new().with_expiration_period(Duration::MAX);
        let decoded = ControlParameters::decode(&params.encode().unwrap()).unwrap();
        assert_eq!(decoded.expiration_period, Some(Duration::from_millis(u64::MAX)));
    }
}
