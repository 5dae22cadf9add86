use crate::name::Name;
use crate::tlv::{
    decode_tlv_sequence, duration_to_millis, encode_tlv_sequence, peek_type, TlvElement, TlvError,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wire type numbers: NDN packet format 0.3 plus NFD management
pub mod tlv_types {
    pub const IMPLICIT_SHA256_DIGEST_COMPONENT: u8 = 0x01;
    pub const PARAMETERS_SHA256_DIGEST_COMPONENT: u8 = 0x02;
    pub const INTEREST: u8 = 0x05;
    pub const DATA: u8 = 0x06;
    pub const NAME: u8 = 0x07;
    pub const GENERIC_NAME_COMPONENT: u8 = 0x08;
    pub const NONCE: u8 = 0x0A;
    pub const INTEREST_LIFETIME: u8 = 0x0C;
    pub const MUST_BE_FRESH: u8 = 0x12;
    pub const META_INFO: u8 = 0x14;
    pub const CONTENT: u8 = 0x15;
    pub const SIGNATURE_INFO: u8 = 0x16;
    pub const SIGNATURE_VALUE: u8 = 0x17;
    pub const CONTENT_TYPE: u8 = 0x18;
    pub const FRESHNESS_PERIOD: u8 = 0x19;
    pub const FINAL_BLOCK_ID: u8 = 0x1A;
    pub const SIGNATURE_TYPE: u8 = 0x1B;
    pub const KEY_LOCATOR: u8 = 0x1C;
    pub const KEY_DIGEST: u8 = 0x1D;
    pub const CAN_BE_PREFIX: u8 = 0x21;
    pub const HOP_LIMIT: u8 = 0x22;
    pub const APPLICATION_PARAMETERS: u8 = 0x24;

    // NFD management protocol
    pub const CONTROL_RESPONSE: u8 = 0x65;
    pub const STATUS_CODE: u8 = 0x66;
    pub const STATUS_TEXT: u8 = 0x67;
    pub const CONTROL_PARAMETERS: u8 = 0x68;
    pub const FACE_ID: u8 = 0x69;
    pub const COST: u8 = 0x6A;
    pub const FLAGS: u8 = 0x6C;
    pub const EXPIRATION_PERIOD: u8 = 0x6D;
    pub const ORIGIN: u8 = 0x6F;
}

/// Interest lifetime assumed when the packet carries none
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_millis(4000);

/// Where a verifier finds the signing key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyLocator {
    Name(Name),
    KeyDigest(Vec<u8>),
}

/// Request for named Data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    pub nonce: Option<u32>,
    pub interest_lifetime: Option<Duration>,
    pub hop_limit: Option<u8>,
    pub application_parameters: Option<Vec<u8>>,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            nonce: None,
            interest_lifetime: None,
            hop_limit: None,
            application_parameters: None,
        }
    }

    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.interest_lifetime = Some(lifetime);
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = Some(hop_limit);
        self
    }

    pub fn with_application_parameters(mut self, params: Vec<u8>) -> Self {
        self.application_parameters = Some(params);
        self
    }

    /// Pick a random nonce unless one is already set
    pub fn ensure_nonce(&mut self) {
        if self.nonce.is_none() {
            self.nonce = Some(rand::random());
        }
    }

    /// Lifetime carried by the packet, or the protocol default
    pub fn lifetime(&self) -> Duration {
        self.interest_lifetime.unwrap_or(DEFAULT_INTEREST_LIFETIME)
    }

    /// True when `data_name` falls under this Interest's name
    pub fn matches_data(&self, data_name: &Name) -> bool {
        self.name.is_prefix_of(data_name)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut elements = vec![self.name.to_tlv()?];

        if self.can_be_prefix {
            elements.push(TlvElement::new(tlv_types::CAN_BE_PREFIX, vec![]));
        }
        if self.must_be_fresh {
            elements.push(TlvElement::new(tlv_types::MUST_BE_FRESH, vec![]));
        }
        if let Some(nonce) = self.nonce {
            elements.push(TlvElement::new(tlv_types::NONCE, nonce.to_be_bytes().to_vec()));
        }
        if let Some(lifetime) = self.interest_lifetime {
            elements.push(TlvElement::from_u64(
                tlv_types::INTEREST_LIFETIME,
                duration_to_millis(lifetime),
            ));
        }
        if let Some(hop_limit) = self.hop_limit {
            elements.push(TlvElement::new(tlv_types::HOP_LIMIT, vec![hop_limit]));
        }
        if let Some(params) = &self.application_parameters {
            elements.push(TlvElement::new(tlv_types::APPLICATION_PARAMETERS, params.clone()));
        }

        TlvElement::new(tlv_types::INTEREST, encode_tlv_sequence(&elements)?).encode()
    }

    /// Returns the Interest and the number of bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (outer, consumed) = TlvElement::decode(data)?;
        if outer.type_ != tlv_types::INTEREST {
            return Err(TlvError::InvalidType(outer.type_));
        }

        let mut name = None;
        let mut interest = Interest::new(Name::new());

        for element in decode_tlv_sequence(&outer.value)? {
            match element.type_ {
                tlv_types::NAME => name = Some(Name::from_tlv(&element)?),
                tlv_types::CAN_BE_PREFIX => interest.can_be_prefix = true,
                tlv_types::MUST_BE_FRESH => interest.must_be_fresh = true,
                tlv_types::NONCE => {
                    let bytes: [u8; 4] = element
                        .value
                        .as_slice()
                        .try_into()
                        .map_err(|_| TlvError::InvalidLength)?;
                    interest.nonce = Some(u32::from_be_bytes(bytes));
                }
                tlv_types::INTEREST_LIFETIME => {
                    interest.interest_lifetime = Some(Duration::from_millis(element.as_u64()?));
                }
                tlv_types::HOP_LIMIT => {
                    interest.hop_limit = element.value.first().copied();
                }
                tlv_types::APPLICATION_PARAMETERS => {
                    interest.application_parameters = Some(element.value);
                }
                _ => {}
            }
        }

        interest.name = name.ok_or(TlvError::MissingElement(tlv_types::NAME))?;
        Ok((interest, consumed))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    Blob = 0,
    Link = 1,
    Key = 2,
    Nack = 3,
}

impl ContentType {
    fn from_u64(value: u64) -> Self {
        match value {
            1 => ContentType::Link,
            2 => ContentType::Key,
            3 => ContentType::Nack,
            _ => ContentType::Blob,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    pub content_type: ContentType,
    pub freshness_period: Option<Duration>,
    pub final_block_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature_type: u64,
    pub key_locator: Option<KeyLocator>,
}

impl SignatureInfo {
    pub fn new(signature_type: u64) -> Self {
        Self {
            signature_type,
            key_locator: None,
        }
    }

    pub fn with_key_locator(mut self, key_locator: KeyLocator) -> Self {
        self.key_locator = Some(key_locator);
        self
    }

    /// Encode as a complete SignatureInfo TLV element
    pub fn to_tlv(&self) -> Result<TlvElement, TlvError> {
        Ok(TlvElement::new(tlv_types::SIGNATURE_INFO, encode_signature_info(self)?))
    }
}

/// Named, optionally signed payload answering an Interest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub meta_info: Option<MetaInfo>,
    pub content: Vec<u8>,
    pub signature_info: Option<SignatureInfo>,
    pub signature_value: Option<Vec<u8>>,
}

impl Data {
    pub fn new(name: Name, content: Vec<u8>) -> Self {
        Self {
            name,
            meta_info: None,
            content,
            signature_info: None,
            signature_value: None,
        }
    }

    pub fn with_meta_info(mut self, meta_info: MetaInfo) -> Self {
        self.meta_info = Some(meta_info);
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.meta_info.get_or_insert_with(Default::default).content_type = content_type;
        self
    }

    pub fn with_freshness_period(mut self, freshness_period: Duration) -> Self {
        self.meta_info
            .get_or_insert_with(Default::default)
            .freshness_period = Some(freshness_period);
        self
    }

    pub fn with_signature_info(mut self, signature_info: SignatureInfo) -> Self {
        self.signature_info = Some(signature_info);
        self
    }

    pub fn with_signature_value(mut self, signature_value: Vec<u8>) -> Self {
        self.signature_value = Some(signature_value);
        self
    }

    pub fn matches_interest(&self, interest: &Interest) -> bool {
        interest.matches_data(&self.name)
    }

    pub fn is_signed(&self) -> bool {
        self.signature_info.is_some() && self.signature_value.is_some()
    }

    /// Bytes covered by the signature: Name, MetaInfo, Content and
    /// SignatureInfo TLVs in wire order
    pub fn signed_portion(&self) -> Result<Vec<u8>, TlvError> {
        let mut elements = vec![self.name.to_tlv()?];

        if let Some(meta_info) = &self.meta_info {
            elements.push(TlvElement::new(tlv_types::META_INFO, encode_meta_info(meta_info)?));
        }
        elements.push(TlvElement::new(tlv_types::CONTENT, self.content.clone()));
        if let Some(sig_info) = &self.signature_info {
            elements.push(sig_info.to_tlv()?);
        }

        encode_tlv_sequence(&elements)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut value = self.signed_portion()?;
        if let Some(sig_value) = &self.signature_value {
            TlvElement::new(tlv_types::SIGNATURE_VALUE, sig_value.clone()).encode_to(&mut value)?;
        }
        TlvElement::new(tlv_types::DATA, value).encode()
    }

    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (outer, consumed) = TlvElement::decode(data)?;
        if outer.type_ != tlv_types::DATA {
            return Err(TlvError::InvalidType(outer.type_));
        }

        let mut name = None;
        let mut decoded = Data::new(Name::new(), Vec::new());

        for element in decode_tlv_sequence(&outer.value)? {
            match element.type_ {
                tlv_types::NAME => name = Some(Name::from_tlv(&element)?),
                tlv_types::META_INFO => decoded.meta_info = Some(decode_meta_info(&element.value)?),
                tlv_types::CONTENT => decoded.content = element.value,
                tlv_types::SIGNATURE_INFO => {
                    decoded.signature_info = Some(decode_signature_info(&element.value)?);
                }
                tlv_types::SIGNATURE_VALUE => decoded.signature_value = Some(element.value),
                // Non-critical elements we do not model
                _ => {}
            }
        }

        decoded.name = name.ok_or(TlvError::MissingElement(tlv_types::NAME))?;
        Ok((decoded, consumed))
    }
}

/// Outer packet type as identified by the first wire byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketType {
    Interest,
    Data,
}

impl PacketType {
    /// Classify a wire buffer; `None` for anything that is not Interest or Data
    pub fn peek(buffer: &[u8]) -> Option<Self> {
        match peek_type(buffer)? {
            tlv_types::INTEREST => Some(PacketType::Interest),
            tlv_types::DATA => Some(PacketType::Data),
            _ => None,
        }
    }
}

/// Decoded network-layer packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
}

impl Packet {
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(interest) => &interest.name,
            Packet::Data(data) => &data.name,
        }
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Interest(_) => PacketType::Interest,
            Packet::Data(_) => PacketType::Data,
        }
    }

    pub fn is_interest(&self) -> bool {
        matches!(self, Packet::Interest(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Packet::Data(_))
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        match self {
            Packet::Interest(interest) => interest.encode(),
            Packet::Data(data) => data.encode(),
        }
    }

    /// Decode a complete wire buffer into an Interest or a Data
    pub fn decode(buffer: &[u8]) -> Result<Self, TlvError> {
        match PacketType::peek(buffer) {
            Some(PacketType::Interest) => Ok(Packet::Interest(Interest::decode(buffer)?.0)),
            Some(PacketType::Data) => Ok(Packet::Data(Data::decode(buffer)?.0)),
            None => match peek_type(buffer) {
                Some(other) => Err(TlvError::InvalidType(other)),
                None => Err(TlvError::BufferTooShort),
            },
        }
    }
}

impl From<Interest> for Packet {
    fn from(interest: Interest) -> Self {
        Packet::Interest(interest)
    }
}

impl From<Data> for Packet {
    fn from(data: Data) -> Self {
        Packet::Data(data)
    }
}

fn encode_meta_info(meta_info: &MetaInfo) -> Result<Vec<u8>, TlvError> {
    let mut elements = Vec::new();

    if meta_info.content_type != ContentType::default() {
        elements.push(TlvElement::from_u64(
            tlv_types::CONTENT_TYPE,
            meta_info.content_type as u64,
        ));
    }
    if let Some(freshness_period) = meta_info.freshness_period {
        elements.push(TlvElement::from_u64(
            tlv_types::FRESHNESS_PERIOD,
            duration_to_millis(freshness_period),
        ));
    }
    if let Some(final_block_id) = &meta_info.final_block_id {
        elements.push(TlvElement::new(tlv_types::FINAL_BLOCK_ID, final_block_id.clone()));
    }

    encode_tlv_sequence(&elements)
}

fn decode_meta_info(data: &[u8]) -> Result<MetaInfo, TlvError> {
    let mut meta_info = MetaInfo::default();

    for element in decode_tlv_sequence(data)? {
        match element.type_ {
            tlv_types::CONTENT_TYPE => {
                meta_info.content_type = ContentType::from_u64(element.as_u64()?);
            }
            tlv_types::FRESHNESS_PERIOD => {
                meta_info.freshness_period = Some(Duration::from_millis(element.as_u64()?));
            }
            tlv_types::FINAL_BLOCK_ID => meta_info.final_block_id = Some(element.value),
            _ => {}
        }
    }

    Ok(meta_info)
}

fn encode_signature_info(info: &SignatureInfo) -> Result<Vec<u8>, TlvError> {
    let signature_type = TlvElement::from_u64(tlv_types::SIGNATURE_TYPE, info.signature_type);
    match &info.key_locator {
        Some(locator) => encode_tlv_sequence(&[
            signature_type,
            TlvElement::new(tlv_types::KEY_LOCATOR, encode_key_locator(locator)?),
        ]),
        None => signature_type.encode(),
    }
}

fn decode_signature_info(data: &[u8]) -> Result<SignatureInfo, TlvError> {
    let elements = decode_tlv_sequence(data)?;
    let signature_type = elements
        .iter()
        .find(|e| e.type_ == tlv_types::SIGNATURE_TYPE)
        .ok_or(TlvError::MissingElement(tlv_types::SIGNATURE_TYPE))?
        .as_u64()?;
    let key_locator = elements
        .iter()
        .find(|e| e.type_ == tlv_types::KEY_LOCATOR)
        .map(|e| decode_key_locator(&e.value))
        .transpose()?;

    Ok(SignatureInfo {
        signature_type,
        key_locator,
    })
}

fn encode_key_locator(key_locator: &KeyLocator) -> Result<Vec<u8>, TlvError> {
    match key_locator {
        KeyLocator::Name(name) => name.encode(),
        KeyLocator::KeyDigest(digest) => {
            TlvElement::new(tlv_types::KEY_DIGEST, digest.clone()).encode()
        }
    }
}

fn decode_key_locator(data: &[u8]) -> Result<KeyLocator, TlvError> {
    let (inner, _) = TlvElement::decode(data)?;
    match inner.type_ {
        tlv_types::NAME => Ok(KeyLocator::Name(Name::from_tlv(&inner)?)),
        tlv_types::KEY_DIGEST => Ok(KeyLocator::KeyDigest(inner.value)),
        other => Err(TlvError::InvalidType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn test_interest_builder() {
        let interest = Interest::new(name("/app/query"))
            .with_nonce(0x0102_0304)
            .with_lifetime(Duration::from_millis(2500))
            .with_hop_limit(16)
            .with_must_be_fresh(true);

        assert_eq!(interest.name, name("/app/query"));
        assert_eq!(interest.nonce, Some(0x0102_0304));
        assert_eq!(interest.lifetime(), Duration::from_millis(2500));
        assert_eq!(interest.hop_limit, Some(16));
        assert!(interest.must_be_fresh);
        assert!(!interest.can_be_prefix);
    }

    #[test]
    fn test_default_lifetime() {
        let interest = Interest::new(name("/a"));
        assert_eq!(interest.lifetime(), DEFAULT_INTEREST_LIFETIME);
    }

    #[test]
    fn test_oversized_lifetime_saturates_on_wire() {
        let interest = Interest::new(name("/slow")).with_lifetime(Duration::MAX);
        let (decoded, _) = Interest::decode(&interest.encode().unwrap()).unwrap();
        assert_eq!(decoded.lifetime(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_ensure_nonce() {
        let mut interest = Interest::new(name("/a"));
        interest.ensure_nonce();
        assert!(interest.nonce.is_some());

        let mut fixed = Interest::new(name("/a")).with_nonce(7);
        fixed.ensure_nonce();
        assert_eq!(fixed.nonce, Some(7));
    }

    fn data_matches(interest: &Interest, data: &Data) -> bool {
        interest.matches_data(&data.name)
    }

    #[test]
    fn test_data_under_interest_name_matches() {
        let interest = Interest::new(name("/video"));
        let segment = Data::new(name("/video/seg=3"), vec![3]);

        assert!(data_matches(&interest, &segment));
        assert!(segment.matches_interest(&interest));
        assert!(!Interest::new(name("/audio")).matches_data(&segment.name));
        assert!(!Interest::new(name("/video/seg=3/x")).matches_data(&segment.name));
    }

    #[test]
    fn test_interest_wire_format() {
        let interest = Interest::new(name("/app/query"))
            .with_can_be_prefix(true)
            .with_must_be_fresh(true)
            .with_nonce(0xDEADBEEF)
            .with_lifetime(Duration::from_millis(1000))
            .with_hop_limit(64)
            .with_application_parameters(vec![1, 2, 3]);

        let wire = interest.encode().unwrap();
        assert_eq!(PacketType::peek(&wire), Some(PacketType::Interest));

        let (decoded, consumed) = Interest::decode(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(decoded, interest);
    }

    #[test]
    fn test_interest_without_name_is_rejected() {
        let body = TlvElement::new(tlv_types::NONCE, vec![0, 0, 0, 1]).encode().unwrap();
        let wire = TlvElement::new(tlv_types::INTEREST, body).encode().unwrap();
        assert!(matches!(
            Interest::decode(&wire),
            Err(TlvError::MissingElement(tlv_types::NAME))
        ));
    }

    #[test]
    fn test_data_wire_format() {
        let data = Data::new(name("/video/seg=9"), vec![0xAB; 40])
            .with_content_type(ContentType::Key)
            .with_freshness_period(Duration::from_millis(500))
            .with_signature_info(
                SignatureInfo::new(5).with_key_locator(KeyLocator::Name(name("/video/KEY/1"))),
            )
            .with_signature_value(vec![0x5A; 64]);

        let wire = data.encode().unwrap();
        let (decoded, consumed) = Data::decode(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(decoded, data);
        assert!(decoded.is_signed());
    }

    #[test]
    fn test_data_without_content() {
        let wire = Data::new(name("/ack"), vec![]).encode().unwrap();
        let (decoded, _) = Data::decode(&wire).unwrap();
        assert_eq!(decoded.name, name("/ack"));
        assert!(decoded.content.is_empty());
        assert_eq!(decoded.meta_info, None);
        assert!(!decoded.is_signed());
    }

    #[test]
    fn test_signed_portion_excludes_signature_value() {
        let unsigned =
            Data::new(name("/a"), b"x".to_vec()).with_signature_info(SignatureInfo::new(0));
        let signed = unsigned.clone().with_signature_value(vec![9; 32]);

        assert_eq!(unsigned.signed_portion().unwrap(), signed.signed_portion().unwrap());
        assert!(signed.encode().unwrap().len() > unsigned.encode().unwrap().len());
    }

    #[test]
    fn test_key_locator_variants() {
        for locator in [
            KeyLocator::Name(name("/mock/key/KEY/01")),
            KeyLocator::KeyDigest(vec![0x11; 32]),
        ] {
            let wire = encode_key_locator(&locator).unwrap();
            assert_eq!(decode_key_locator(&wire).unwrap(), locator);
        }
        assert!(matches!(
            decode_key_locator(&[tlv_types::CONTENT, 0]),
            Err(TlvError::InvalidType(tlv_types::CONTENT))
        ));
    }

    #[test]
    fn test_packet_decode_dispatch() {
        let interest = Interest::new(name("/chat/room"));
        let data = Data::new(name("/chat/room"), b"hi".to_vec());

        let first = Packet::decode(&interest.encode().unwrap()).unwrap();
        let second = Packet::decode(&data.encode().unwrap()).unwrap();

        assert!(first.is_interest() && !first.is_data());
        assert_eq!(first.packet_type(), PacketType::Interest);
        assert!(second.is_data());
        assert_eq!(second.name(), &name("/chat/room"));
        assert_eq!(Packet::from(data.clone()).encode().unwrap(), data.encode().unwrap());
    }

    #[test]
    fn test_packet_decode_rejects_unknown_type() {
        assert!(matches!(Packet::decode(&[0x64, 0x00]), Err(TlvError::InvalidType(0x64))));
        assert!(matches!(Packet::decode(&[]), Err(TlvError::BufferTooShort)));
        assert_eq!(PacketType::peek(&[0x64]), None);
        assert!(Packet::decode(&[0x05, 0x05, 0x07]).is_err());
    }
}
