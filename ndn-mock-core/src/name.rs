use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tlv::{decode_tlv_sequence, encode_tlv_sequence, TlvElement, TlvError};
use crate::tlv_types;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentType {
    Generic,
    ImplicitSha256Digest,
    ParametersSha256Digest,
}

impl ComponentType {
    pub fn tlv_type(&self) -> u8 {
        match self {
            ComponentType::Generic => tlv_types::GENERIC_NAME_COMPONENT,
            ComponentType::ImplicitSha256Digest => tlv_types::IMPLICIT_SHA256_DIGEST_COMPONENT,
            ComponentType::ParametersSha256Digest => tlv_types::PARAMETERS_SHA256_DIGEST_COMPONENT,
        }
    }

    pub fn from_tlv_type(type_: u8) -> Result<Self, TlvError> {
        match type_ {
            tlv_types::GENERIC_NAME_COMPONENT => Ok(ComponentType::Generic),
            tlv_types::IMPLICIT_SHA256_DIGEST_COMPONENT => {
                Ok(ComponentType::ImplicitSha256Digest)
            }
            tlv_types::PARAMETERS_SHA256_DIGEST_COMPONENT => {
                Ok(ComponentType::ParametersSha256Digest)
            }
            other => Err(TlvError::InvalidType(other)),
        }
    }
}

/// A single opaque name component
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameComponent {
    pub component_type: ComponentType,
    pub value: Vec<u8>,
}

impl NameComponent {
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            component_type: ComponentType::Generic,
            value,
        }
    }

    pub fn with_type(value: Vec<u8>, component_type: ComponentType) -> Self {
        Self {
            component_type,
            value,
        }
    }

    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.value)
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn to_tlv(&self) -> TlvElement {
        TlvElement::new(self.component_type.tlv_type(), self.value.clone())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        Ok(Self::with_type(
            element.value.clone(),
            ComponentType::from_tlv_type(element.type_)?,
        ))
    }

    /// Parse a percent-escaped URI segment
    fn parse_escaped(segment: &str) -> Result<Self, NameParseError> {
        let bytes = segment.as_bytes();
        let mut value = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex = segment
                    .get(i + 1..i + 3)
                    .ok_or(NameParseError::InvalidEscape)?;
                let byte = u8::from_str_radix(hex, 16).map_err(|_| NameParseError::InvalidEscape)?;
                value.push(byte);
                i += 3;
            } else {
                value.push(bytes[i]);
                i += 1;
            }
        }
        Ok(Self::new(value))
    }
}

impl From<&str> for NameComponent {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for NameComponent {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.component_type {
            ComponentType::ImplicitSha256Digest => write!(f, "sha256digest=")?,
            ComponentType::ParametersSha256Digest => write!(f, "params-sha256=")?,
            ComponentType::Generic => {}
        }
        for &b in &self.value {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "%{:02X}", b)?;
            }
        }
        Ok(())
    }
}

/// Hierarchical NDN name; the key of both forwarding tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    pub components: Vec<NameComponent>,
}

impl Name {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn push(&mut self, component: impl Into<NameComponent>) {
        self.components.push(component.into());
    }

    /// Builder-style append
    pub fn with_component(mut self, component: impl Into<NameComponent>) -> Self {
        self.push(component);
        self
    }

    pub fn append(&mut self, name: &Name) {
        self.components.extend(name.components.iter().cloned());
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    /// Component counted from the end; `k == 1` is the last component
    pub fn get_from_end(&self, k: usize) -> Option<&NameComponent> {
        if k == 0 || k > self.components.len() {
            return None;
        }
        self.components.get(self.components.len() - k)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// First `length` components; clamped to the name length
    pub fn get_prefix(&self, length: usize) -> Name {
        let end = std::cmp::min(length, self.components.len());
        Self {
            components: self.components[..end].to_vec(),
        }
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.components.len() <= other.components.len()
            && self.components.iter().zip(&other.components).all(|(a, b)| a == b)
    }

    pub fn to_uri(&self) -> String {
        if self.components.is_empty() {
            return "/".to_string();
        }

        let mut uri = String::new();
        for component in &self.components {
            uri.push('/');
            uri.push_str(&component.to_string());
        }
        uri
    }

    /// Encode as a Name TLV element
    pub fn to_tlv(&self) -> Result<TlvElement, TlvError> {
        let components: Vec<TlvElement> = self.components.iter().map(|c| c.to_tlv()).collect();
        Ok(TlvElement::new(tlv_types::NAME, encode_tlv_sequence(&components)?))
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, TlvError> {
        if element.type_ != tlv_types::NAME {
            return Err(TlvError::InvalidType(element.type_));
        }
        let components = decode_tlv_sequence(&element.value)?
            .iter()
            .map(NameComponent::from_tlv)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { components })
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_tlv()?.encode()
    }

    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        let (element, _) = TlvElement::decode(data)?;
        Self::from_tlv(&element)
    }
}

impl FromStr for Name {
    type Err = NameParseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let trimmed = name.strip_prefix("ndn:").unwrap_or(name);
        let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);

        let components = trimmed
            .split('/')
            .filter(|part| !part.is_empty())
            .map(NameComponent::parse_escaped)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameParseError {
    #[error("Invalid percent-escape in name URI")]
    InvalidEscape,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri_components() {
        let name: Name = "/localhost/nfd/rib".parse().unwrap();
        let parts: Vec<&str> = name.components.iter().map(|c| c.as_str().unwrap()).collect();
        assert_eq!(parts, ["localhost", "nfd", "rib"]);
        assert_eq!(format!("{name}"), "/localhost/nfd/rib");
    }

    #[test]
    fn test_name_escaping() {
        let name = Name::new().with_component(vec![0x00, b'b']).with_component("a b");
        assert_eq!(name.to_uri(), "/%00b/a%20b");

        let parsed: Name = name.to_uri().parse().unwrap();
        assert_eq!(parsed, name);

        assert_eq!("/bad%zz".parse::<Name>(), Err(NameParseError::InvalidEscape));
        assert_eq!("/bad%4".parse::<Name>(), Err(NameParseError::InvalidEscape));
    }

    #[test]
    fn test_prefixes_for_longest_match() {
        let name: Name = "/a/b/c".parse().unwrap();
        let walk: Vec<String> =
            (0..=name.len()).rev().map(|n| name.get_prefix(n).to_uri()).collect();
        assert_eq!(walk, ["/a/b/c", "/a/b", "/a", "/"]);
        assert_eq!(name.get_prefix(10), name);
    }

    #[test]
    fn test_is_prefix_of() {
        let a: Name = "/a".parse().unwrap();
        let ab: Name = "/a/b".parse().unwrap();
        let ac: Name = "/a/c".parse().unwrap();

        assert!(a.is_prefix_of(&ab));
        assert!(ab.is_prefix_of(&ab));
        assert!(!ab.is_prefix_of(&a));
        assert!(!ab.is_prefix_of(&ac));
        assert!(Name::new().is_prefix_of(&a));
    }

    #[test]
    fn test_get_from_end() {
        let name: Name = "/a/b/c".parse().unwrap();
        assert_eq!(name.get_from_end(1).unwrap().as_str().unwrap(), "c");
        assert_eq!(name.get_from_end(3).unwrap().as_str().unwrap(), "a");
        assert!(name.get_from_end(0).is_none());
        assert!(name.get_from_end(4).is_none());
    }

    #[test]
    fn test_name_tlv() {
        let name: Name = "/a/bc".parse().unwrap();
        let wire = name.encode().unwrap();
        assert_eq!(wire, vec![0x07, 0x07, 0x08, 0x01, b'a', 0x08, 0x02, b'b', b'c']);
        assert_eq!(Name::decode(&wire).unwrap(), name);
    }

    #[test]
    fn test_digest_component_type_survives_decoding() {
        let mut name: Name = "/a".parse().unwrap();
        name.push(NameComponent::with_type(vec![0xAB; 32], ComponentType::ImplicitSha256Digest));
        let decoded = Name::decode(&name.encode().unwrap()).unwrap();
        assert_eq!(decoded, name);
        assert!(decoded.to_uri().contains("sha256digest="));
    }

    #[test]
    fn test_empty_name() {
        let root: Name = "".parse().unwrap();
        assert!(root.is_empty());
        assert_eq!(root.to_string(), "/");
        assert_eq!("/".parse::<Name>().unwrap(), root);
    }
}
