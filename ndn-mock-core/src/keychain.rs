use crate::name::{Name, NameComponent};
use crate::packets::{tlv_types, Data, KeyLocator, SignatureInfo};
use crate::tlv::{duration_to_millis, encode_non_negative_integer, TlvElement, TlvError};
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use ed25519_dalek::{Signer as _, Verifier as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// SignatureType codes assigned by the NDN packet format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignatureType {
    /// Integrity only
    DigestSha256 = 0,
    Sha256WithRsa = 1,
    Sha256WithEcdsa = 3,
    HmacWithSha256 = 4,
    /// Used by every key chain in this crate
    Ed25519 = 5,
}

impl SignatureType {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(SignatureType::DigestSha256),
            1 => Some(SignatureType::Sha256WithRsa),
            3 => Some(SignatureType::Sha256WithEcdsa),
            4 => Some(SignatureType::HmacWithSha256),
            5 => Some(SignatureType::Ed25519),
            _ => None,
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self {
            SignatureType::DigestSha256 => "SHA256",
            SignatureType::Sha256WithRsa => "SHA256withRSA",
            SignatureType::Sha256WithEcdsa => "SHA256withECDSA",
            SignatureType::HmacWithSha256 => "HMAC-SHA256",
            SignatureType::Ed25519 => "Ed25519",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Data carries no SignatureInfo or SignatureValue")]
    IncompleteSignature,
    #[error("Unsupported signature type: {0}")]
    UnsupportedSignatureType(u64),
    #[error("Bad key material: {0}")]
    KeyError(String),
    #[error("Signed portion could not be encoded: {0}")]
    TlvError(#[from] TlvError),
}

/// Anything that can put a signature on a Data packet or a command name
pub trait Signer: Send + Sync {
    fn signature_type(&self) -> SignatureType;

    fn key_locator(&self) -> Option<KeyLocator>;

    /// Raw signature over `bytes`
    fn sign_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, SignatureError>;

    fn signature_info(&self) -> SignatureInfo {
        let info = SignatureInfo::new(self.signature_type() as u64);
        match self.key_locator() {
            Some(locator) => info.with_key_locator(locator),
            None => info,
        }
    }

    /// Replace the SignatureInfo and SignatureValue of `data`. On failure
    /// `data` is left as it was.
    fn sign(&self, data: &mut Data) -> Result<(), SignatureError> {
        let previous_info = data.signature_info.replace(self.signature_info());
        let previous_value = data.signature_value.take();
        let signed = data
            .signed_portion()
            .map_err(SignatureError::from)
            .and_then(|portion| self.sign_bytes(&portion));
        match signed {
            Ok(value) => {
                data.signature_value = Some(value);
                Ok(())
            }
            Err(e) => {
                data.signature_info = previous_info;
                data.signature_value = previous_value;
                Err(e)
            }
        }
    }

    /// Append timestamp, nonce, SignatureInfo and SignatureValue components,
    /// producing a signed command name
    fn sign_command(&self, name: &Name) -> Result<Name, SignatureError> {
        let timestamp = duration_to_millis(
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default(),
        );

        let mut signed = name.clone();
        signed.push(NameComponent::new(encode_non_negative_integer(timestamp)));
        signed.push(NameComponent::new(rand::random::<u64>().to_be_bytes().to_vec()));
        signed.push(NameComponent::new(self.signature_info().to_tlv()?.encode()?));

        let signed_portion = signed.to_tlv()?.value;
        let value = self.sign_bytes(&signed_portion)?;
        signed.push(NameComponent::new(
            TlvElement::new(tlv_types::SIGNATURE_VALUE, value).encode()?,
        ));
        Ok(signed)
    }
}

/// SHA256 digest "signatures" with no key
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestSigner;

impl DigestSigner {
    pub fn verify(&self, data: &Data) -> Result<bool, SignatureError> {
        let value = signature_value_for(data, SignatureType::DigestSha256)?;
        Ok(Sha256::digest(data.signed_portion()?).as_slice() == value)
    }
}

impl Signer for DigestSigner {
    fn signature_type(&self) -> SignatureType {
        SignatureType::DigestSha256
    }

    fn key_locator(&self) -> Option<KeyLocator> {
        None
    }

    fn sign_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, SignatureError> {
        Ok(Sha256::digest(bytes).to_vec())
    }
}

/// In-memory key chain holding a single Ed25519 identity.
///
/// Keys are generated on `configure` and never leave the process; the
/// certificate is named `<identity>/KEY/<key-id>/self/<version>`.
pub struct KeyChain {
    identity: Name,
    key_name: Name,
    certificate_name: Name,
    signing_key: SigningKey,
}

impl KeyChain {
    /// Create a key chain whose default identity is `identity`
    pub fn configure(identity: &Name) -> Self {
        let seed: [u8; 32] = rand::random();
        let signing_key = SigningKey::from_bytes(&seed);

        let key_id = Sha256::digest(signing_key.verifying_key().as_bytes());
        let key_name = identity
            .clone()
            .with_component("KEY")
            .with_component(key_id[..8].to_vec());

        let version = duration_to_millis(
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default(),
        );
        let certificate_name = key_name
            .clone()
            .with_component("self")
            .with_component(encode_non_negative_integer(version));

        log::debug!("Configured key chain identity {} with key {}", identity, key_name);

        Self {
            identity: identity.clone(),
            key_name,
            certificate_name,
            signing_key,
        }
    }

    pub fn identity(&self) -> &Name {
        &self.identity
    }

    pub fn key_name(&self) -> &Name {
        &self.key_name
    }

    pub fn default_certificate_name(&self) -> &Name {
        &self.certificate_name
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Verify an Ed25519 signature produced by this key chain
    pub fn verify(&self, data: &Data) -> Result<bool, SignatureError> {
        let value = signature_value_for(data, SignatureType::Ed25519)?;
        let signature = Signature::from_slice(value)
            .map_err(|e| SignatureError::KeyError(e.to_string()))?;
        Ok(self
            .public_key()
            .verify(&data.signed_portion()?, &signature)
            .is_ok())
    }
}

impl Signer for KeyChain {
    fn signature_type(&self) -> SignatureType {
        SignatureType::Ed25519
    }

    fn key_locator(&self) -> Option<KeyLocator> {
        Some(KeyLocator::Name(self.key_name.clone()))
    }

    fn sign_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, SignatureError> {
        Ok(self.signing_key.sign(bytes).to_bytes().to_vec())
    }
}

impl std::fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyChain")
            .field("identity", &self.identity)
            .field("certificate_name", &self.certificate_name)
            .finish_non_exhaustive()
    }
}

fn signature_value_for(data: &Data, expected: SignatureType) -> Result<&[u8], SignatureError> {
    let info = data
        .signature_info
        .as_ref()
        .ok_or(SignatureError::IncompleteSignature)?;
    if info.signature_type != expected as u64 {
        return Err(SignatureError::UnsupportedSignatureType(info.signature_type));
    }
    data.signature_value
        .as_deref()
        .ok_or(SignatureError::IncompleteSignature)
}
