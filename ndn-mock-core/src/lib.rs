//! Packet-level building blocks for the in-memory NDN forwarder: TLV codec,
//! names, Interest/Data, NFD control structures and an in-memory key chain.

pub mod control;
pub mod keychain;
pub mod name;
pub mod packets;
pub mod tlv;

pub use control::{ControlParameters, ControlResponse, ForwardingFlags};
pub use keychain::{DigestSigner, KeyChain, SignatureError, SignatureType, Signer};
pub use name::{ComponentType, Name, NameComponent, NameParseError};
pub use packets::{
    tlv_types, ContentType, Data, Interest, KeyLocator, MetaInfo, Packet, PacketType,
    SignatureInfo,
};
pub use tlv::{TlvElement, TlvError};
