//! In-memory NDN forwarding plane for testing NDN applications.
//!
//! [`MockForwarder`] routes packets between any number of [`Face`]s through
//! a FIB and a PIT, and answers NFD prefix registration commands.
//! [`MockFace`] is a standalone face for tests with a single party.

pub mod config;
pub mod face;
pub mod fib;
pub mod forwarder;
pub mod handler;
pub mod mock_face;
pub mod pit;
pub mod registration;
pub mod stats;
pub mod transport;

pub use config::{ConfigError, ForwarderConfig};
pub use face::{Face, FaceError, MeasurableFace, OnInterestReceived};
pub use fib::{Fib, FibDestination, FibEntry, LocalHandler};
pub use forwarder::MockForwarder;
pub use handler::{BufferHandler, ForwardingTables};
pub use mock_face::{InterestHandler, MockFace, MockFaceOptions};
pub use pit::{Pit, PitEntry};
pub use registration::PrefixRegistration;
pub use stats::{ForwardingStats, StatsSnapshot};
pub use transport::{MockTransport, OnSendBlock, TransportError};
