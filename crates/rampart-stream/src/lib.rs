//! Rampart Streaming Connection Guardian
//!
//! Keeps one push subscription alive across network interruptions:
//! - heartbeat staleness detection (no event within the window)
//! - bounded, order-preserving buffering while not connected
//! - reconnection with the shared backoff curve, bounded by an attempt budget
//! - in-order replay of buffered messages on reopen
//!
//! The transport is a collaborator behind the [`Transport`] trait.

#![warn(unreachable_pub)]

pub mod buffer;
pub mod error;
pub mod guardian;
pub mod session;
pub mod transport;

pub use buffer::EventBuffer;
pub use error::{GuardianError, TransportError};
pub use guardian::{GuardianOptions, StreamGuardian};
pub use session::{ConnectionSession, ConnectionState, GuardianStats, SessionId};
pub use transport::{EventSink, Transport, TransportEvent};
