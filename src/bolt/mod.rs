//! # Bolt Protocol
//!
//! Wire-level pieces of the Bolt protocol:
//!
//! - [`packstream`] - value serialization
//! - [`message`] - request/response messages
//! - [`handshake`] - version negotiation and per-version capabilities
//! - [`codec`] - chunked framing for tokio
//! - [`error`] - wire errors
//!
//! Nothing here knows about pools, routing or retries; see [`crate::driver`].

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;

pub use codec::BoltCodec;
pub use error::{BoltError, BoltResult};
pub use handshake::{AuthStyle, BoltVersion, PullStyle, RouteStyle, BOLT_MAGIC};
pub use message::{BoltRequest, BoltResponse, MessageKind};
pub use packstream::{BoltMap, PackStreamError, PackStreamStructure, PackStreamValue};
