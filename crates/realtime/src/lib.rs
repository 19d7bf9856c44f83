#![forbid(unsafe_code)]

pub mod backoff;
pub mod client;
pub mod connection;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod router;
pub mod subscriptions;
pub mod transport;
pub mod ws;

pub use backoff::ReconnectPolicy;
pub use client::{JobWatch, RealtimeClient, RealtimeConfig};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus, LinkHandle};
pub use error::{ConnectionError, DecodeError, TransportError};
pub use memory::InMemoryTransport;
pub use protocol::{ClientCommand, ServerEvent};
pub use router::{ListenerId, ProgressEventRouter};
pub use subscriptions::SubscriptionMultiplexer;
pub use transport::{ProgressTransport, TransportLink};
pub use ws::WsTransport;
