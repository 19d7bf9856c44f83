use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::ClientCommand;

/// Both directions of one open connection.
///
/// Dropping `outbound` asks the transport to close the connection; the transport
/// drops its end of `inbound` when the connection ends for any reason.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<ClientCommand>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens authenticated duplex connections to the job-progress endpoint.
#[async_trait]
pub trait ProgressTransport: Send + Sync {
    /// Open one connection authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Unauthorized` when the credential is refused and
    /// `TransportError::Network` for everything that may succeed on retry.
    async fn open(&self, token: &str) -> Result<TransportLink, TransportError>;
}
