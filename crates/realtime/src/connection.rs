//! Lifecycle of the single duplex connection to the job-progress endpoint.
//!
//! All transitions go through [`ConnectionState`], checked and updated under one
//! lock at the start of every operation. Each installed link (and each
//! connect/disconnect) bumps an epoch; background tasks carry the epoch they
//! were started for and quietly exit once it is superseded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use api::TokenProvider;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::backoff::ReconnectPolicy;
use crate::error::{ConnectionError, TransportError};
use crate::protocol::ClientCommand;
use crate::transport::{ProgressTransport, TransportLink};

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Observable status: the state plus the last authentication failure, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub last_error: Option<ConnectionError>,
}

/// Sending half of the currently installed link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    epoch: u64,
    commands: mpsc::UnboundedSender<ClientCommand>,
}

impl LinkHandle {
    /// Identifies the link; a reconnect always produces a new epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queues a command on this link. Returns false if the link already closed.
    pub fn send(&self, command: ClientCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

type ConnectedHook = Arc<dyn Fn(&LinkHandle) + Send + Sync>;
type FrameHook = Arc<dyn Fn(&str) + Send + Sync>;

enum OpenFailure {
    Auth(ConnectionError),
    Transport(TransportError),
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    last_error: Option<ConnectionError>,
    epoch: u64,
    link: Option<LinkHandle>,
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    attempts: u64,
}

struct Shared {
    transport: Arc<dyn ProgressTransport>,
    tokens: Arc<dyn TokenProvider>,
    policy: ReconnectPolicy,
    inner: Mutex<Inner>,
    status: watch::Sender<ConnectionStatus>,
    connected_hooks: Mutex<Vec<ConnectedHook>>,
    frame_hooks: Mutex<Vec<FrameHook>>,
}

//
// ─── MANAGER ───────────────────────────────────────────────────────────────────
//

/// Owns the one logical connection of a client session.
///
/// Cloning is cheap; all clones drive the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(
        transport: Arc<dyn ProgressTransport>,
        tokens: Arc<dyn TokenProvider>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            shared: Arc::new(Shared {
                transport,
                tokens,
                policy,
                inner: Mutex::new(Inner::default()),
                status,
                connected_hooks: Mutex::new(Vec::new()),
                frame_hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Number of times the transport was asked to open a connection.
    #[must_use]
    pub fn attempt_count(&self) -> u64 {
        self.shared.lock().attempts
    }

    /// The installed link, only while `Connected`.
    #[must_use]
    pub fn current_link(&self) -> Option<LinkHandle> {
        let inner = self.shared.lock();
        match inner.state {
            ConnectionState::Connected => inner.link.clone(),
            _ => None,
        }
    }

    /// Runs `hook` after every transition into `Connected`, with the new link.
    pub fn on_connected(&self, hook: impl Fn(&LinkHandle) + Send + Sync + 'static) {
        lock_hooks(&self.shared.connected_hooks).push(Arc::new(hook));
    }

    /// Runs `hook` for every inbound text frame, in arrival order.
    pub fn on_frame(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        lock_hooks(&self.shared.frame_hooks).push(Arc::new(hook));
    }

    /// Establish the connection.
    ///
    /// No-op unless the manager is `Disconnected`, so concurrent callers collapse
    /// into a single attempt. A missing or rejected credential leaves the manager
    /// `Disconnected` with `last_error` set; transient failures move it to
    /// `Reconnecting`. Dropping the future mid-attempt returns the manager to
    /// `Disconnected`.
    pub async fn connect(&self) {
        let epoch = {
            let mut inner = self.shared.lock();
            if inner.state != ConnectionState::Disconnected {
                tracing::debug!(state = ?inner.state, "connect ignored");
                return;
            }
            inner.epoch += 1;
            inner.state = ConnectionState::Connecting;
            inner.last_error = None;
            self.shared.publish(&inner);
            inner.epoch
        };

        let guard = AttemptGuard {
            shared: &self.shared,
            epoch,
            armed: true,
        };
        let opened = self.shared.open_link().await;
        guard.disarm();

        match opened {
            Ok(link) => Shared::install(&self.shared, epoch, link),
            Err(OpenFailure::Auth(err)) => self.shared.fail_auth(epoch, err),
            Err(OpenFailure::Transport(err)) => {
                tracing::warn!(%err, "initial connection failed");
                let mut inner = self.shared.lock();
                if inner.epoch == epoch && inner.state == ConnectionState::Connecting {
                    Shared::schedule_reconnect(&self.shared, &mut inner);
                }
            }
        }
    }

    /// Tear the connection down and cancel pending reconnects. Always safe.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        inner.epoch += 1;
        if let Some(task) = inner.reconnect.take() {
            task.abort();
        }
        if let Some(task) = inner.reader.take() {
            task.abort();
        }
        inner.link = None;
        if inner.state != ConnectionState::Disconnected {
            tracing::info!(from = ?inner.state, "progress connection closed");
        }
        inner.state = ConnectionState::Disconnected;
        self.shared.publish(&inner);
    }
}

/// Undoes `Connecting` when a `connect` future is dropped before the link opens.
struct AttemptGuard<'a> {
    shared: &'a Shared,
    epoch: u64,
    armed: bool,
}

impl AttemptGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.shared.lock();
        if inner.epoch != self.epoch || inner.state != ConnectionState::Connecting {
            return;
        }
        tracing::debug!("connect attempt cancelled");
        inner.epoch += 1;
        inner.state = ConnectionState::Disconnected;
        self.shared.publish(&inner);
    }
}

fn lock_hooks<T>(hooks: &Mutex<Vec<T>>) -> MutexGuard<'_, Vec<T>> {
    hooks.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.status.send_replace(ConnectionStatus {
            state: inner.state,
            last_error: inner.last_error.clone(),
        });
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    async fn open_link(&self) -> Result<TransportLink, OpenFailure> {
        let token = self
            .tokens
            .access_token()
            .ok_or(OpenFailure::Auth(ConnectionError::MissingCredential))?;
        self.lock().attempts += 1;
        match self.transport.open(&token).await {
            Ok(link) => Ok(link),
            Err(TransportError::Unauthorized(reason)) => {
                Err(OpenFailure::Auth(ConnectionError::Rejected(reason)))
            }
            Err(err) => Err(OpenFailure::Transport(err)),
        }
    }

    fn install(shared: &Arc<Self>, epoch: u64, link: TransportLink) {
        let handle = {
            let mut inner = shared.lock();
            let attempting = matches!(
                inner.state,
                ConnectionState::Connecting | ConnectionState::Reconnecting
            );
            if inner.epoch != epoch || !attempting {
                tracing::debug!("discarding link from a superseded attempt");
                return;
            }
            inner.epoch += 1;
            let handle = LinkHandle {
                epoch: inner.epoch,
                commands: link.outbound,
            };
            inner.state = ConnectionState::Connected;
            inner.last_error = None;
            inner.link = Some(handle.clone());
            // The reconnect task (if any) is the caller and about to return.
            inner.reconnect = None;
            inner.reader = Some(tokio::spawn(read_frames(
                Arc::clone(shared),
                inner.epoch,
                link.inbound,
            )));
            shared.publish(&inner);
            handle
        };

        tracing::info!(epoch = handle.epoch, "progress connection established");
        let hooks: Vec<ConnectedHook> = lock_hooks(&shared.connected_hooks).clone();
        for hook in hooks {
            hook(&handle);
        }
    }

    fn fail_auth(&self, epoch: u64, err: ConnectionError) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return;
        }
        tracing::warn!(%err, "progress connection not authenticated");
        inner.epoch += 1;
        inner.state = ConnectionState::Disconnected;
        inner.last_error = Some(err);
        inner.link = None;
        inner.reconnect = None;
        self.publish(&inner);
    }

    /// Enter `Reconnecting` and start the retry loop. Caller holds the lock.
    fn schedule_reconnect(shared: &Arc<Self>, inner: &mut Inner) {
        inner.epoch += 1;
        inner.state = ConnectionState::Reconnecting;
        inner.link = None;
        inner.reader = None;
        if let Some(previous) = inner.reconnect.take() {
            previous.abort();
        }
        inner.reconnect = Some(tokio::spawn(reconnect_loop(
            Arc::clone(shared),
            inner.epoch,
        )));
        shared.publish(inner);
    }

    fn link_lost(shared: &Arc<Self>, epoch: u64) {
        let mut inner = shared.lock();
        if inner.epoch != epoch || inner.state != ConnectionState::Connected {
            return;
        }
        tracing::warn!(epoch, "progress connection lost");
        Self::schedule_reconnect(shared, &mut inner);
    }
}

async fn read_frames(shared: Arc<Shared>, epoch: u64, mut inbound: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = inbound.recv().await {
        if !shared.is_current(epoch) {
            return;
        }
        let hooks: Vec<FrameHook> = lock_hooks(&shared.frame_hooks).clone();
        for hook in hooks {
            hook(&frame);
        }
    }
    Shared::link_lost(&shared, epoch);
}

async fn reconnect_loop(shared: Arc<Shared>, epoch: u64) {
    let mut attempt: u32 = 0;
    loop {
        let delay = shared.policy.delay_for(attempt);
        tracing::info!(attempt = attempt.saturating_add(1), ?delay, "reconnect scheduled");
        tokio::time::sleep(delay).await;
        if !shared.is_current(epoch) {
            return;
        }

        match shared.open_link().await {
            Ok(link) => {
                Shared::install(&shared, epoch, link);
                return;
            }
            Err(OpenFailure::Auth(err)) => {
                shared.fail_auth(epoch, err);
                return;
            }
            Err(OpenFailure::Transport(err)) => {
                tracing::warn!(%err, attempt = attempt.saturating_add(1), "reconnect attempt failed");
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
