use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::{ClientCommand, ServerEvent};
use crate::transport::{ProgressTransport, TransportLink};

struct LinkEnds {
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    frames: Option<mpsc::UnboundedSender<String>>,
    sent: Vec<ClientCommand>,
}

impl LinkEnds {
    fn drain(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.sent.push(command);
        }
    }
}

#[derive(Default)]
struct TransportState {
    scripted_failures: VecDeque<TransportError>,
    tokens: Vec<String>,
    links: Vec<LinkEnds>,
}

/// Scriptable in-process transport for tests and prototyping.
///
/// Every successful `open` creates a numbered link; tests push frames into it,
/// inspect the commands the client sent over it, or sever it to simulate a drop.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<TransportState>>,
}

impl InMemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The next `open` fails with `err`. Failures queue up in call order.
    pub fn fail_next_open(&self, err: TransportError) {
        self.lock().scripted_failures.push_back(err);
    }

    /// Number of `open` calls, successful or not.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.lock().tokens.len()
    }

    #[must_use]
    pub fn tokens_seen(&self) -> Vec<String> {
        self.lock().tokens.clone()
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.lock().links.len()
    }

    /// Commands sent over link `index` so far.
    #[must_use]
    pub fn sent_commands(&self, index: usize) -> Vec<ClientCommand> {
        let mut state = self.lock();
        state.links.get_mut(index).map_or_else(Vec::new, |link| {
            link.drain();
            link.sent.clone()
        })
    }

    /// Commands sent over every link, oldest link first.
    #[must_use]
    pub fn all_sent_commands(&self) -> Vec<ClientCommand> {
        let mut state = self.lock();
        state
            .links
            .iter_mut()
            .flat_map(|link| {
                link.drain();
                link.sent.clone()
            })
            .collect()
    }

    /// Delivers a raw text frame on link `index`. Returns false if the link is gone.
    pub fn push_frame(&self, index: usize, frame: impl Into<String>) -> bool {
        let state = self.lock();
        state
            .links
            .get(index)
            .and_then(|link| link.frames.as_ref())
            .is_some_and(|frames| frames.send(frame.into()).is_ok())
    }

    pub fn push_event(&self, index: usize, event: &ServerEvent) -> bool {
        self.push_frame(index, event.to_frame())
    }

    /// Drops the server side of link `index`, as a network failure would.
    pub fn sever(&self, index: usize) {
        if let Some(link) = self.lock().links.get_mut(index) {
            link.frames = None;
        }
    }
}

#[async_trait]
impl ProgressTransport for InMemoryTransport {
    async fn open(&self, token: &str) -> Result<TransportLink, TransportError> {
        // Real transports suspend here; give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;

        let mut state = self.lock();
        state.tokens.push(token.to_owned());
        if let Some(err) = state.scripted_failures.pop_front() {
            return Err(err);
        }

        let (outbound, commands) = mpsc::unbounded_channel();
        let (frames, inbound) = mpsc::unbounded_channel();
        state.links.push(LinkEnds {
            commands,
            frames: Some(frames),
            sent: Vec::new(),
        });
        Ok(TransportLink { outbound, inbound })
    }
}
