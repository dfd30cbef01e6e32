// ABOUTME: Connection lifecycle for a single session at a time
// ABOUTME: connect/disconnect/wait with typed failures and an event pump task

use crate::audio::AudioBackend;
use crate::client::engine::PlayerCore;
use crate::client::event::{ClientEvent, ConnectionState};
use crate::error::ConnectionError;
use crate::protocol::{Connector, InboundEvent, OutboundCommand, Session};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// How long `disconnect()` waits to hand the goodbye to the protocol side.
const GOODBYE_GRACE: Duration = Duration::from_millis(500);

struct LiveSession {
    id: u64,
    commands: mpsc::Sender<OutboundCommand>,
    pump: JoinHandle<()>,
}

struct Shared<B> {
    core: Arc<PlayerCore<B>>,
    state: watch::Sender<ConnectionState>,
    live: Mutex<Option<LiveSession>>,
    /// Why the last session ended; `None` for an orderly close.
    outcome: Mutex<Option<ConnectionError>>,
    next_id: Mutex<u64>,
    /// Bumped each time a connect attempt takes the `Connecting` state.
    attempt: AtomicU64,
}

impl<B: AudioBackend> Shared<B> {
    fn set_state(&self, next: ConnectionState) {
        self.transition(|current| (current != next).then_some(next));
    }

    /// Apply `step` atomically against the current state and announce the
    /// new state if it changed.
    fn transition(&self, step: impl FnOnce(ConnectionState) -> Option<ConnectionState>) -> bool {
        let mut entered = None;
        self.state.send_if_modified(|current| match step(*current) {
            Some(next) => {
                *current = next;
                entered = Some(next);
                true
            }
            None => false,
        });
        let Some(next) = entered else {
            return false;
        };
        self.core
            .playback
            .set_enabled(next == ConnectionState::Connected);
        log::debug!("Connection state: {}", next);
        self.core.emit(ClientEvent::ConnectionStateChanged(next));
        true
    }

    /// Leave `Connecting` if `attempt` still owns it.
    fn abandon(&self, attempt: u64) -> bool {
        self.transition(|current| {
            let owned = self.attempt.load(Ordering::Acquire) == attempt;
            (owned && current == ConnectionState::Connecting).then_some(ConnectionState::Disconnected)
        })
    }

    /// Called by the pump when its session ends on its own.
    fn finish(&self, id: u64, outcome: Option<ConnectionError>) {
        let mut live = self.live.lock();
        if live.as_ref().map(|session| session.id) != Some(id) {
            return;
        }
        live.take();
        *self.outcome.lock() = outcome;
        self.core.end_session();
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Owns the connect/disconnect lifecycle. Never retries on its own.
pub(crate) struct ConnectionSupervisor<C, B> {
    connector: Arc<C>,
    shared: Arc<Shared<B>>,
    connect_timeout: Duration,
}

impl<C: Connector, B: AudioBackend> ConnectionSupervisor<C, B> {
    pub(crate) fn new(connector: C, core: Arc<PlayerCore<B>>, connect_timeout: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector: Arc::new(connector),
            shared: Arc::new(Shared {
                core,
                state,
                live: Mutex::new(None),
                outcome: Mutex::new(None),
                next_id: Mutex::new(0),
                attempt: AtomicU64::new(0),
            }),
            connect_timeout,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// One connection attempt.
    ///
    /// Dropping the future before it resolves returns the client to
    /// `Disconnected`.
    pub(crate) async fn connect(&self, url: &str) -> Result<(), ConnectionError> {
        let mut rejected = None;
        let mut attempt = 0;
        self.shared.state.send_if_modified(|current| match current {
            ConnectionState::Disconnected => {
                *current = ConnectionState::Connecting;
                attempt = self.shared.attempt.fetch_add(1, Ordering::AcqRel) + 1;
                true
            }
            ConnectionState::Connecting => {
                rejected = Some(ConnectionError::AlreadyConnecting);
                false
            }
            ConnectionState::Connected | ConnectionState::Disconnecting => {
                rejected = Some(ConnectionError::AlreadyConnected);
                false
            }
        });
        if let Some(error) = rejected {
            return Err(error);
        }
        self.shared
            .core
            .emit(ClientEvent::ConnectionStateChanged(ConnectionState::Connecting));
        *self.shared.outcome.lock() = None;
        log::info!("Connecting to {}", url);

        let request = self.shared.core.session_request(url);
        let mut pending = PendingAttempt {
            shared: &self.shared,
            attempt,
            settled: false,
        };
        let result = tokio::time::timeout(self.connect_timeout, self.connector.connect(&request)).await;
        pending.settled = true;
        let session = match result {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                log::warn!("Connection to {} failed: {}", url, e);
                self.shared.abandon(attempt);
                return Err(e);
            }
            Err(_) => {
                log::warn!("Connection to {} timed out", url);
                self.shared.abandon(attempt);
                return Err(ConnectionError::Timeout);
            }
        };

        let Session { events, commands } = session;
        let mut live = self.shared.live.lock();
        let current = self.shared.attempt.load(Ordering::Acquire) == attempt;
        if !current || self.state() != ConnectionState::Connecting {
            // disconnect() ran while the attempt was in flight.
            drop(live);
            let _ = commands.try_send(OutboundCommand::Goodbye);
            return Err(ConnectionError::Closed);
        }

        self.shared.core.begin_session();
        let id = {
            let mut next_id = self.shared.next_id.lock();
            *next_id += 1;
            *next_id
        };
        let pump = tokio::spawn(pump(Arc::clone(&self.shared), id, events));
        *live = Some(LiveSession { id, commands, pump });
        self.shared.set_state(ConnectionState::Connected);
        drop(live);

        log::info!("Connected to {}", url);
        Ok(())
    }

    /// Sender for the live session, if any.
    pub(crate) fn commands(&self) -> Option<mpsc::Sender<OutboundCommand>> {
        self.shared
            .live
            .lock()
            .as_ref()
            .map(|session| session.commands.clone())
    }

    /// End the session. Safe to call at any time, any number of times.
    pub(crate) async fn disconnect(&self) {
        let live = self.shared.live.lock().take();
        let Some(live) = live else {
            // Cancels an attempt still in flight.
            if self.state() == ConnectionState::Connecting {
                self.shared.set_state(ConnectionState::Disconnected);
            }
            return;
        };

        self.shared.set_state(ConnectionState::Disconnecting);
        let goodbye = live.commands.send(OutboundCommand::Goodbye);
        if tokio::time::timeout(GOODBYE_GRACE, goodbye).await.is_err() {
            log::debug!("Goodbye not accepted in time");
        }
        live.pump.abort();
        *self.shared.outcome.lock() = None;
        self.shared.core.end_session();
        self.shared.set_state(ConnectionState::Disconnected);
        log::info!("Disconnected");
    }

    /// Resolve once no session is active.
    ///
    /// `Ok` after an orderly close or an explicit disconnect, the transport
    /// error otherwise. Dropping the future has no effect on the session.
    pub(crate) async fn wait_for_disconnect(&self) -> Result<(), ConnectionError> {
        let mut state = self.shared.state.subscribe();
        if state
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await
            .is_err()
        {
            return Ok(());
        }
        match self.shared.outcome.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Rolls `Connecting` back if the attempt's future is dropped mid-flight.
struct PendingAttempt<'a, B: AudioBackend> {
    shared: &'a Shared<B>,
    attempt: u64,
    settled: bool,
}

impl<B: AudioBackend> Drop for PendingAttempt<'_, B> {
    fn drop(&mut self) {
        if !self.settled && self.shared.abandon(self.attempt) {
            log::debug!("Connection attempt cancelled by caller");
        }
    }
}

impl<C, B> Drop for ConnectionSupervisor<C, B> {
    fn drop(&mut self) {
        if let Some(live) = self.shared.live.lock().take() {
            live.pump.abort();
        }
    }
}

async fn pump<B: AudioBackend>(
    shared: Arc<Shared<B>>,
    id: u64,
    mut events: mpsc::Receiver<InboundEvent>,
) {
    let outcome = loop {
        match events.recv().await {
            Some(InboundEvent::Closed(outcome)) => break outcome,
            Some(event) => shared.core.handle(event),
            None => break None,
        }
    };
    match &outcome {
        Some(error) => log::warn!("Session lost: {}", error),
        None => log::info!("Session closed by server"),
    }
    shared.finish(id, outcome);
}
