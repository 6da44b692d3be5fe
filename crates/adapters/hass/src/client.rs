//! Websocket session with Home Assistant.
//!
//! One supervisor task per client owns the connection and the single retry
//! timer. Each session authenticates, seeds the [`EntityCache`] from
//! `get_states`, subscribes to `state_changed` and then routes every frame:
//! push events update the cache, anything else with an `id` resolves the
//! matching pending request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{Sink, SinkExt as _, Stream, StreamExt as _};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use zoneplan_app::ports::HubClient;
use zoneplan_domain::entity::EntityState;
use zoneplan_domain::error::HubError;

use crate::cache::EntityCache;
use crate::config::HassConfig;
use crate::error::HassError;
use crate::message::{Inbound, Outbound, STATE_CHANGED, StateChanged};

/// Why the client stopped trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    AuthenticationRejected,
    RetriesExhausted { attempts: u32 },
}

impl From<FatalReason> for HubError {
    fn from(reason: FatalReason) -> Self {
        match reason {
            FatalReason::AuthenticationRejected => Self::Authentication,
            FatalReason::RetriesExhausted { attempts } => Self::RetriesExhausted { attempts },
        }
    }
}

/// Lifecycle of the hub connection.
///
/// `Disconnected → Connecting → Connected`, `Retrying` between attempts,
/// and the terminal `Failed` and `Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    /// Authenticated, cache seeded and subscribed to state changes.
    Connected,
    Retrying { attempt: u32 },
    Failed(FatalReason),
    Destroyed,
}

impl ConnectionStatus {
    /// Whether the client is done connecting, one way or another.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Connected | Self::Failed(_) | Self::Destroyed)
    }
}

type Pending = HashMap<u64, oneshot::Sender<Result<Value, HubError>>>;

struct Session {
    sender: mpsc::UnboundedSender<Message>,
    authenticated: bool,
}

enum Signal {
    None,
    AuthRequired,
    Authenticated,
    AuthRejected,
}

enum SessionEnd {
    Closed,
    AuthRejected,
}

struct Inner {
    config: HassConfig,
    cache: EntityCache,
    pending: Mutex<Pending>,
    next_id: AtomicU64,
    session: Mutex<Option<Session>>,
    status: watch::Sender<ConnectionStatus>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

/// Handle to a Home Assistant websocket session.
///
/// Cheap to clone; every clone drives the same session. Call
/// [`HassClient::destroy`] to stop it.
#[derive(Clone)]
pub struct HassClient {
    inner: Arc<Inner>,
}

impl HassClient {
    /// Create an idle client. Nothing happens until [`HassClient::connect`].
    #[must_use]
    pub fn new(config: HassConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                cache: EntityCache::default(),
                pending: Mutex::new(Pending::new()),
                next_id: AtomicU64::new(1),
                session: Mutex::new(None),
                status,
                supervisor: Mutex::new(None),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// Start the connection supervisor. Does nothing while one is running or
    /// once the client is destroyed.
    pub fn connect(&self) {
        if self.inner.is_destroyed() {
            tracing::debug!("ignoring connect on destroyed hub client");
            return;
        }
        let mut supervisor = self.inner.lock_supervisor();
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        tracing::info!(url = %self.inner.config.url(), "connecting to hub");
        self.inner.set_status(ConnectionStatus::Connecting);
        *supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.inner))));
    }

    /// Wait until the session is usable or the client has given up.
    ///
    /// Waits forever on a client that was never connected.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Authentication`] or [`HubError::RetriesExhausted`]
    /// when the client failed, and [`HubError::Destroyed`] once destroyed.
    pub async fn ready(&self) -> Result<(), HubError> {
        let mut status = self.status();
        let settled = *status
            .wait_for(ConnectionStatus::is_settled)
            .await
            .map_err(|_| HubError::Destroyed)?;
        match settled {
            ConnectionStatus::Failed(reason) => Err(reason.into()),
            ConnectionStatus::Destroyed => Err(HubError::Destroyed),
            _ => Ok(()),
        }
    }

    /// Call `domain.service` and wait for the hub's acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotConnected`] without an authenticated session,
    /// [`HubError::RpcTimeout`] when no answer arrives in time,
    /// [`HubError::CallFailed`] when the hub reports failure and
    /// [`HubError::Destroyed`] when the client is torn down meanwhile.
    #[tracing::instrument(skip(self, data))]
    pub async fn call(&self, domain: &str, service: &str, data: Value) -> Result<Value, HubError> {
        let domain = domain.to_string();
        let service = service.to_string();
        self.inner
            .request(move |id| Outbound::CallService {
                id,
                domain,
                service,
                service_data: data,
            })
            .await
    }

    /// Cached state of `entity_id`.
    #[must_use]
    pub fn state(&self, entity_id: &str) -> Option<EntityState> {
        self.inner.cache.get(entity_id)
    }

    /// Receiver that always holds the current connection status.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Tear the client down: close the session, stop retrying, fail pending
    /// requests and clear the cache. Idempotent.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let session = inner.lock_session().take();
        let supervisor = inner.lock_supervisor().take();
        let closing = session.is_some_and(|s| s.sender.send(Message::Close(None)).is_ok());
        if let Some(handle) = supervisor
            && !closing
        {
            handle.abort();
        }

        inner.lock_pending().clear();
        inner.cache.clear();
        inner.status.send_replace(ConnectionStatus::Destroyed);
        tracing::info!("hub client destroyed");
    }
}

impl HubClient for HassClient {
    fn state(&self, entity_id: &str) -> Option<EntityState> {
        self.inner.cache.get(entity_id)
    }

    fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
    ) -> impl Future<Output = Result<Value, HubError>> + Send {
        self.call(domain, service, data)
    }
}

impl Inner {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_supervisor(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.supervisor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `status` unless the client is already destroyed.
    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if *current == ConnectionStatus::Destroyed || *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn open_session(&self, sender: mpsc::UnboundedSender<Message>) {
        *self.lock_session() = Some(Session {
            sender,
            authenticated: false,
        });
    }

    fn authenticate(&self) {
        if let Some(session) = self.lock_session().as_mut() {
            session.authenticated = true;
        }
    }

    /// Forget the session. Pending requests fail with `NotConnected`.
    fn close_session(&self) {
        self.lock_session().take();
        let dropped = std::mem::take(&mut *self.lock_pending());
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "dropping pending requests");
        }
    }

    /// Ask the session task to close the socket.
    fn request_close(&self) {
        if let Some(session) = self.lock_session().as_ref() {
            let _ = session.sender.send(Message::Close(None));
        }
    }

    fn authenticated_sender(&self) -> Option<mpsc::UnboundedSender<Message>> {
        self.lock_session()
            .as_ref()
            .filter(|session| session.authenticated)
            .map(|session| session.sender.clone())
    }

    /// Send a numbered request and wait for the answer carrying that number.
    async fn request(&self, build: impl FnOnce(u64) -> Outbound) -> Result<Value, HubError> {
        if self.is_destroyed() {
            return Err(HubError::Destroyed);
        }
        let sender = self.authenticated_sender().ok_or(HubError::NotConnected)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = build(id)
            .to_json()
            .map_err(|err| HassError::from(err).into_domain())?;
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id, tx);
        if sender.send(Message::Text(text)).is_err() {
            self.lock_pending().remove(&id);
            return Err(HubError::NotConnected);
        }

        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) if self.is_destroyed() => Err(HubError::Destroyed),
            Ok(Err(_)) => Err(HubError::NotConnected),
            Err(_) => {
                self.lock_pending().remove(&id);
                tracing::warn!(id, ?timeout, "no response from hub");
                Err(HubError::RpcTimeout { id, timeout })
            }
        }
    }

    fn handle_text(&self, text: &str) -> Result<Signal, HassError> {
        let msg: Inbound = serde_json::from_str(text)?;
        match msg.kind.as_str() {
            Inbound::AUTH_REQUIRED => return Ok(Signal::AuthRequired),
            Inbound::AUTH_OK => return Ok(Signal::Authenticated),
            Inbound::AUTH_INVALID => return Ok(Signal::AuthRejected),
            Inbound::EVENT => self.route_event(msg),
            _ => self.resolve(msg),
        }
        Ok(Signal::None)
    }

    fn route_event(&self, msg: Inbound) {
        let Some(event) = msg.event else {
            return;
        };
        if event.event_type != STATE_CHANGED {
            return;
        }
        match serde_json::from_value::<StateChanged>(event.data) {
            Ok(change) => self.cache.apply(change),
            Err(err) => tracing::warn!(error = %err, "malformed state_changed event"),
        }
    }

    fn resolve(&self, msg: Inbound) {
        let Some(id) = msg.id else {
            return;
        };
        let Some(waiter) = self.lock_pending().remove(&id) else {
            tracing::debug!(id, "response to unknown request");
            return;
        };
        let result = if msg.success == Some(false) {
            Err(HubError::CallFailed {
                id,
                message: msg.failure_message(),
            })
        } else {
            Ok(msg.result.unwrap_or(Value::Null))
        };
        let _ = waiter.send(result);
    }

    /// Seed the cache and subscribe to changes. Returns the entity count.
    async fn seed(&self) -> Result<usize, HubError> {
        let states = self.request(|id| Outbound::GetStates { id }).await?;
        let states: Vec<EntityState> =
            serde_json::from_value(states).map_err(|err| HassError::from(err).into_domain())?;
        let count = states.len();
        self.cache.replace_all(states);

        self.request(|id| Outbound::SubscribeEvents {
            id,
            event_type: STATE_CHANGED.to_string(),
        })
        .await?;
        Ok(count)
    }
}

async fn supervise(inner: Arc<Inner>) {
    let mut attempt: u32 = 0;
    loop {
        if inner.is_destroyed() {
            return;
        }
        inner.set_status(ConnectionStatus::Connecting);

        match run_session(&inner, &mut attempt).await {
            Ok(SessionEnd::AuthRejected) => {
                tracing::error!("hub rejected the access token");
                inner.set_status(ConnectionStatus::Failed(FatalReason::AuthenticationRejected));
                return;
            }
            Ok(SessionEnd::Closed) => tracing::warn!("hub connection closed"),
            Err(err) => tracing::warn!(error = %err, "hub connection failed"),
        }
        if inner.is_destroyed() {
            return;
        }

        attempt = attempt.saturating_add(1);
        if let Some(limit) = inner.config.retry_count
            && attempt > limit
        {
            tracing::error!(attempts = limit, "giving up on hub connection");
            inner.set_status(ConnectionStatus::Failed(FatalReason::RetriesExhausted {
                attempts: limit,
            }));
            return;
        }

        let delay = inner.config.retry_timeout();
        tracing::info!(attempt, ?delay, "reconnecting to hub");
        inner.set_status(ConnectionStatus::Retrying { attempt });
        tokio::time::sleep(delay).await;
    }
}

/// One websocket session, from connect to close. An open socket refills the
/// retry budget.
async fn run_session(inner: &Arc<Inner>, attempt: &mut u32) -> Result<SessionEnd, HassError> {
    let url = inner.config.url();
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    tracing::debug!(%url, "hub websocket open");
    *attempt = 0;

    let (tx, rx) = mpsc::unbounded_channel();
    inner.open_session(tx);
    let mut bootstrap = None;
    let end = pump(inner, stream, rx, &mut bootstrap).await;
    if let Some(handle) = bootstrap {
        handle.abort();
    }
    inner.close_session();
    end
}

async fn pump<S>(
    inner: &Arc<Inner>,
    stream: S,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    bootstrap: &mut Option<JoinHandle<()>>,
) -> Result<SessionEnd, HassError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            outgoing = outbound.recv() => {
                let Some(message) = outgoing else {
                    return Ok(SessionEnd::Closed);
                };
                let closing = matches!(message, Message::Close(_));
                sink.send(message).await?;
                if closing {
                    return Ok(SessionEnd::Closed);
                }
            }
            incoming = source.next() => {
                let message = match incoming {
                    Some(message) => message?,
                    None => return Err(HassError::Closed),
                };
                match message {
                    Message::Text(text) => match inner.handle_text(&text) {
                        Ok(Signal::AuthRequired) => {
                            let auth = Outbound::Auth {
                                access_token: inner.config.token.clone(),
                            };
                            sink.send(Message::Text(auth.to_json()?)).await?;
                        }
                        Ok(Signal::Authenticated) => {
                            tracing::info!("authenticated with hub");
                            inner.authenticate();
                            *bootstrap = Some(tokio::spawn(bootstrap_session(Arc::clone(inner))));
                        }
                        Ok(Signal::AuthRejected) => {
                            let _ = sink.send(Message::Close(None)).await;
                            return Ok(SessionEnd::AuthRejected);
                        }
                        Ok(Signal::None) => {}
                        Err(err) => tracing::warn!(error = %err, "ignoring malformed hub message"),
                    },
                    Message::Close(frame) => {
                        tracing::debug!(?frame, "hub sent close frame");
                        return Ok(SessionEnd::Closed);
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn bootstrap_session(inner: Arc<Inner>) {
    match inner.seed().await {
        Ok(entities) => {
            tracing::info!(entities, "hub session ready");
            inner.set_status(ConnectionStatus::Connected);
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to initialise hub session");
            inner.request_close();
        }
    }
}
