//! Driver/Session/Transaction/Result — the async client stack in front of
//! the synchronous `Graph`. Every call that touches the store crosses into
//! a blocking task; nothing here holds the store lock across an `.await`.

pub mod result;
pub mod retry;
pub mod session;
pub mod transaction;
pub mod uri;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::driver::session::{Bookmark, Session, SessionInner};
use crate::driver::uri::ConnectionUri;
use crate::{Graph, Result};

/// Username/password credentials. `none()` mirrors the driver's anonymous
/// auth token for an embedded store that doesn't check credentials.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub scheme: &'static str,
    pub principal: String,
    pub credentials: String,
}

impl AuthToken {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { scheme: "basic", principal: username.into(), credentials: password.into() }
    }

    pub fn none() -> Self {
        Self { scheme: "none", principal: String::new(), credentials: String::new() }
    }
}

/// Driver-wide tunables. Every field is a non-negative numeric budget the
/// Session/retry layer consults; there is no pool to size against an
/// embedded `Graph`, but the field is kept so callers configuring against a
/// real deployment and this embedded one share one `Config` shape.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_transaction_retry_time: Duration,
    pub connection_timeout: Duration,
    pub max_connection_pool_size: u32,
    pub connection_acquisition_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_transaction_retry_time: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(5),
            max_connection_pool_size: 100,
            connection_acquisition_timeout: Duration::from_secs(60),
        }
    }
}

type CloseObserver = Box<dyn Fn() + Send + Sync>;

/// Unsubscribe handle returned by [`Driver::on_session_close`]. Dropping it
/// does nothing; call [`Unsubscribe::call`] (or just invoke it) to remove
/// the registration.
pub struct Unsubscribe {
    id: u64,
    observers: Arc<Mutex<Vec<(u64, CloseObserver)>>>,
}

impl Unsubscribe {
    pub fn call(self) {
        self.observers.lock().retain(|(id, _)| *id != self.id);
    }
}

/// Owns the embedded `Graph` every `Session` this driver opens shares.
///
/// Sessions borrow the driver's `Arc<Graph>` rather than owning storage
/// themselves, so closing the driver while sessions are alive is a logic
/// error the caller is expected to avoid — the same ownership tree a real
/// Bolt driver enforces between `Driver` and its `Session`s. Sessions
/// register themselves in `active_sessions` at construction and deregister
/// through the close-callback handed to them, rather than holding a
/// back-pointer to the `Driver` — this keeps `Driver → Session →
/// Transaction` a tree, never a cycle.
pub struct Driver {
    graph: Arc<Graph>,
    uri: ConnectionUri,
    config: Config,
    #[allow(dead_code)]
    auth: AuthToken,
    closed: Mutex<bool>,
    active_sessions: Arc<Mutex<Vec<Arc<SessionInner>>>>,
    close_observers: Arc<Mutex<Vec<(u64, CloseObserver)>>>,
    observer_seq: AtomicU64,
}

impl Driver {
    /// Opens (or creates) the embedded store named by the URI's host as a
    /// file path, ignoring the routing/TLS fields a real Bolt endpoint
    /// would need — this driver talks directly to a local `Graph`.
    pub fn new(uri: &str, auth: AuthToken) -> Result<Self> {
        Self::with_config(uri, auth, Config::default())
    }

    pub fn with_config(uri: &str, auth: AuthToken, config: Config) -> Result<Self> {
        let parsed = ConnectionUri::parse(uri)?;
        let graph = if parsed.host.is_empty() || parsed.host == "localhost" {
            Graph::open_memory()?
        } else {
            Graph::open(&parsed.host)?
        };
        Ok(Self::assemble(Arc::new(graph), parsed, auth, config))
    }

    pub fn for_graph(graph: Graph, uri: &str, auth: AuthToken) -> Result<Self> {
        let parsed = ConnectionUri::parse(uri)?;
        Ok(Self::assemble(Arc::new(graph), parsed, auth, Config::default()))
    }

    fn assemble(graph: Arc<Graph>, uri: ConnectionUri, auth: AuthToken, config: Config) -> Self {
        Self {
            graph,
            uri,
            config,
            auth,
            closed: Mutex::new(false),
            active_sessions: Arc::new(Mutex::new(Vec::new())),
            close_observers: Arc::new(Mutex::new(Vec::new())),
            observer_seq: AtomicU64::new(1),
        }
    }

    pub fn uri(&self) -> &ConnectionUri {
        &self.uri
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers an observer fired (best-effort, errors swallowed) every
    /// time a session this driver opened closes. Returns a handle that
    /// removes exactly this registration when called.
    pub fn on_session_close<F>(&self, observer: F) -> Unsubscribe
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.observer_seq.fetch_add(1, Ordering::SeqCst);
        self.close_observers.lock().push((id, Box::new(observer)));
        Unsubscribe { id, observers: self.close_observers.clone() }
    }

    pub fn session(&self) -> Session {
        self.session_with_bookmarks(Vec::new())
    }

    /// Builds a session, registers it in `active_sessions`, and hands it a
    /// close-callback that deregisters it and fans out to `onSessionClose`
    /// observers — the session holds no back-pointer to this `Driver`.
    pub fn session_with_bookmarks(&self, bookmarks: Vec<Bookmark>) -> Session {
        let session = Session::with_retry_budget(self.graph.clone(), bookmarks, self.config.max_transaction_retry_time);
        let inner = session.inner();
        self.active_sessions.lock().push(inner.clone());

        let registry = self.active_sessions.clone();
        let observers = self.close_observers.clone();
        let weak_inner = Arc::downgrade(&inner);
        session.with_close_observer(Arc::new(move || {
            if let Some(inner) = weak_inner.upgrade() {
                registry.lock().retain(|s| !Arc::ptr_eq(s, &inner));
            }
            for (_, observer) in observers.lock().iter() {
                observer();
            }
        }))
    }

    /// Idempotent: draining an already-closed driver is a no-op. Rolls back
    /// every still-open transaction on every session this driver tracks
    /// (errors swallowed), then clears both the session and observer lists.
    pub fn close(&self) {
        let mut closed = self.closed.lock();
        if *closed {
            return;
        }
        *closed = true;
        let sessions: Vec<Arc<SessionInner>> = std::mem::take(&mut *self.active_sessions.lock());
        for session in &sessions {
            session.force_close();
        }
        self.close_observers.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Verifies the embedded store is reachable — a real driver would ping
    /// the server; here it confirms the schema is at its expected version.
    pub async fn verify_connectivity(&self) -> Result<()> {
        if self.is_closed() {
            return Err(crate::Error::TxError("driver is closed".into()));
        }
        let graph = self.graph.clone();
        tokio::task::spawn_blocking(move || graph.schema().validate_schema().map(|_| ()))
            .await
            .map_err(|e| crate::Error::ExecutionError(format!("blocking task panicked: {e}")))?
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }
}
