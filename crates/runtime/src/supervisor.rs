//! Session lifecycle: credential check, artifact location, bounded connect
//! retry and degradation.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::{ConnectionManager, ConnectionStatus, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::error::{InitError, QueryError};
use crate::model::ModelGateway;
use crate::orchestrator::QueryOrchestrator;
use crate::rebuild::RebuildHook;
use crate::report::{InitReport, QueryReply, StatusReport};
use crate::transport::Launcher;

pub const DEFAULT_CONNECT_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Identifies one established session in logs and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A model API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// `None` for an empty or blank key.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Everything the supervisor needs, already resolved by the caller.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub artifact: PathBuf,
    pub credential: Option<Credential>,
    /// Connect attempts after the first.
    pub connect_retries: u32,
    pub retry_delay: Duration,
    pub handshake_timeout: Duration,
}

impl SupervisorConfig {
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            credential: None,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }
}

/// Builds a model gateway for a credential.
pub trait GatewayFactory: Send + Sync {
    type Gateway: ModelGateway;

    fn build(&self, credential: &Credential) -> Self::Gateway;
}

impl<F, G> GatewayFactory for F
where
    F: Fn(Credential) -> G + Send + Sync,
    G: ModelGateway,
{
    type Gateway = G;

    fn build(&self, credential: &Credential) -> G {
        self(credential.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoSession,
    Establishing,
    Live,
    Degraded,
}

struct Inner<F: GatewayFactory, L: Launcher> {
    state: SessionState,
    connection: ConnectionManager<L>,
    gateway: Option<F::Gateway>,
    session_id: Option<SessionId>,
}

impl<F: GatewayFactory, L: Launcher> Inner<F, L> {
    fn is_live(&self) -> bool {
        self.state == SessionState::Live && self.connection.status() == ConnectionStatus::Ready
    }
}

/// Owns the one session of the process.
///
/// Queries share the session lock; establishing, degrading and resetting
/// take it exclusively. Status reads never wait on the lock.
pub struct SessionSupervisor<F: GatewayFactory, L: Launcher> {
    config: SupervisorConfig,
    factory: F,
    rebuild: Option<Arc<dyn RebuildHook>>,
    inner: RwLock<Inner<F, L>>,
    status: watch::Sender<StatusReport>,
}

impl<F: GatewayFactory, L: Launcher> SessionSupervisor<F, L> {
    pub fn new(config: SupervisorConfig, factory: F, launcher: L) -> Self {
        let connection =
            ConnectionManager::new(launcher).with_handshake_timeout(config.handshake_timeout);
        Self {
            config,
            factory,
            rebuild: None,
            inner: RwLock::new(Inner {
                state: SessionState::NoSession,
                connection,
                gateway: None,
                session_id: None,
            }),
            status: watch::Sender::new(StatusReport::default()),
        }
    }

    /// Consulted when the artifact is missing, before giving up.
    pub fn with_rebuild_hook(mut self, hook: impl RebuildHook + 'static) -> Self {
        self.rebuild = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn gateway_factory(&self) -> &F {
        &self.factory
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    /// Bring the session to LIVE. A no-op when already live.
    pub async fn ensure_ready(&self) -> Result<(), InitError> {
        if self.inner.read().await.is_live() {
            return Ok(());
        }

        let mut inner = self.inner.write().await;
        // Another caller may have finished establishing while we waited.
        if inner.is_live() {
            return Ok(());
        }
        self.establish(&mut inner).await
    }

    /// [`ensure_ready`](Self::ensure_ready) as a boundary report.
    pub async fn init_report(&self) -> InitReport {
        match self.ensure_ready().await {
            Ok(()) => InitReport::ready(self.status().tools),
            Err(e) => InitReport::failed(e.to_string()),
        }
    }

    /// Answer one query, establishing the session first if needed.
    pub async fn run(&self, query: &str) -> Result<String, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        self.ensure_ready().await?;

        let outcome = {
            let inner = self.inner.read().await;
            match &inner.gateway {
                Some(gateway) if inner.state == SessionState::Live => {
                    QueryOrchestrator::new(&inner.connection, gateway)
                        .run(query)
                        .await
                }
                _ => Err(QueryError::SessionNotReady),
            }
        };

        if let Err(e) = &outcome {
            if e.is_stale_session() {
                self.degrade(&e.to_string()).await;
            }
        }
        outcome
    }

    /// [`run`](Self::run) as a boundary reply.
    pub async fn query(&self, query: &str) -> QueryReply {
        match self.run(query).await {
            Ok(result) => QueryReply::Result { result },
            Err(e) => {
                warn!(kind = ?e.kind(), error = %e, "query failed");
                QueryReply::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Mark a live session untrustworthy so the next use reconnects.
    pub async fn degrade(&self, reason: &str) {
        let mut inner = self.inner.write().await;
        if inner.state != SessionState::Live {
            debug!(state = ?inner.state, reason, "degrade ignored");
            return;
        }

        warn!(session = ?inner.session_id, reason, "degrading session");
        inner.connection.teardown().await;
        inner.gateway = None;
        inner.session_id = None;
        inner.state = SessionState::Degraded;
        self.publish(&inner, Some(reason.to_string()));
    }

    /// Drop the session entirely.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.connection.teardown().await;
        inner.gateway = None;
        inner.session_id = None;
        inner.state = SessionState::NoSession;
        self.publish(&inner, None);
        info!("session reset");
    }

    pub fn status(&self) -> StatusReport {
        self.status.borrow().clone()
    }

    async fn establish(&self, inner: &mut Inner<F, L>) -> Result<(), InitError> {
        inner.state = SessionState::Establishing;
        inner.connection.teardown().await;
        inner.gateway = None;
        inner.session_id = None;

        match self.try_establish(&mut inner.connection).await {
            Ok(gateway) => {
                let id = SessionId::new();
                info!(session = %id, tools = inner.connection.catalogue().len(), "session live");
                inner.gateway = Some(gateway);
                inner.session_id = Some(id);
                inner.state = SessionState::Live;
                self.publish(inner, None);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "session establishment failed");
                inner.state = SessionState::NoSession;
                self.publish(inner, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn try_establish(
        &self,
        connection: &mut ConnectionManager<L>,
    ) -> Result<F::Gateway, InitError> {
        let credential = self
            .config
            .credential
            .as_ref()
            .ok_or(InitError::MissingCredential)?;

        let gateway = self.factory.build(credential);
        let models = gateway
            .list_models()
            .await
            .map_err(InitError::InvalidCredential)?;
        debug!(models = models.len(), "credential accepted");

        self.locate_artifact().await?;
        self.connect_with_retry(connection).await?;
        Ok(gateway)
    }

    async fn locate_artifact(&self) -> Result<(), InitError> {
        let artifact = &self.config.artifact;
        if artifact.exists() {
            return Ok(());
        }

        if let Some(hook) = &self.rebuild {
            warn!(path = %artifact.display(), "artifact missing, rebuilding");
            match hook.rebuild(artifact).await {
                Ok(outcome) if outcome.artifact_exists => return Ok(()),
                Ok(_) => warn!(path = %artifact.display(), "rebuild produced no artifact"),
                Err(e) => warn!(error = %e, "rebuild failed"),
            }
        }
        Err(InitError::ArtifactMissing(artifact.clone()))
    }

    async fn connect_with_retry(&self, connection: &mut ConnectionManager<L>) -> Result<(), InitError> {
        let attempts = self.config.connect_retries + 1;
        let mut attempt = 1;
        loop {
            match connection.connect(&self.config.artifact).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(attempt, of = attempts, error = %e, "connect failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(InitError::ConnectFailed {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    fn publish(&self, inner: &Inner<F, L>, last_error: Option<String>) {
        let live = inner.state == SessionState::Live;
        let tools = if live {
            inner.connection.catalogue().to_vec()
        } else {
            Vec::new()
        };
        self.status.send_replace(StatusReport {
            initialized: live,
            tools_available: !tools.is_empty(),
            tools,
            session_id: inner.session_id,
            last_error,
        });
    }
}
