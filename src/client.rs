//! Process-wide session context.

use std::sync::Arc;

use crate::auth::api::AuthApi;
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::store::{FileTokenPersistence, TokenPersistence, TokenStore};
use crate::config::SessionConfig;
use crate::error::{HomebaseError, Result};
use crate::http::connectivity::{AlwaysOnline, Connectivity};
use crate::http::pipeline::RequestPipeline;
use crate::http::transport::{ReqwestTransport, Transport};
use crate::session::SessionBootstrapper;

/// Owns the token store, refresh coordinator, pipeline and session state
/// machine for one process. Construct once and hand out references.
///
/// # Example
/// ```no_run
/// use homebase::client::SessionClient;
/// use homebase::config::SessionConfig;
/// use homebase::http::RequestDescriptor;
///
/// # async fn example() -> homebase::error::Result<()> {
/// let client = SessionClient::new(SessionConfig::from_env())?;
/// client.session().bootstrap().await;
/// let profile: serde_json::Value = client
///     .pipeline()
///     .execute_json(RequestDescriptor::get("/profile"))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionClient {
    config: SessionConfig,
    store: Arc<TokenStore>,
    coordinator: RefreshCoordinator,
    pipeline: Arc<RequestPipeline>,
    session: SessionBootstrapper,
    auth: AuthApi,
}

impl SessionClient {
    /// Build with file persistence, a reqwest transport and no connectivity
    /// probe.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let persistence = match config.token_dir() {
            Some(dir) => FileTokenPersistence::new(dir.clone()),
            None => FileTokenPersistence::new_default(),
        };
        let transport = ReqwestTransport::new(config.request_timeout())
            .map_err(|err| HomebaseError::Configuration(format!("HTTP client: {err}")))?;
        Ok(Self::with_parts(
            config,
            Arc::new(persistence),
            Arc::new(transport),
            Arc::new(AlwaysOnline),
        ))
    }

    /// Build from explicit collaborators.
    pub fn with_parts(
        config: SessionConfig,
        persistence: Arc<dyn TokenPersistence>,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let store = Arc::new(TokenStore::new(persistence));
        let coordinator =
            RefreshCoordinator::new(transport.clone(), store.clone(), config.refresh_url());
        let pipeline = Arc::new(RequestPipeline::new(
            config.clone(),
            transport,
            connectivity,
            store.clone(),
            coordinator.clone(),
        ));
        let session =
            SessionBootstrapper::new(store.clone(), coordinator.clone(), config.expiry_margin());
        let auth = AuthApi::new(pipeline.clone());
        Self {
            config,
            store,
            coordinator,
            pipeline,
            session,
            auth,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    pub fn session(&self) -> &SessionBootstrapper {
        &self.session
    }

    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }
}
