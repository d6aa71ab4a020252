//! Dataverse Web API client
//!
//! Layers, bottom up:
//! - [`transport`]: the HTTP seam (reqwest in production, fakes in tests)
//! - [`caller`]: bearer auth, retry with backoff, 401 refresh
//! - [`payloads`]: plan types to `*Metadata` JSON bodies
//! - [`services`]: existence check and create per object kind
//!
//! [`DataverseClient`] holds one instance of each service over a shared caller.

pub mod caller;
pub mod payloads;
pub mod services;
pub mod transport;

use std::sync::Arc;

use crate::auth::{CredentialProvider, TokenCache};
use crate::config::DeployConfig;
use crate::error::ConfigError;
use caller::{ApiCaller, RetryPolicy};
use services::{
    ChoiceSetService, ColumnService, ComponentService, EntityService, KeyService,
    PublisherService, RelationshipService, SolutionService,
};
use transport::{ReqwestTransport, Transport};

pub struct DataverseClient {
    caller: Arc<ApiCaller>,
    pub publishers: PublisherService,
    pub solutions: SolutionService,
    pub choice_sets: ChoiceSetService,
    pub entities: EntityService,
    pub columns: ColumnService,
    pub relationships: RelationshipService,
    pub keys: KeyService,
    pub components: ComponentService,
}

impl DataverseClient {
    pub fn new(caller: Arc<ApiCaller>) -> Self {
        Self {
            publishers: PublisherService::new(caller.clone()),
            solutions: SolutionService::new(caller.clone()),
            choice_sets: ChoiceSetService::new(caller.clone()),
            entities: EntityService::new(caller.clone()),
            columns: ColumnService::new(caller.clone()),
            relationships: RelationshipService::new(caller.clone()),
            keys: KeyService::new(caller.clone()),
            components: ComponentService::new(caller.clone()),
            caller,
        }
    }

    /// Client over an arbitrary transport
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        provider: Arc<dyn CredentialProvider>,
        policy: RetryPolicy,
        token_refresh_margin: std::time::Duration,
    ) -> Self {
        let tokens = Arc::new(TokenCache::new(provider, token_refresh_margin));
        Self::new(Arc::new(ApiCaller::new(transport, tokens, policy)))
    }

    /// Production client for the environment named in `config`
    pub fn connect(
        config: &DeployConfig,
        provider: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ConfigError> {
        let base_url = config.api_base_url()?;
        let transport = ReqwestTransport::new(base_url, config.request_timeout())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(Self::with_transport(
            Arc::new(transport),
            provider,
            config.retry_policy(),
            config.token_refresh_margin(),
        ))
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        self.caller.tokens()
    }
}
