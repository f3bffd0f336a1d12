//! The process-scoped component registry.
//!
//! Breakers, cost trackers, rate limiters, caches, and envelopes are
//! process-wide singletons owned here and injected into components, so
//! tests can substitute instances. Locks inside these components guard only
//! counter and state transitions, never I/O.

use crate::breaker::BreakerRegistry;
use crate::config::Config;
use crate::cost::{BudgetManager, CostCache, CostTracker, EnvelopeManager};
use crate::db::Database;
use crate::error::Result;
use crate::graph::checkpoint::CheckpointStore;
use crate::model::{ModelScope, ModelSet, TrackedModel};
use crate::queue::durable::DurableQueue;
use crate::ratelimit::RateLimiter;
use crate::security::{NetworkAllowlist, ToolPolicy};
use crate::sources::providers::{HttpProviderClient, ProviderClient};
use crate::task_state::TaskStateRegistry;
use crate::transport::{NoopTransport, TelegramTransport, Transport};
use crate::versioning::Changelog;
use kg::store::{GraphStore, LoggingStore};
use std::sync::Arc;

/// Everything a worker, supervisor node, or API handler needs.
pub struct AppContext {
    pub config: Config,
    pub db: Database,
    pub store: Arc<dyn GraphStore>,
    pub breakers: BreakerRegistry,
    pub limiter: RateLimiter,
    pub tracker: CostTracker,
    pub budget: BudgetManager,
    pub envelopes: EnvelopeManager,
    pub cache: CostCache,
    pub allowlist: NetworkAllowlist,
    pub tools: ToolPolicy,
    pub task_states: TaskStateRegistry,
    pub queue: DurableQueue,
    pub checkpoints: CheckpointStore,
    pub changelog: Changelog,
    pub transport: Arc<dyn Transport>,
    pub models: ModelSet,
    pub providers: Arc<dyn ProviderClient>,
    pub http: reqwest::Client,
}

impl AppContext {
    /// Build the production context from configuration.
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let database_url = config
            .database_url
            .clone()
            .unwrap_or_else(|| "sqlite:gleaner.db".to_string());
        let db = Database::connect(&database_url).await?;

        let transport: Arc<dyn Transport> = match &config.telegram_bot_token {
            Some(token) => Arc::new(TelegramTransport::new(token.clone())),
            None => Arc::new(NoopTransport),
        };

        Ok(Self::assemble(
            config,
            db,
            Arc::new(LoggingStore::new()),
            transport,
            ModelSet::from_env(),
            Arc::new(HttpProviderClient::new()),
        ))
    }

    /// Assemble a context from explicit parts (tests inject substitutes).
    pub fn assemble(
        config: Config,
        db: Database,
        store: Arc<dyn GraphStore>,
        transport: Arc<dyn Transport>,
        models: ModelSet,
        providers: Arc<dyn ProviderClient>,
    ) -> Arc<Self> {
        let tracker = CostTracker::new();
        let budget = BudgetManager::from_config(&config, tracker.clone());
        let envelopes = EnvelopeManager::from_config(&config, tracker.clone());
        let allowlist = NetworkAllowlist::with_extra(&config.network_allowlist);
        let tools = ToolPolicy::from_config(&config);
        let queue = DurableQueue::new(db.clone());
        let checkpoints = CheckpointStore::new(db.clone());
        let changelog = Changelog::new(db.clone());

        Arc::new(Self {
            config,
            db,
            store,
            breakers: BreakerRegistry::new(),
            limiter: RateLimiter::new(),
            tracker,
            budget,
            envelopes,
            cache: CostCache::new(),
            allowlist,
            tools,
            task_states: TaskStateRegistry::new(),
            queue,
            checkpoints,
            changelog,
            transport,
            models,
            providers,
            http: reqwest::Client::new(),
        })
    }

    /// A tracked model for a task label and scope, None when no provider is
    /// configured.
    pub fn model_for_task(&self, task_type: &str, scope: ModelScope) -> Option<TrackedModel> {
        let base = self.models.for_task(task_type)?;
        Some(TrackedModel::new(
            base,
            scope,
            self.breakers.clone(),
            self.tracker.clone(),
            self.budget.clone(),
            self.envelopes.clone(),
        ))
    }
}

/// Test-support constructors, also used by integration tests.
pub mod testing {
    use super::*;
    use crate::transport::RecordingTransport;
    use llm::mock::MockModel;
    use llm::ChatModel;

    /// An in-memory context with a scripted model and recording transport.
    pub struct TestContext {
        pub ctx: Arc<AppContext>,
        pub transport: Arc<RecordingTransport>,
        pub mock: Arc<MockModel>,
    }

    /// Build a test context around scripted model responses.
    pub async fn test_context(responses: Vec<&str>) -> TestContext {
        test_context_with_config(responses, Config::default()).await
    }

    pub async fn test_context_with_config(responses: Vec<&str>, config: Config) -> TestContext {
        let db = Database::in_memory().await.expect("in-memory db");
        let transport = Arc::new(RecordingTransport::new());
        let mock = Arc::new(MockModel::new(responses));
        let model: Arc<dyn ChatModel> = mock.clone();

        struct NoProviders;
        #[async_trait::async_trait]
        impl ProviderClient for NoProviders {
            async fn search(
                &self,
                _provider: crate::sources::providers::SourceProvider,
                _query: &str,
                _limit: usize,
            ) -> Result<Vec<crate::sources::providers::SourceCandidate>> {
                Ok(Vec::new())
            }
        }

        let ctx = AppContext::assemble(
            config,
            db,
            Arc::new(LoggingStore::new()),
            transport.clone(),
            ModelSet::uniform(model),
            Arc::new(NoProviders),
        );
        TestContext { ctx, transport, mock }
    }
}
