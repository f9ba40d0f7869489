//! # Service Bootstrap
//!
//! Wires the order service together and owns its lifecycle.
//!
//! Startup order:
//!
//! 1. Connect the database pool and apply migrations (fatal on failure)
//! 2. Build the repository and the cache, start the cache janitor
//! 3. Warm the cache from the store when enabled (failure is logged only)
//! 4. Ensure the order queue exists and start the ingestion pipeline
//! 5. Bind the HTTP listener (fatal on failure) and serve
//!
//! [`OrderServiceHandle::stop`] reverses this: the HTTP server drains with a
//! bounded timeout, the pipeline finishes its current message, the janitor
//! stops and the pools close.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::{CacheJanitor, OrderCache};
use crate::config::ServiceConfig;
use crate::database::{connect_pool, run_migrations, DatabaseConnection};
use crate::error::{OrderStreamError, Result};
use crate::ingestion::{IngestionPipeline, PipelineConfig, PipelineStats};
use crate::messaging::{OrderLog, PgmqOrderLog};
use crate::repository::{OrderRepository, PgOrderRepository};
use crate::services::OrderQueryService;
use crate::web::{self, AppState};

/// Collaborators the service runs against
#[derive(Debug, Clone)]
pub struct ServiceComponents {
    pub log: Arc<dyn OrderLog>,
    pub repository: Arc<dyn OrderRepository>,
}

/// Running service
#[derive(Debug)]
pub struct OrderServiceHandle {
    pub config: Arc<ServiceConfig>,
    pub cache: Arc<OrderCache>,
    pub query: OrderQueryService,
    pub pipeline_stats: Arc<PipelineStats>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    pipeline_task: JoinHandle<()>,
    web_task: JoinHandle<std::io::Result<()>>,
    janitor: Option<CacheJanitor>,
    pools: Vec<PgPool>,
}

impl OrderServiceHandle {
    /// Address the HTTP server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops the service when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop every task and close the pools
    pub async fn stop(self) -> Result<()> {
        info!("🛑 Stopping order service");
        self.shutdown.cancel();

        let web_result = match self.web_task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(OrderStreamError::WebServer(e.to_string())),
            Err(e) => Err(OrderStreamError::WebServer(format!("server task failed: {e}"))),
        };

        if let Err(e) = self.pipeline_task.await {
            error!(error = %e, "Ingestion pipeline task ended abnormally");
        }

        if let Some(janitor) = self.janitor {
            janitor.stop().await;
        }

        for pool in self.pools {
            pool.close().await;
        }

        info!(stats = ?self.pipeline_stats.snapshot(), "✅ Order service stopped");
        web_result
    }
}

pub struct OrderServiceBootstrap;

impl OrderServiceBootstrap {
    /// Start the service against PostgreSQL and pgmq as configured
    pub async fn bootstrap(config: ServiceConfig) -> Result<OrderServiceHandle> {
        info!(config = ?config.sanitized(), "🔧 Bootstrapping order service");

        let database = DatabaseConnection::new(&config.database).await?;
        if !database.health_check().await? {
            return Err(OrderStreamError::DatabaseError(
                "database health check failed".to_string(),
            ));
        }
        let pool = database.pool().clone();

        if config.database.run_migrations {
            run_migrations(&pool).await?;
        }

        let mut pools = vec![pool.clone()];
        let log_pool = match config.log.url.as_deref() {
            Some(url) => {
                let log_pool = connect_pool(url, &config.database).await?;
                pools.push(log_pool.clone());
                log_pool
            }
            None => pool.clone(),
        };

        let log = PgmqOrderLog::new(log_pool, &config.log);
        if let Err(e) = log.ensure_queue().await {
            // the pipeline backs off on fetch errors until the queue is usable
            warn!(error = %e, queue = %config.log.queue_name, "Could not ensure order queue exists");
        }

        let components = ServiceComponents {
            log: Arc::new(log),
            repository: Arc::new(PgOrderRepository::new(pool)),
        };

        Self::start_with_pools(config, components, pools).await
    }

    /// Start the service against the given collaborators
    pub async fn start(
        config: ServiceConfig,
        components: ServiceComponents,
    ) -> Result<OrderServiceHandle> {
        Self::start_with_pools(config, components, Vec::new()).await
    }

    async fn start_with_pools(
        config: ServiceConfig,
        components: ServiceComponents,
        pools: Vec<PgPool>,
    ) -> Result<OrderServiceHandle> {
        let shutdown = CancellationToken::new();
        let config = Arc::new(config);

        let cache = Arc::new(OrderCache::new(
            config.cache.ttl(),
            config.cache.max_entries,
        ));
        let janitor = cache.start_janitor(config.cache.sweep_interval(), &shutdown);

        let query = OrderQueryService::new(Arc::clone(&cache), Arc::clone(&components.repository));

        if config.cache.warm_on_start {
            match query.warm_cache().await {
                Ok(count) => info!(count, "🔥 Cache warmed from store"),
                Err(e) => warn!(error = %e, "Cache warm-up failed, starting cold"),
            }
        }

        // bind before consuming so a bad address fails startup cleanly
        let listener = match TcpListener::bind(&config.web.bind_address).await {
            Ok(listener) => listener,
            Err(e) => {
                shutdown.cancel();
                if let Some(janitor) = janitor {
                    janitor.stop().await;
                }
                for pool in &pools {
                    pool.close().await;
                }
                return Err(OrderStreamError::WebServer(format!(
                    "failed to bind {}: {e}",
                    config.web.bind_address
                )));
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|e| OrderStreamError::WebServer(e.to_string()))?;

        let pipeline = Arc::new(IngestionPipeline::new(
            components.log,
            components.repository,
            Arc::clone(&cache),
            PipelineConfig::from(&config.log),
        ));
        let pipeline_stats = pipeline.stats();
        let pipeline_task = pipeline.spawn(shutdown.clone());

        let app = web::create_app(AppState::new(query.clone()));
        let web_task = tokio::spawn(web::serve(
            listener,
            app,
            shutdown.clone(),
            config.web.shutdown_timeout(),
        ));

        info!(%local_addr, queue = %config.log.queue_name, "🎉 Order service started");

        Ok(OrderServiceHandle {
            config,
            cache,
            query,
            pipeline_stats,
            local_addr,
            shutdown,
            pipeline_task,
            web_task,
            janitor,
            pools,
        })
    }
}
