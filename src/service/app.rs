//! Main application state and service coordination
//!
//! `AppState` wires the session registry, the lobby handlers and the
//! dispatcher to the platform client, the AMQP consumer and the health
//! server, and owns the background maintenance tasks.

use crate::amqp::{AmqpConfig, AmqpConnection, AmqpPlatformClient, InteractionConsumer};
use crate::bot::{Dispatcher, LobbyHandlers};
use crate::config::{validate_config, AppConfig};
use crate::lobby::SessionRegistry;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::platform::PlatformClient;
use crate::service::health::{HealthCheck, HealthStatus, ServiceProbe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// How often lobby gauges are refreshed from registry stats
const REGISTRY_METRICS_INTERVAL: Duration = Duration::from_secs(30);

/// How often health gauges are refreshed
const HEALTH_METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Lobbies by location and join message
    registry: Arc<SessionRegistry>,

    /// Routes inbound events to the lobby handlers
    dispatcher: Arc<Dispatcher>,

    /// Broker connection, absent when running against an injected platform
    amqp_connection: Option<Arc<AmqpConnection>>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// AMQP consumer for platform events
    interaction_consumer: Option<InteractionConsumer>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    probe: ServiceProbe,
}

impl AppState {
    /// Connect to the broker and build the service on top of it
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing lobby bot service");
        info!(
            "Configuration: service={}, game={}, amqp_url={}",
            config.service.name, config.lobby.game_name, config.amqp.url
        );

        validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let amqp_connection = Self::initialize_amqp(&config).await?;

        let channel =
            amqp_connection
                .open_channel()
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to open platform channel: {}", e),
                })?;

        let platform = AmqpPlatformClient::new(
            channel,
            &config.amqp.platform_exchange,
            config.amqp_reply_timeout(),
        )
        .await
        .map_err(|e| ServiceError::Initialization {
            message: format!("Failed to initialize platform client: {}", e),
        })?;

        Self::assemble(config, Arc::new(platform), Some(amqp_connection))
    }

    /// Build the service around an existing platform client, without a broker
    pub fn with_platform(
        config: AppConfig,
        platform: Arc<dyn PlatformClient>,
    ) -> Result<Self, ServiceError> {
        Self::assemble(config, platform, None)
    }

    fn assemble(
        config: AppConfig,
        platform: Arc<dyn PlatformClient>,
        amqp_connection: Option<Arc<AmqpConnection>>,
    ) -> Result<Self, ServiceError> {
        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let registry = Arc::new(SessionRegistry::new());
        let handlers = Arc::new(LobbyHandlers::new(
            registry.clone(),
            platform,
            metrics_collector.clone(),
            config.lobby.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(handlers, metrics_collector.clone()));

        let is_running = Arc::new(RwLock::new(false));
        let probe = ServiceProbe::new(
            config.service.name.clone(),
            registry.clone(),
            is_running.clone(),
            amqp_connection.clone(),
        );

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_probe(probe.clone()),
        );
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Ok(Self {
            config,
            registry,
            dispatcher,
            amqp_connection,
            metrics_service,
            background_tasks: Vec::new(),
            interaction_consumer: None,
            is_running,
            probe,
        })
    }

    /// Start all background services and message consumption
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting lobby bot service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await;

        if self.amqp_connection.is_some() {
            self.start_amqp_consumption().await?;
        } else {
            info!("No AMQP connection - skipping event consumption");
        }

        self.start_background_tasks();

        info!("✅ Lobby bot service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of lobby bot service");

        *self.is_running.write().await = false;

        if let Some(consumer) = self.interaction_consumer.take() {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            } else {
                info!("✅ AMQP message consumption stopped");
            }
        }

        self.stop_background_tasks();

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        if let Some(connection) = &self.amqp_connection {
            if let Err(e) = connection.close().await {
                warn!("Failed to close AMQP connection: {}", e);
            }
        }

        let final_stats =
            self.registry
                .stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("✅ Lobby bot service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Cloneable view used by health checks
    pub fn probe(&self) -> ServiceProbe {
        self.probe.clone()
    }

    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let connection = AmqpConnection::new(AmqpConfig::from(&config.amqp))
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to connect to AMQP: {}", e),
            })?;

        Ok(Arc::new(connection))
    }

    async fn start_metrics_service(&mut self) {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });

        self.background_tasks.push(metrics_handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
    }

    async fn start_amqp_consumption(&mut self) -> Result<(), ServiceError> {
        let Some(connection) = &self.amqp_connection else {
            return Ok(());
        };

        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let queue = self.config.amqp.events_queue.as_str();
        let consumer = InteractionConsumer::new(self.dispatcher.clone(), channel);
        consumer
            .start_consuming(queue)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming messages: {}", e),
            })?;

        self.interaction_consumer = Some(consumer);

        info!(
            "AMQP message consumption started successfully on queue: '{}'",
            queue
        );
        Ok(())
    }

    fn start_background_tasks(&mut self) {
        info!("Starting background maintenance tasks...");

        let metrics_task = {
            let registry = self.registry.clone();
            let metrics_collector = self.metrics_service.collector();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(REGISTRY_METRICS_INTERVAL);

                while *is_running.read().await {
                    interval.tick().await;

                    match registry.stats() {
                        Ok(stats) => {
                            debug!(
                                "Updating metrics - lobbies: {}, pending: {}",
                                stats.active_lobbies, stats.pending_lobbies
                            );
                            metrics_collector.update_from_registry_stats(&stats);
                        }
                        Err(e) => {
                            warn!("Failed to get registry stats for metrics update: {}", e);
                        }
                    }
                }

                info!("Metrics update task stopped");
            })
        };

        let reclaim_task = if self.config.lobby.reclaim_idle_lobbies {
            let handlers = self.dispatcher.handlers().clone();
            let is_running = self.is_running.clone();
            let cleanup_interval = self.config.lobby.cleanup_interval();
            let idle_timeout = self.config.lobby.idle_timeout();

            info!(
                "Starting idle lobby reclaim task ({}s interval, {}s idle timeout)...",
                cleanup_interval.as_secs(),
                idle_timeout.as_secs()
            );

            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(cleanup_interval);

                while *is_running.read().await {
                    interval.tick().await;

                    match handlers.reclaim_idle(idle_timeout).await {
                        Ok(0) => debug!("Reclaim check completed - no idle lobbies found"),
                        Ok(reclaimed) => info!("Reclaimed {} idle lobbies", reclaimed),
                        Err(e) => warn!("Idle lobby reclaim failed: {}", e),
                    }
                }

                info!("Idle lobby reclaim task stopped");
            }))
        } else {
            info!("Idle lobby reclaim disabled - skipping reclaim task");
            None
        };

        let health_metrics_task = {
            let metrics_collector = self.metrics_service.collector();
            let probe = self.probe.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_METRICS_INTERVAL);

                while probe.is_running().await {
                    interval.tick().await;

                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(probe.uptime_seconds() as i64);

                    match HealthCheck::check(&probe).await {
                        Ok(health) => {
                            metrics_collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status != HealthStatus::Unhealthy,
                                );
                            }
                            debug!(
                                "Health check: {} - {} active lobbies",
                                health.status, health.stats.active_lobbies
                            );
                        }
                        Err(e) => warn!("Health check failed: {}", e),
                    }
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(metrics_task);
        self.background_tasks.push(health_metrics_task);
        if let Some(task) = reclaim_task {
            self.background_tasks.push(task);
        }

        info!(
            "{} background tasks running",
            self.background_tasks.len()
        );
    }

    fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            return;
        }

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
