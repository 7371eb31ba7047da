//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the lobby bot using
//! Prometheus metrics.

use crate::lobby::RegistryStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the lobby bot
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Inbound event metrics
    event_metrics: EventMetrics,

    /// Lobby-related metrics
    lobby_metrics: LobbyMetrics,

    /// Outbound platform call metrics
    platform_metrics: PlatformMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Inbound event metrics
#[derive(Clone)]
pub struct EventMetrics {
    /// Events dispatched by kind and route
    pub events_total: IntCounterVec,

    /// Events whose command or component id matched no route
    pub unknown_routes_total: IntCounterVec,

    /// Deliveries that could not be decoded
    pub malformed_events_total: IntCounter,

    /// Component clicks on messages that are not a live join message
    pub stale_interactions_total: IntCounter,

    /// Time spent handling one event
    pub dispatch_duration: HistogramVec,
}

/// Lobby-related metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Number of registered lobbies
    pub active_lobbies: IntGauge,

    /// Number of lobby creations in flight
    pub pending_lobbies: IntGauge,

    /// Total lobbies created
    pub lobbies_created_total: IntCounter,

    /// Total creations abandoned after a failed send
    pub lobbies_abandoned_total: IntCounter,

    /// Total lobbies reclaimed for inactivity
    pub lobbies_reclaimed_total: IntCounter,

    /// New-game requests rejected because a lobby already existed
    pub duplicate_rejections_total: IntCounter,

    /// Join and leave requests by action and result
    pub membership_changes_total: IntCounterVec,

    /// Lobby size after a membership change
    pub lobby_members: Histogram,
}

/// Outbound platform call metrics
#[derive(Clone)]
pub struct PlatformMetrics {
    /// Platform requests by operation and status
    pub requests_total: IntCounterVec,

    /// Platform request latency
    pub request_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let event_metrics = EventMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let platform_metrics = PlatformMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            event_metrics,
            lobby_metrics,
            platform_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get event metrics
    pub fn events(&self) -> &EventMetrics {
        &self.event_metrics
    }

    /// Get lobby metrics
    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    /// Get platform metrics
    pub fn platform(&self) -> &PlatformMetrics {
        &self.platform_metrics
    }

    /// Refresh lobby gauges from registry stats
    pub fn update_from_registry_stats(&self, stats: &RegistryStats) {
        self.lobby_metrics
            .active_lobbies
            .set(stats.active_lobbies as i64);
        self.lobby_metrics
            .pending_lobbies
            .set(stats.pending_lobbies as i64);
    }

    /// Record an inbound event being dispatched
    pub fn record_event(&self, kind: &str, route: &str, duration: Duration) {
        self.event_metrics
            .events_total
            .with_label_values(&[kind, route])
            .inc();

        self.event_metrics
            .dispatch_duration
            .with_label_values(&[route])
            .observe(duration.as_secs_f64());
    }

    pub fn record_unknown_route(&self, kind: &str) {
        self.event_metrics
            .unknown_routes_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn record_malformed_event(&self) {
        self.event_metrics.malformed_events_total.inc();
    }

    pub fn record_stale_interaction(&self) {
        self.event_metrics.stale_interactions_total.inc();
    }

    /// Record a lobby being registered
    pub fn record_lobby_created(&self) {
        self.lobby_metrics.lobbies_created_total.inc();
        self.lobby_metrics.active_lobbies.inc();
    }

    pub fn record_lobby_abandoned(&self) {
        self.lobby_metrics.lobbies_abandoned_total.inc();
    }

    pub fn record_duplicate_lobby(&self) {
        self.lobby_metrics.duplicate_rejections_total.inc();
    }

    /// Record idle lobbies being reclaimed
    pub fn record_lobbies_reclaimed(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.lobby_metrics
            .lobbies_reclaimed_total
            .inc_by(count as u64);
        self.lobby_metrics.active_lobbies.sub(count as i64);
    }

    /// Record a join or leave request and, when applied, the new lobby size
    pub fn record_membership_change(&self, action: &str, result: &str, members: Option<usize>) {
        self.lobby_metrics
            .membership_changes_total
            .with_label_values(&[action, result])
            .inc();

        if let Some(members) = members {
            self.lobby_metrics.lobby_members.observe(members as f64);
        }
    }

    /// Record an outbound platform request
    pub fn record_platform_call(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.platform_metrics
            .requests_total
            .with_label_values(&[operation, status])
            .inc();

        self.platform_metrics
            .request_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Record an AMQP delivery
    pub fn record_amqp_message(&self, status: &str) {
        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[status])
            .inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new("lobby_bot_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "lobby_bot_amqp_messages_total",
                "Total AMQP deliveries received",
            ),
            &["status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let health_status = IntGauge::new(
            "lobby_bot_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("lobby_bot_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            health_status,
            component_health,
        })
    }
}

impl EventMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let events_total = IntCounterVec::new(
            Opts::new("lobby_bot_events_total", "Platform events dispatched"),
            &["kind", "route"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let unknown_routes_total = IntCounterVec::new(
            Opts::new(
                "lobby_bot_unknown_routes_total",
                "Platform events with no matching route",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(unknown_routes_total.clone()))?;

        let malformed_events_total = IntCounter::new(
            "lobby_bot_malformed_events_total",
            "Deliveries that could not be decoded",
        )?;
        registry.register(Box::new(malformed_events_total.clone()))?;

        let stale_interactions_total = IntCounter::new(
            "lobby_bot_stale_interactions_total",
            "Component interactions on messages that are not a live join message",
        )?;
        registry.register(Box::new(stale_interactions_total.clone()))?;

        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new(
                "lobby_bot_dispatch_duration_seconds",
                "Time spent handling a platform event",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["route"],
        )?;
        registry.register(Box::new(dispatch_duration.clone()))?;

        Ok(Self {
            events_total,
            unknown_routes_total,
            malformed_events_total,
            stale_interactions_total,
            dispatch_duration,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_lobbies = IntGauge::new("lobby_bot_active_lobbies", "Registered lobbies")?;
        registry.register(Box::new(active_lobbies.clone()))?;

        let pending_lobbies =
            IntGauge::new("lobby_bot_pending_lobbies", "Lobby creations in flight")?;
        registry.register(Box::new(pending_lobbies.clone()))?;

        let lobbies_created_total =
            IntCounter::new("lobby_bot_lobbies_created_total", "Total lobbies created")?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let lobbies_abandoned_total = IntCounter::new(
            "lobby_bot_lobbies_abandoned_total",
            "Lobby creations abandoned after a failed send",
        )?;
        registry.register(Box::new(lobbies_abandoned_total.clone()))?;

        let lobbies_reclaimed_total = IntCounter::new(
            "lobby_bot_lobbies_reclaimed_total",
            "Idle lobbies reclaimed",
        )?;
        registry.register(Box::new(lobbies_reclaimed_total.clone()))?;

        let duplicate_rejections_total = IntCounter::new(
            "lobby_bot_duplicate_rejections_total",
            "New-game requests rejected because a lobby already existed",
        )?;
        registry.register(Box::new(duplicate_rejections_total.clone()))?;

        let membership_changes_total = IntCounterVec::new(
            Opts::new(
                "lobby_bot_membership_changes_total",
                "Join and leave requests",
            ),
            &["action", "result"],
        )?;
        registry.register(Box::new(membership_changes_total.clone()))?;

        let lobby_members = Histogram::with_opts(
            HistogramOpts::new("lobby_bot_lobby_members", "Lobby size after a membership change")
                .buckets(vec![1.0, 2.0, 3.0, 5.0, 7.0, 10.0, 15.0, 25.0]),
        )?;
        registry.register(Box::new(lobby_members.clone()))?;

        Ok(Self {
            active_lobbies,
            pending_lobbies,
            lobbies_created_total,
            lobbies_abandoned_total,
            lobbies_reclaimed_total,
            duplicate_rejections_total,
            membership_changes_total,
            lobby_members,
        })
    }
}

impl PlatformMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new(
                "lobby_bot_platform_requests_total",
                "Outbound platform requests",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "lobby_bot_platform_request_duration_seconds",
                "Outbound platform request latency",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            requests_total,
            request_duration,
        })
    }
}
