//! Service layer for the lobby bot
//!
//! Application state, service coordination, health checks and background
//! task management.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus, ServiceProbe};
