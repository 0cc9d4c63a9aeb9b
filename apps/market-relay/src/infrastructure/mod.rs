//! Infrastructure Layer - Adapters and external integrations.

/// Environment configuration.
pub mod config;

/// Symbol group registry.
pub mod hub;

/// Hub HTTP surface: websocket, snapshot and health.
pub mod http;

/// Hub wire messages.
pub mod protocol;

/// Logging setup.
pub mod telemetry;

/// Upstream gRPC relay loop.
pub mod upstream;
