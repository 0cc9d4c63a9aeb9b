//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the servers that expose them.

/// Feed source adapters (synthetic generator, exchange stream).
pub mod feeds;

/// Per-subscriber tick fan-out.
pub mod broadcast;

/// gRPC streaming server implementation.
pub mod grpc;

/// Per-symbol feed statistics.
pub mod monitor;

/// Configuration loading.
pub mod config;

/// Health, info, stats and metrics HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
