//! gRPC Streaming Server
//!
//! Implements the `MarketDataStreamer` service that exposes the tick
//! stream to remote callers.
//!
//! # Architecture
//!
//! Each `StreamTickers` call:
//!
//! 1. Opens a broadcaster subscription
//! 2. Filters ticks by the caller's symbol (blank means all)
//! 3. Derives a bid/ask update at emission time
//! 4. Streams it to the caller
//! 5. Drops the subscription when the caller disconnects

pub mod server;

pub use marketpulse_proto::v1 as proto;
pub use server::{GrpcServerError, MarketDataStreamerService, StreamerConfig};
