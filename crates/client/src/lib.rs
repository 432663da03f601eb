//! Backend-facing half of the order tracker
//!
//! - **Event stream** (`stream`) - live subscription with fixed-delay reconnect and backfill
//! - **Command gateway** (`gateway`) - the approve command, folded back into the view
//! - **HTTP transport** (`http`) - REST and `text/event-stream` client for the order backend
//! - **Synthetic transport** (`synthetic`) - scripted feed for running without a backend
//!
//! # Architecture
//!
//! ```text
//! EventTransport → EventStreamClient ─┐
//!                                     ├→ OrderStore (reconciler) → snapshots
//! CommandTransport → CommandGateway ──┘
//! ```

pub mod gateway;
pub mod http;
pub mod sse;
pub mod stream;
pub mod synthetic;

pub use gateway::{ApprovalReceipt, ApproveResponse, CommandError, CommandGateway, CommandTransport};
pub use http::HttpFeedClient;
pub use stream::{EventStreamClient, EventTransport, ReconnectPolicy, TransportError};
pub use synthetic::SyntheticTransport;
