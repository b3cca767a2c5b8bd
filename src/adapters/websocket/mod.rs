//! WebSocket adapters for real-time dashboard updates.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         PubSub channel                               │
//! │   InMemoryPubSub (test) │ RedisPubSub (production)                   │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ subscribes
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         WebSocketHub                                 │
//! │   - Decodes tag, then payload                                        │
//! │   - Resolves the event's route                                       │
//! │   - Enqueues on each target's outbound queue                         │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      ConnectionRegistry                              │
//! │   conn-a (org 1, user x)   conn-b (org 1, user y)   conn-c (org 2)   │
//! │      └── writer task          └── writer task          └── writer    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - Envelope protocol
//! - [`connections`] - Connection registry and per-connection queues
//! - [`hub`] - Bus consumption and routing
//! - [`handler`] - Axum upgrade and health handlers

pub mod connections;
pub mod handler;
pub mod hub;
pub mod messages;

pub use connections::{ConnectionId, ConnectionRegistry, ConnectionState, Registration, Target};
pub use handler::{
    health_handler, websocket_router, ws_handler, ConnectionSettings, WebSocketState,
};
pub use hub::{DeliveryReport, WebSocketHub};
pub use messages::Envelope;
