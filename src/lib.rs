//! Campaign Relay - campaign dispatch and real-time event distribution
//!
//! The dispatch engine walks running campaigns' contact sets and sends
//! templated messages at a paced rate, persisting its cursor per page.
//! The event layer fans domain events from a pub/sub bus out to
//! authenticated WebSocket connections.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
