//! aquaserver - A continuous-integration test coordinator
//!
//! Periodically freezes the active repositories into immutable
//! snapshots, enumerates their tests, dispatches them to local workers
//! and polling browsers by decaying priority, and serves a live report.

pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod http_server;
pub mod observability;
pub mod report;
pub mod repos;
pub mod snapshot;
