//! Volley, a self-hosted HTTP load-testing service.
//!
//! An operator submits a [`models::LoadTestConfig`] describing a burst of HTTP
//! requests (target, method, body, concurrency, batching, declarative
//! validation rules). The engine drives the burst in sequential batches of
//! concurrent calls, evaluates each response against the configured rules,
//! accumulates running statistics, and streams per-request progress events to
//! every connected WebSocket client. Runs can be cancelled cooperatively
//! mid-flight and queried afterwards.
//!
//! The crate is a single binary (`src/main.rs`) wired from these modules:
//!
//! - [`executor`]: batch scheduling and the run driver
//! - [`client`]: a single HTTP exchange with timeout/redirect/TLS policy
//! - [`validation`]: per-rule response verdicts
//! - [`session`]: the process-wide run registry and cancellation flags
//! - [`events`]: the progress event contract and broadcast publisher
//! - [`api`] / [`ws`]: the HTTP and WebSocket service surface
//! - [`storage`]: on-disk run logs, summaries, and saved configurations

pub mod api;
pub mod client;
pub mod error;
pub mod events;
pub mod executor;
pub mod models;
pub mod session;
pub mod storage;
pub mod utils;
pub mod validation;
pub mod ws;
