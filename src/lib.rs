//! Image generation gateway
//!
//! Accepts prompt-to-image requests, generates images either through a
//! remote prediction provider (fast path) or by driving a single browser
//! session against a generator website, and exposes job status by id.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod telemetry;
