//! Wellness Reports service library.
//!
//! Aggregates per-user wellness data from connected providers, manages OAuth
//! token freshness, and generates exactly one emailed report per user, date
//! and cadence.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod mail;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod queue;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod tokens;
pub mod webhook_signature;

pub use migration;
