//! # Websync
//!
//! Webinar attendance synchronization service. Pulls webinars and
//! participant reports from the provider API, derives attendance sessions,
//! and tracks every sync as a durable attempt row with recovery, stuck
//! detection, and export retry handling around it.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod export_retry;
pub mod handlers;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod provider;
pub mod recovery;
pub mod remote;
pub mod repositories;
pub mod server;
pub mod telemetry;
