//! inksync-core - Core library for inksync
//!
//! This crate reconciles batches of client-side changes against server-held
//! entity state. It contains the data models, the store and cache seams, the
//! per-class reconcilers, and the batch coordinator shared by the API server
//! and the CLI.

pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod util;
pub mod wire;

pub use config::EngineConfig;
pub use coordinator::SyncEngine;
pub use error::{Error, Result};
pub use models::{BatchResult, EntityClass, ItemOutcome, StoredEntity, SyncRecord};
pub use wire::{BatchRequest, BatchResponse};
