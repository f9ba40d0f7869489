#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Order Stream
//!
//! Order ingestion and lookup service.
//!
//! Orders arrive as JSON messages on a durable queue. Each one is decoded,
//! validated, written to PostgreSQL in a single transaction, cached, and only
//! then acknowledged. Reads go through a bounded, time-expiring cache in front
//! of the store.
//!
//! ## Module Organization
//!
//! - [`models`] - Order aggregate and its wire shape
//! - [`validation`] - Field-level order validation
//! - [`repository`] - Transactional order storage
//! - [`cache`] - TTL cache and its background sweep
//! - [`messaging`] - Order log abstraction over pgmq
//! - [`ingestion`] - Decode and the consume loop
//! - [`services`] - Read-through order lookup
//! - [`web`] - HTTP endpoints
//! - [`database`] - Pool and migrations
//! - [`config`] - Service configuration
//! - [`bootstrap`] - Process wiring and shutdown
//!
//! ## Delivery Guarantees
//!
//! A message is acknowledged only after its order is stored and cached, or
//! after it is judged unusable. Storage failures leave the message in place to
//! be fetched again, and storage is a full replace, so redelivery is harmless.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod repository;
pub mod services;
pub mod validation;
pub mod web;

pub use bootstrap::{OrderServiceBootstrap, OrderServiceHandle, ServiceComponents};
pub use cache::{OrderCache, TtlCache};
pub use config::ServiceConfig;
pub use error::{OrderStreamError, Result};
pub use ingestion::{CycleOutcome, IngestionPipeline, PipelineConfig};
pub use messaging::{InMemoryOrderLog, LogMessage, OrderLog, PgmqOrderLog};
pub use models::{Delivery, Item, Order, Payment};
pub use repository::{InMemoryOrderRepository, OrderRepository, PgOrderRepository};
pub use services::{CacheStatus, OrderLookup, OrderQueryService};
pub use validation::{validate_order, ValidationErrors};
