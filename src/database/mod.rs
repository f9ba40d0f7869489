//! # Database Module
//!
//! Connection pool construction and the embedded schema migrations.

pub mod connection;
pub mod migrator;

pub use connection::{connect_pool, DatabaseConnection};
pub use migrator::{run_migrations, MIGRATOR};
