//! Database layer: connection pooling and schema migrations.

pub mod migrations;
pub mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
