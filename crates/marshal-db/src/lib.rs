//! Database layer for the Marshal configuration backend.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Every configuration table Marshal persists is
//! created through versioned migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: the backend is a single-process service; WAL
//!   allows concurrent readers with a single writer, which matches the
//!   read-heavy configuration access pattern.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management; each request handler checks out one connection.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, ensuring migrations ship with the server and cannot
//!   drift from the code that depends on them.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
