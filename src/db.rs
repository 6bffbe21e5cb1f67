//! Connection pool construction and schema bootstrap.

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PoolError, PooledConnection};
use diesel::sqlite::SqliteConnection;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

const SCHEMA: &str = include_str!("../migrations/schema.sql");

/// Per-connection pragmas applied whenever the pool hands out a connection.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Builds an r2d2 pool for the database at `database_url`.
pub fn establish_connection_pool(database_url: &str) -> Result<DbPool, PoolError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)
}

/// Creates any missing tables and indexes. Safe to call on every start.
pub fn apply_schema(pool: &DbPool) -> Result<(), crate::errors::Error> {
    let mut conn = pool.get()?;
    conn.batch_execute(SCHEMA)
        .map_err(crate::repository::RepositoryError::from)?;
    Ok(())
}
