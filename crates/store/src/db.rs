//! Opening the store's SQLite database.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);
/// Per-connection settings with no [`SqliteConnectOptions`] builder.
const SESSION_PRAGMAS: &str = "
    PRAGMA locking_mode = NORMAL;
    PRAGMA wal_autocheckpoint = 800;
    PRAGMA cache_size = -8192;
    PRAGMA temp_store = MEMORY;
";

/// Pool tuning knobs, usually populated from the application configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_connections: u32,
    /// How long a writer waits on SQLite's single write lock before the
    /// attempt is reported as [`ErrorKind::Conflict`].
    pub busy_timeout: Duration,
}
impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: MAX_CONNECTIONS,
            busy_timeout: BUSY_TIMEOUT,
        }
    }
}

/// Handle to a migrated revision store.
///
/// [`PageStore`](crate::PageStore), [`AttachmentStore`](crate::AttachmentStore),
/// [`Archive`](crate::Archive) and [`OrphanCollector`](crate::OrphanCollector)
/// are all built from one of these.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn open(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Runs for each new pooled connection, not just the first.
            .after_connect(|conn, meta| Box::pin(async move { Self::on_connect(conn, meta).await }))
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open (creating if needed) the database file at `path` with default
    /// pool options.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, PoolOptions::default()).await
    }

    /// Open (creating if needed) the database file at `path`.
    pub async fn connect_with(path: impl AsRef<Path>, options: PoolOptions) -> Result<Self> {
        if options.max_connections == 0 {
            exn::bail!(ErrorKind::Invariant("a connection pool needs at least one connection"));
        }
        let connect = Self::connect_options(options.busy_timeout)
            .filename(path.as_ref())
            .create_if_missing(true);
        Self::open(connect, options.max_connections).await
    }

    /// A private, migrated database that lives as long as its one connection.
    ///
    /// Available outside `cfg(test)` so dependent crates can test against it.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::connect_options(BUSY_TIMEOUT).filename(":memory:");
        // Each `:memory:` connection is its own database.
        Self::open(options, 1).await
    }

    fn connect_options(busy_timeout: Duration) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            // Attachment links use foreign keys to keep linked blobs alive.
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout)
            .auto_vacuum(SqliteAutoVacuum::None)
    }

    async fn on_connect(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(SESSION_PRAGMAS).execute(conn).await?;
        Ok(())
    }

    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for checked-out connections to come back, then shut the pool.
    pub async fn close(&self) {
        if let Err(err) = sqlx::query("PRAGMA optimize").execute(&self.pool).await {
            debug!(%err, "skipped query planner optimisation");
        }
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PageStore;
    use crate::models::PageDraft;

    async fn pragma(conn: &mut SqliteConnection, name: &str) -> i64 {
        sqlx::query_scalar(&format!("PRAGMA {name}")).fetch_one(conn).await.unwrap()
    }

    #[tokio::test]
    async fn test_file_database_is_created_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.db");
        let db = Database::connect(&path).await.unwrap();
        PageStore::from(&db).save(&PageDraft::new("A", "x", "alice")).await.unwrap();
        db.close().await;
        assert!(db.pool().is_closed());
        assert!(path.is_file());

        let reopened = Database::connect(&path).await.unwrap();
        let pages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages").fetch_one(reopened.pool()).await.unwrap();
        assert_eq!(pages, 1);
        reopened.migrate().await.unwrap();
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_every_pooled_connection_is_configured() {
        let dir = tempfile::tempdir().unwrap();
        let options = PoolOptions { max_connections: 2, busy_timeout: Duration::from_millis(250) };
        let db = Database::connect_with(dir.path().join("folio.db"), options).await.unwrap();
        let mut first = db.pool().acquire().await.unwrap();
        let mut second = db.pool().acquire().await.unwrap();
        for conn in [&mut *first, &mut *second] {
            let journal: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(&mut *conn).await.unwrap();
            assert_eq!(journal, "wal");
            assert_eq!(pragma(conn, "foreign_keys").await, 1);
            assert_eq!(pragma(conn, "busy_timeout").await, 250);
            assert_eq!(pragma(conn, "wal_autocheckpoint").await, 800);
            assert_eq!(pragma(conn, "cache_size").await, -8192);
        }
    }

    #[tokio::test]
    async fn test_schema_tables_exist() {
        let db = Database::connect_in_memory().await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(db.pool())
            .await
            .unwrap();
        for expected in [
            "deleted_page_revisions",
            "deleted_pages",
            "page_file_revisions",
            "page_files",
            "page_revision_attachments",
            "page_revisions",
            "pages",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn test_zero_connections_rejected() {
        let options = PoolOptions { max_connections: 0, ..PoolOptions::default() };
        let err = Database::connect_with("unused.db", options).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Invariant(_)));
    }
}
