//! Finding and deleting file revisions that no page revision links to.
//!
//! A file revision becomes an orphan when it is replaced at a page revision
//! that never gets edited again, or when its last link is detached or purged.
//! Orphans are never removed automatically.

use crate::Database;
use crate::error::{ErrorKind, Result, WriteResultExt};
use crate::models::{Orphan, OrphanRow, Paging};
use exn::ResultExt;
use sqlx::SqlitePool;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct OrphanCollector {
    pool: SqlitePool,
    dry_run: bool,
}
impl From<&Database> for OrphanCollector {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), dry_run: false }
    }
}
impl OrphanCollector {
    /// Create a collector with the given connection pool. In `dry_run` mode
    /// every check runs but nothing is deleted.
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    /// List orphaned file revisions, ordered by file then revision.
    pub async fn find(&self, paging: Paging) -> Result<Vec<Orphan>> {
        let rows: Vec<OrphanRow> = sqlx::query_as(include_str!("../queries/list_orphans.sql"))
            .bind(paging.limit())
            .bind(paging.offset())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Orphan::try_from).collect()
    }

    /// Delete one orphaned file revision.
    ///
    /// Returns [`ErrorKind::FileRevisionNotFound`] if it doesn't exist and
    /// [`ErrorKind::Invariant`] if any page revision, live or archived, still
    /// links to it.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn purge(&self, file_id: i64, revision: u32) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let exists: bool = sqlx::query_scalar(include_str!("../queries/file_revision_exists.sql"))
            .bind(file_id)
            .bind(i64::from(revision))
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if !exists {
            exn::bail!(ErrorKind::FileRevisionNotFound { file_id, revision });
        }
        let referenced: bool = sqlx::query_scalar(include_str!("../queries/file_revision_referenced.sql"))
            .bind(file_id)
            .bind(i64::from(revision))
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if referenced {
            exn::bail!(ErrorKind::Invariant("file revision is still attached to a page revision"));
        }
        if self.dry_run {
            info!("would purge orphaned file revision");
            return Ok(());
        }
        sqlx::query(include_str!("../queries/delete_file_revision.sql"))
            .bind(file_id)
            .bind(i64::from(revision))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        tx.commit().await.or_classify(ErrorKind::Conflict)?;
        info!("purged orphaned file revision");
        Ok(())
    }

    /// Delete every orphaned file revision in a single statement, returning
    /// how many were (or in dry-run mode, would be) deleted.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn purge_all(&self) -> Result<u64> {
        if self.dry_run {
            let count: i64 = sqlx::query_scalar(include_str!("../queries/count_orphans.sql"))
                .fetch_one(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
            let count = u64::try_from(count).or_raise(|| ErrorKind::InvalidData("orphan count"))?;
            info!(count, "would purge orphaned file revisions");
            return Ok(count);
        }
        let count = sqlx::query(include_str!("../queries/delete_orphans.sql"))
            .execute(&self.pool)
            .await
            .or_classify(ErrorKind::Conflict)?
            .rows_affected();
        info!(count, "purged orphaned file revisions");
        Ok(count)
    }
}
