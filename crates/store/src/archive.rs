//! Moving pages and page revisions between the live and archived tables.
//!
//! A page is `Live -> Archived -> {Live, gone}`. Archiving copies the rows
//! into the `deleted_*` shadow tables and deletes the originals in the same
//! transaction, so a row is never visible in both places.
//!
//! Attachment links are left alone when archiving. They only disappear when
//! the archived rows they belong to are purged, which keeps every blob a
//! restorable revision needs out of reach of the
//! [`OrphanCollector`](crate::OrphanCollector).

use crate::Database;
use crate::error::{ErrorKind, Result, WriteResultExt};
use crate::models::{DeletedPage, DeletedPageRow, DeletedRevision, DeletedRevisionRow, Page, PageRevision, Paging};
use crate::pages::{fetch_page, fetch_revision};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use sqlx::{SqliteConnection, SqlitePool};
use std::fmt;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::{debug, info, instrument, warn};

/// Live metadata owned by something outside this crate (tags, comments,
/// search tokens) that must go away when its page is archived.
///
/// Implementations run inside the archiving transaction; returning an error
/// rolls the whole archive back.
#[async_trait]
pub trait DependentRows: Send + Sync {
    /// Name used for logging only.
    fn name(&self) -> &str;

    /// Remove every row belonging to the page, returning how many went.
    async fn remove(&self, conn: &mut SqliteConnection, page_id: i64) -> Result<u64>;
}

/// A table with a column holding the page id, cleared with a single `DELETE`.
#[derive(Debug, Clone)]
pub struct PageScopedTable {
    table: String,
    statement: String,
}
impl PageScopedTable {
    /// Both names are spliced into SQL, so they are restricted to plain
    /// identifiers.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Result<Self> {
        let (table, column) = (table.into(), column.into());
        if !is_identifier(&table) || !is_identifier(&column) {
            exn::bail!(ErrorKind::Invariant("dependent table and column must be plain identifiers"));
        }
        let statement = format!("DELETE FROM {table} WHERE {column} = ?");
        Ok(Self { table, statement })
    }
}

#[async_trait]
impl DependentRows for PageScopedTable {
    fn name(&self) -> &str {
        &self.table
    }

    async fn remove(&self, conn: &mut SqliteConnection, page_id: i64) -> Result<u64> {
        let result = sqlx::query(&self.statement)
            .bind(page_id)
            .execute(&mut *conn)
            .await
            .or_classify(ErrorKind::Conflict)?;
        Ok(result.rows_affected())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The deletion archive.
#[derive(Clone)]
pub struct Archive {
    pool: SqlitePool,
    dependents: Vec<Arc<dyn DependentRows>>,
}
impl From<&Database> for Archive {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.dependents.iter().map(|d| d.name()).collect();
        f.debug_struct("Archive").field("dependents", &names).finish_non_exhaustive()
    }
}
impl Archive {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, dependents: Vec::new() }
    }

    /// Register metadata to remove whenever a page is archived.
    pub fn with_dependent(mut self, dependent: impl DependentRows + 'static) -> Self {
        self.dependents.push(Arc::new(dependent));
        self
    }

    // =========================================================================
    // Pages
    // =========================================================================

    /// Archive a live page together with all of its live revisions.
    ///
    /// Dependent metadata registered with [`with_dependent`](Self::with_dependent)
    /// is removed in the same transaction.
    #[instrument(skip(self, deleted_by))]
    pub async fn move_to_deleted(&self, page_id: i64, deleted_by: &str) -> Result<()> {
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let page = fetch_page(&mut tx, page_id).await?.ok_or_raise(|| ErrorKind::PageNotFound(page_id.to_string()))?;

        sqlx::query(include_str!("../queries/archive_page.sql"))
            .bind(deleted_by)
            .bind(now)
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        let revisions = sqlx::query(include_str!("../queries/archive_page_revisions.sql"))
            .bind(deleted_by)
            .bind(now)
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?
            .rows_affected();
        sqlx::query(include_str!("../queries/delete_page_revisions.sql"))
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        sqlx::query(include_str!("../queries/delete_page.sql"))
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        for dependent in &self.dependents {
            let removed = dependent.remove(&mut tx, page_id).await?;
            debug!(dependent = dependent.name(), removed, "removed dependent rows");
        }
        tx.commit().await.or_classify(ErrorKind::Conflict)?;

        info!(navigation = %page.navigation, revisions, "archived page");
        Ok(())
    }

    /// Bring an archived page back under its original id, with the revisions
    /// that were archived along with it.
    ///
    /// Fails with [`ErrorKind::Invariant`] when a live page has since taken
    /// the same navigation key, or when the page's current revision is no
    /// longer in the archive.
    #[instrument(skip(self))]
    pub async fn restore(&self, page_id: i64) -> Result<Page> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let deleted =
            fetch_deleted(&mut tx, page_id).await?.ok_or_raise(|| ErrorKind::ArchivedPageNotFound(page_id))?;

        sqlx::query(include_str!("../queries/restore_page.sql"))
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Invariant("a live page already uses this navigation key"))?;
        let revisions = sqlx::query(include_str!("../queries/restore_page_revisions.sql"))
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?
            .rows_affected();
        let current = deleted.page.current_revision;
        if fetch_revision(&mut tx, page_id, current).await?.is_none() {
            warn!(current, "archived page is missing its current revision");
            exn::bail!(ErrorKind::Invariant("archived page no longer has its current revision"));
        }
        sqlx::query(include_str!("../queries/delete_deleted_page_revisions.sql"))
            .bind(page_id)
            .bind(Some(1_i64))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        sqlx::query(include_str!("../queries/delete_deleted_page.sql"))
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        tx.commit().await.or_classify(ErrorKind::Conflict)?;

        info!(navigation = %deleted.page.navigation, revisions, "restored page");
        Ok(deleted.page)
    }

    /// Permanently delete an archived page, every archived revision of it,
    /// and all of its attachments.
    #[instrument(skip(self))]
    pub async fn purge(&self, page_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let removed = sqlx::query(include_str!("../queries/delete_deleted_page.sql"))
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?
            .rows_affected();
        if removed == 0 {
            exn::bail!(ErrorKind::ArchivedPageNotFound(page_id));
        }
        let revisions = sqlx::query(include_str!("../queries/delete_deleted_page_revisions.sql"))
            .bind(page_id)
            .bind(None::<i64>)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?
            .rows_affected();
        // Links reference file revisions without cascading, so they go first.
        sqlx::query(include_str!("../queries/delete_page_attachment_links.sql"))
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        let files = sqlx::query(include_str!("../queries/delete_page_files.sql"))
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?
            .rows_affected();
        tx.commit().await.or_classify(ErrorKind::Conflict)?;

        info!(revisions, files, "purged archived page");
        Ok(())
    }

    // =========================================================================
    // Revisions
    // =========================================================================

    /// Archive a single revision of a live page.
    ///
    /// The current revision can't be archived: the page would be left
    /// pointing at a revision that isn't live.
    #[instrument(skip(self, deleted_by))]
    pub async fn move_revision_to_deleted(&self, page_id: i64, revision: u32, deleted_by: &str) -> Result<()> {
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let page = fetch_page(&mut tx, page_id).await?.ok_or_raise(|| ErrorKind::PageNotFound(page_id.to_string()))?;
        if revision == page.current_revision {
            exn::bail!(ErrorKind::Invariant("cannot archive the current revision"));
        }
        fetch_revision(&mut tx, page_id, revision)
            .await?
            .ok_or_raise(|| ErrorKind::RevisionNotFound { page_id, revision })?;

        sqlx::query(include_str!("../queries/archive_revision.sql"))
            .bind(deleted_by)
            .bind(now)
            .bind(page_id)
            .bind(i64::from(revision))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        sqlx::query(include_str!("../queries/delete_revision.sql"))
            .bind(page_id)
            .bind(i64::from(revision))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        tx.commit().await.or_classify(ErrorKind::Conflict)?;

        info!(revision, "archived revision");
        Ok(())
    }

    /// Return an archived revision to its live page.
    #[instrument(skip(self))]
    pub async fn restore_revision(&self, page_id: i64, revision: u32) -> Result<PageRevision> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        fetch_page(&mut tx, page_id).await?.ok_or_raise(|| ErrorKind::PageNotFound(page_id.to_string()))?;
        let deleted = fetch_deleted_revision(&mut tx, page_id, revision)
            .await?
            .ok_or_raise(|| ErrorKind::ArchivedRevisionNotFound { page_id, revision })?;

        sqlx::query(include_str!("../queries/restore_revision.sql"))
            .bind(page_id)
            .bind(i64::from(revision))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        sqlx::query(include_str!("../queries/delete_deleted_revision.sql"))
            .bind(page_id)
            .bind(i64::from(revision))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        tx.commit().await.or_classify(ErrorKind::Conflict)?;

        info!(revision, "restored revision");
        Ok(deleted.revision)
    }

    /// Permanently delete an archived revision and its attachment links.
    ///
    /// The current revision of an archived page can only go with the page
    /// itself (see [`purge`](Self::purge)); a restored page must find it.
    #[instrument(skip(self))]
    pub async fn purge_revision(&self, page_id: i64, revision: u32) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let deleted = fetch_deleted_revision(&mut tx, page_id, revision)
            .await?
            .ok_or_raise(|| ErrorKind::ArchivedRevisionNotFound { page_id, revision })?;
        if deleted.archived_with_page
            && let Some(page) = fetch_deleted(&mut tx, page_id).await?
            && page.page.current_revision == revision
        {
            exn::bail!(ErrorKind::Invariant("cannot purge the current revision of an archived page"));
        }
        sqlx::query(include_str!("../queries/delete_deleted_revision.sql"))
            .bind(page_id)
            .bind(i64::from(revision))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        let links = sqlx::query(include_str!("../queries/delete_revision_attachment_links.sql"))
            .bind(page_id)
            .bind(i64::from(revision))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?
            .rows_affected();
        tx.commit().await.or_classify(ErrorKind::Conflict)?;

        info!(revision, links, "purged archived revision");
        Ok(())
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// List archived pages, most recently archived first.
    pub async fn list_deleted(&self, paging: Paging) -> Result<Vec<DeletedPage>> {
        let rows: Vec<DeletedPageRow> = sqlx::query_as(include_str!("../queries/list_deleted_pages.sql"))
            .bind(paging.limit())
            .bind(paging.offset())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(DeletedPage::try_from).collect()
    }

    pub async fn get_deleted(&self, page_id: i64) -> Result<Option<DeletedPage>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        fetch_deleted(&mut conn, page_id).await
    }

    /// Every archived revision of a page, newest first, whether the page
    /// itself is live or archived.
    pub async fn list_deleted_revisions(&self, page_id: i64) -> Result<Vec<DeletedRevision>> {
        let rows: Vec<DeletedRevisionRow> = sqlx::query_as(include_str!("../queries/list_deleted_revisions.sql"))
            .bind(page_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(DeletedRevision::try_from).collect()
    }
}

async fn fetch_deleted(conn: &mut SqliteConnection, page_id: i64) -> Result<Option<DeletedPage>> {
    let row: Option<DeletedPageRow> = sqlx::query_as(include_str!("../queries/get_deleted_page.sql"))
        .bind(page_id)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(DeletedPage::try_from).transpose()
}

async fn fetch_deleted_revision(
    conn: &mut SqliteConnection,
    page_id: i64,
    revision: u32,
) -> Result<Option<DeletedRevision>> {
    let row: Option<DeletedRevisionRow> = sqlx::query_as(include_str!("../queries/get_deleted_revision.sql"))
        .bind(page_id)
        .bind(i64::from(revision))
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(DeletedRevision::try_from).transpose()
}
