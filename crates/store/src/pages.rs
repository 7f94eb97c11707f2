//! Live page records and their append-only revision history.

use crate::Database;
use crate::error::{ErrorKind, Result, WriteResultExt};
use crate::fingerprint::Fingerprint;
use crate::models::{Page, PageDraft, PageRevision, PageRevisionRow, PageRow, Paging, Saved};
use crate::navigation;
use exn::{OptionExt, ResultExt};
use sqlx::{SqliteConnection, SqlitePool};
use time::UtcDateTime;
use tracing::{debug, instrument, warn};

/// Store for pages and their revisions.
///
/// # Revisions
///
/// - Every content-changing save allocates the next revision number and
///   writes an immutable [`PageRevision`] snapshot.
/// - A save that changes nothing (same name, description, change summary and
///   body fingerprint as the current revision) still updates the live page
///   record, but allocates no revision.
/// - Attachment links at the previous revision are copied onto each new
///   revision, so files stay attached across unrelated text edits.
#[derive(Debug, Clone)]
pub struct PageStore {
    pool: SqlitePool,
}
impl From<&Database> for PageStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl PageStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Save the desired state of a page, creating it if `draft.id` is `None`.
    ///
    /// Runs in one transaction. Returns [`ErrorKind::Conflict`] if the
    /// draft's expected revision is stale or another writer saved the page
    /// concurrently, and [`ErrorKind::Invariant`] if the page's navigation
    /// key is already taken by another live page.
    #[instrument(skip(self, draft), fields(page_id = ?draft.id, name = %draft.name))]
    pub async fn save(&self, draft: &PageDraft) -> Result<Saved> {
        let navigation = navigation::page_key(&draft.name)?;
        let namespace = navigation::namespace_of(&draft.name);
        let fingerprint = Fingerprint::of(&draft.body);
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;

        let (page_id, previous, changed) = match draft.id {
            None => {
                let inserted = sqlx::query(include_str!("../queries/insert_page.sql"))
                    .bind(&draft.name)
                    .bind(&navigation)
                    .bind(&namespace)
                    .bind(&draft.description)
                    .bind(&draft.modified_by)
                    .bind(now)
                    .bind(&draft.modified_by)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .or_classify(ErrorKind::Invariant("navigation key is already used by another page"))?;
                // A brand-new page always counts as changed.
                (inserted.last_insert_rowid(), 0, true)
            },
            Some(id) => {
                let page = fetch_page(&mut tx, id).await?.ok_or_raise(|| ErrorKind::PageNotFound(id.to_string()))?;
                if draft.expected_revision.is_some_and(|expected| expected != page.current_revision) {
                    warn!(expected = ?draft.expected_revision, found = page.current_revision, "stale page edit");
                    exn::bail!(ErrorKind::Conflict);
                }
                let current = fetch_revision(&mut tx, id, page.current_revision).await?;
                let changed = match current {
                    None => true,
                    Some(current) => {
                        current.name != draft.name
                            || current.description != draft.description
                            || current.change_summary != draft.change_summary
                            || current.fingerprint != fingerprint
                    },
                };
                (id, page.current_revision, changed)
            },
        };

        let revision = if changed { previous + 1 } else { previous };
        let updated = sqlx::query(include_str!("../queries/update_page.sql"))
            .bind(&draft.name)
            .bind(&navigation)
            .bind(&namespace)
            .bind(&draft.description)
            .bind(i64::from(revision))
            .bind(&draft.modified_by)
            .bind(now)
            .bind(page_id)
            .bind(i64::from(previous))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Invariant("navigation key is already used by another page"))?;
        if updated.rows_affected() == 0 {
            exn::bail!(ErrorKind::Conflict);
        }

        if changed {
            sqlx::query(include_str!("../queries/insert_revision.sql"))
                .bind(page_id)
                .bind(i64::from(revision))
                .bind(&draft.name)
                .bind(&namespace)
                .bind(&draft.description)
                .bind(&draft.body)
                .bind(i64::from(fingerprint))
                .bind(&draft.change_summary)
                .bind(&draft.modified_by)
                .bind(now)
                .execute(&mut *tx)
                .await
                // The revision key can only collide if another writer got there first.
                .or_classify(ErrorKind::Conflict)?;
            if previous > 0 {
                let linked = sqlx::query(include_str!("../queries/carry_forward_attachments.sql"))
                    .bind(i64::from(revision))
                    .bind(page_id)
                    .bind(i64::from(previous))
                    .execute(&mut *tx)
                    .await
                    .or_classify(ErrorKind::Conflict)?;
                debug!(page_id, revision, attachments = linked.rows_affected(), "carried attachments forward");
            }
        } else {
            debug!(page_id, revision, "content unchanged; no revision allocated");
        }

        tx.commit().await.or_classify(ErrorKind::Conflict)?;
        Ok(Saved { page_id, revision, changed })
    }

    /// Save the content of an earlier live revision as a new revision.
    ///
    /// Attachments follow the normal save rules: whatever is attached to the
    /// current revision is carried forward, not whatever was attached to the
    /// revision being reverted to.
    #[instrument(skip(self, modified_by))]
    pub async fn revert(&self, page_id: i64, to_revision: u32, modified_by: impl Into<String>) -> Result<Saved> {
        let page = self.get(page_id).await?.ok_or_raise(|| ErrorKind::PageNotFound(page_id.to_string()))?;
        let target = self
            .revision(page_id, Some(to_revision))
            .await?
            .ok_or_raise(|| ErrorKind::RevisionNotFound { page_id, revision: to_revision })?;
        let draft = PageDraft::edit(&target, modified_by)
            .expecting(page.current_revision)
            .with_summary(format!("Reverted to revision {to_revision}"));
        self.save(&draft).await
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Get a live page by id.
    pub async fn get(&self, page_id: i64) -> Result<Option<Page>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        fetch_page(&mut conn, page_id).await
    }

    /// Get a live page by navigation key (see [`navigation::page_key`]).
    pub async fn get_by_navigation(&self, navigation: impl AsRef<str>) -> Result<Option<Page>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        fetch_page_by_navigation(&mut conn, navigation.as_ref()).await
    }

    /// Whether a live page holds the given navigation key.
    pub async fn exists(&self, navigation: impl AsRef<str>) -> Result<bool> {
        Ok(self.get_by_navigation(navigation).await?.is_some())
    }

    /// The current revision number of a live page.
    pub async fn current_revision(&self, page_id: i64) -> Result<Option<u32>> {
        Ok(self.get(page_id).await?.map(|page| page.current_revision))
    }

    /// Get a live revision of a page, or its current revision when `revision`
    /// is `None`.
    pub async fn revision(&self, page_id: i64, revision: Option<u32>) -> Result<Option<PageRevision>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        let revision = match revision {
            Some(revision) => revision,
            None => match fetch_page(&mut conn, page_id).await? {
                Some(page) => page.current_revision,
                None => return Ok(None),
            },
        };
        fetch_revision(&mut conn, page_id, revision).await
    }

    /// The nearest live revision strictly after `after`, if any.
    pub async fn next_revision(&self, page_id: i64, after: u32) -> Result<Option<u32>> {
        self.neighbour(include_str!("../queries/next_revision.sql"), page_id, after).await
    }

    /// The nearest live revision strictly before `before`, if any.
    pub async fn previous_revision(&self, page_id: i64, before: u32) -> Result<Option<u32>> {
        self.neighbour(include_str!("../queries/previous_revision.sql"), page_id, before).await
    }

    async fn neighbour(&self, query: &'static str, page_id: i64, revision: u32) -> Result<Option<u32>> {
        let found: Option<i64> = sqlx::query_scalar(query)
            .bind(page_id)
            .bind(i64::from(revision))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        found.map(crate::models::revision_from_row).transpose()
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// List the live revisions of a page, newest first.
    pub async fn list_revisions(&self, page_id: i64, paging: Paging) -> Result<Vec<PageRevision>> {
        let rows: Vec<PageRevisionRow> = sqlx::query_as(include_str!("../queries/list_revisions.sql"))
            .bind(page_id)
            .bind(paging.limit())
            .bind(paging.offset())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(PageRevision::try_from).collect()
    }
}

pub(crate) async fn fetch_page(conn: &mut SqliteConnection, page_id: i64) -> Result<Option<Page>> {
    let row: Option<PageRow> = sqlx::query_as(include_str!("../queries/get_page.sql"))
        .bind(page_id)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(Page::try_from).transpose()
}

pub(crate) async fn fetch_page_by_navigation(conn: &mut SqliteConnection, navigation: &str) -> Result<Option<Page>> {
    let row: Option<PageRow> = sqlx::query_as(include_str!("../queries/get_page_by_navigation.sql"))
        .bind(navigation)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(Page::try_from).transpose()
}

pub(crate) async fn fetch_revision(
    conn: &mut SqliteConnection,
    page_id: i64,
    revision: u32,
) -> Result<Option<PageRevision>> {
    let row: Option<PageRevisionRow> = sqlx::query_as(include_str!("../queries/get_revision.sql"))
        .bind(page_id)
        .bind(i64::from(revision))
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(PageRevision::try_from).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Database, PageStore) {
        let db = Database::connect_in_memory().await.unwrap();
        let pages = PageStore::from(&db);
        (db, pages)
    }

    async fn count_revisions(db: &Database, page_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM page_revisions WHERE page_id = ?")
            .bind(page_id)
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_page_allocates_first_revision() {
        let (_db, pages) = setup().await;
        let saved = pages.save(&PageDraft::new("Help::Getting Started", "x", "alice")).await.unwrap();
        assert_eq!(saved.revision, 1);
        assert!(saved.changed);
        let page = pages.get(saved.page_id).await.unwrap().unwrap();
        assert_eq!(page.navigation, "help::getting-started");
        assert_eq!(page.namespace, "Help");
        assert_eq!(page.current_revision, 1);
        let revision = pages.revision(saved.page_id, None).await.unwrap().unwrap();
        assert_eq!(revision.body, "x");
        assert_eq!(revision.fingerprint, Fingerprint::of("x"));
    }

    #[tokio::test]
    async fn test_identical_save_is_a_no_op() {
        let (db, pages) = setup().await;
        let created = pages.save(&PageDraft::new("A", "x", "alice")).await.unwrap();
        let draft = PageDraft::new("A", "y", "alice").for_page(created.page_id);
        let first = pages.save(&draft).await.unwrap();
        let second = pages.save(&draft.clone().with_name("A")).await.unwrap();
        assert_eq!((first.revision, first.changed), (2, true));
        assert_eq!((second.revision, second.changed), (2, false));
        assert_eq!(count_revisions(&db, created.page_id).await, 2);
    }

    #[tokio::test]
    async fn test_no_op_save_still_updates_modifier() {
        let (_db, pages) = setup().await;
        let created = pages.save(&PageDraft::new("A", "x", "alice")).await.unwrap();
        pages.save(&PageDraft::new("A", "x", "bob").for_page(created.page_id)).await.unwrap();
        let page = pages.get(created.page_id).await.unwrap().unwrap();
        assert_eq!(page.modified_by, "bob");
        assert_eq!(page.created_by, "alice");
        assert_eq!(page.current_revision, 1);
    }

    #[tokio::test]
    async fn test_metadata_changes_allocate_revisions() {
        let (_db, pages) = setup().await;
        let created = pages.save(&PageDraft::new("A", "x", "alice")).await.unwrap();
        let base = PageDraft::new("A", "x", "alice").for_page(created.page_id);
        let described = pages.save(&base.clone().with_description("about A")).await.unwrap();
        let summarised = pages.save(&base.clone().with_description("about A").with_summary("why")).await.unwrap();
        let renamed = pages.save(&base.with_description("about A").with_summary("why").with_name("B")).await.unwrap();
        assert_eq!([described.revision, summarised.revision, renamed.revision], [2, 3, 4]);
        let page = pages.get(created.page_id).await.unwrap().unwrap();
        assert_eq!(page.navigation, "b");
        assert!(!pages.exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_expected_revision_conflicts() {
        let (db, pages) = setup().await;
        let created = pages.save(&PageDraft::new("A", "x", "alice")).await.unwrap();
        let current = pages.revision(created.page_id, None).await.unwrap().unwrap();
        pages.save(&PageDraft::edit(&current, "alice").with_body("y")).await.unwrap();
        let err = pages.save(&PageDraft::edit(&current, "bob").with_body("z")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Conflict);
        assert!(err.is_retryable());
        assert_eq!(count_revisions(&db, created.page_id).await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_navigation_is_rejected() {
        let (_db, pages) = setup().await;
        pages.save(&PageDraft::new("Getting Started", "x", "alice")).await.unwrap();
        let err = pages.save(&PageDraft::new("getting started", "y", "bob")).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Invariant(_)));
    }

    #[tokio::test]
    async fn test_save_unknown_page_is_not_found() {
        let (_db, pages) = setup().await;
        let err = pages.save(&PageDraft::new("A", "x", "alice").for_page(404)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_revision_navigation() {
        let (_db, pages) = setup().await;
        let created = pages.save(&PageDraft::new("A", "1", "alice")).await.unwrap();
        for body in ["2", "3"] {
            pages.save(&PageDraft::new("A", body, "alice").for_page(created.page_id)).await.unwrap();
        }
        let id = created.page_id;
        assert_eq!(pages.next_revision(id, 1).await.unwrap(), Some(2));
        assert_eq!(pages.next_revision(id, 3).await.unwrap(), None);
        assert_eq!(pages.previous_revision(id, 3).await.unwrap(), Some(2));
        assert_eq!(pages.previous_revision(id, 1).await.unwrap(), None);
        assert_eq!(pages.current_revision(id).await.unwrap(), Some(3));
        assert_eq!(pages.current_revision(999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_revisions_newest_first() {
        let (_db, pages) = setup().await;
        let created = pages.save(&PageDraft::new("A", "1", "alice")).await.unwrap();
        for body in ["2", "3", "4"] {
            pages.save(&PageDraft::new("A", body, "alice").for_page(created.page_id)).await.unwrap();
        }
        let listed = pages.list_revisions(created.page_id, Paging::new(1, 2)).await.unwrap();
        let numbers = listed.iter().map(|r| r.revision).collect::<Vec<_>>();
        assert_eq!(numbers, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_revert_restores_old_content_as_new_revision() {
        let (_db, pages) = setup().await;
        let created = pages.save(&PageDraft::new("A", "x", "alice")).await.unwrap();
        pages.save(&PageDraft::new("A", "y", "alice").for_page(created.page_id)).await.unwrap();
        let reverted = pages.revert(created.page_id, 1, "bob").await.unwrap();
        assert_eq!((reverted.revision, reverted.changed), (3, true));
        let revision = pages.revision(created.page_id, None).await.unwrap().unwrap();
        assert_eq!(revision.body, "x");
        assert_eq!(revision.change_summary, "Reverted to revision 1");
        assert_eq!(revision.modified_by, "bob");
    }

    #[tokio::test]
    async fn test_revert_to_missing_revision() {
        let (_db, pages) = setup().await;
        let created = pages.save(&PageDraft::new("A", "x", "alice")).await.unwrap();
        let err = pages.revert(created.page_id, 7, "bob").await.unwrap_err();
        assert_eq!(*err, ErrorKind::RevisionNotFound { page_id: created.page_id, revision: 7 });
    }
}
