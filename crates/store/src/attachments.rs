//! Attachment identity, blob revision history, and the links binding file
//! revisions to page revisions.

use crate::Database;
use crate::error::{ErrorKind, Result, WriteResultExt};
use crate::fingerprint::Fingerprint;
use crate::models::{
    Attachment, AttachmentInfo, AttachmentInfoRow, AttachmentRow, FileRevisionInfo, FileRevisionRow, FileUpload,
    PageFile, PageFileRow, Upserted,
};
use crate::navigation;
use crate::pages::{fetch_page, fetch_page_by_navigation};
use exn::{OptionExt, ResultExt};
use sqlx::{SqliteConnection, SqlitePool};
use time::UtcDateTime;
use tracing::{debug, instrument};

/// Which revision of an attachment to resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttachmentRevision {
    /// Whatever is attached to the page's current revision.
    #[default]
    Current,
    /// Whatever was attached when the given page revision was current.
    PageRevision(u32),
    /// A specific file revision, whether or not any page revision links it.
    FileRevision(u32),
}

/// Store for page attachments.
///
/// # Relationships
///
/// - A [`PageFile`] exists once per distinct file name per page.
/// - Each upload with different bytes appends an immutable file revision.
/// - A link row records which file revision was attached while a given page
///   revision was current. There is at most one link per (page, file, page
///   revision).
/// - Uploading never allocates a page revision; it replaces the link at the
///   page's current revision.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    pool: SqlitePool,
}
impl From<&Database> for AttachmentStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl AttachmentStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Upsert
    // =========================================================================

    /// Attach the desired state of a file to the current revision of a page.
    ///
    /// A new file revision is written when the file is new to the page,
    /// when nothing is attached under its name at the page's current
    /// revision, or when the bytes differ from what is attached there.
    /// Re-uploading identical bytes writes nothing.
    ///
    /// Runs in one transaction. Returns [`ErrorKind::PageNotFound`] if the
    /// page isn't live.
    #[instrument(skip(self, upload), fields(name = %upload.name, size = upload.data.len()))]
    pub async fn upsert(&self, page_id: i64, upload: &FileUpload) -> Result<Upserted> {
        let file_key = navigation::file_key(&upload.name)?;
        let fingerprint = Fingerprint::of(&upload.data);
        let size = i64::try_from(upload.data.len()).or_raise(|| ErrorKind::InvalidData("size"))?;
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;

        let page = fetch_page(&mut tx, page_id).await?.ok_or_raise(|| ErrorKind::PageNotFound(page_id.to_string()))?;
        let page_revision = i64::from(page.current_revision);
        let (file_id, current, created) = match fetch_file(&mut tx, page_id, &file_key).await? {
            Some(file) => (file.id, file.current_revision, false),
            None => {
                let inserted = sqlx::query(include_str!("../queries/insert_file.sql"))
                    .bind(page_id)
                    .bind(&upload.name)
                    .bind(&file_key)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .or_classify(ErrorKind::Conflict)?;
                (inserted.last_insert_rowid(), 0, true)
            },
        };

        let linked: Option<FileRevisionRow> = sqlx::query_as(include_str!("../queries/get_linked_file_revision.sql"))
            .bind(page_id)
            .bind(file_id)
            .bind(page_revision)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let linked = linked.map(FileRevisionInfo::try_from).transpose()?;
        let changed = created || linked.as_ref().is_none_or(|linked| linked.fingerprint != fingerprint);
        if !changed {
            // Dropping the transaction rolls back; nothing was written anyway.
            debug!(file_id, "attachment unchanged; no revision allocated");
            let file_revision = linked.map_or(current, |linked| linked.revision);
            return Ok(Upserted { file_id, file_revision, changed });
        }

        let revision = current + 1;
        let updated = sqlx::query(include_str!("../queries/update_file_revision.sql"))
            .bind(&upload.name)
            .bind(i64::from(revision))
            .bind(file_id)
            .bind(i64::from(current))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        if updated.rows_affected() == 0 {
            exn::bail!(ErrorKind::Conflict);
        }
        sqlx::query(include_str!("../queries/insert_file_revision.sql"))
            .bind(file_id)
            .bind(i64::from(revision))
            .bind(&upload.content_type)
            .bind(size)
            .bind(upload.data.as_slice())
            .bind(i64::from(fingerprint))
            .bind(&upload.uploaded_by)
            .bind(now)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        if linked.is_some() {
            sqlx::query(include_str!("../queries/delete_attachment_link.sql"))
                .bind(page_id)
                .bind(file_id)
                .bind(page_revision)
                .execute(&mut *tx)
                .await
                .or_classify(ErrorKind::Conflict)?;
        }
        sqlx::query(include_str!("../queries/insert_attachment_link.sql"))
            .bind(page_id)
            .bind(file_id)
            .bind(i64::from(revision))
            .bind(page_revision)
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?;
        tx.commit().await.or_classify(ErrorKind::Conflict)?;

        debug!(file_id, revision, page_revision, "attached new file revision");
        Ok(Upserted { file_id, file_revision: revision, changed })
    }

    // =========================================================================
    // Detach
    // =========================================================================

    /// Remove the link between a file and one page revision, leaving the blob
    /// in place. If no other page revision links that file revision it
    /// becomes an orphan.
    ///
    /// Returns the number of links removed.
    #[instrument(skip(self, page_key, file_key), fields(page = page_key.as_ref(), file = file_key.as_ref()))]
    pub async fn detach(
        &self,
        page_key: impl AsRef<str>,
        file_key: impl AsRef<str>,
        page_revision: u32,
    ) -> Result<u64> {
        let (page_key, file_key) = (page_key.as_ref(), file_key.as_ref());
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let page = fetch_page_by_navigation(&mut tx, page_key)
            .await?
            .ok_or_raise(|| ErrorKind::PageNotFound(page_key.to_string()))?;
        let file = fetch_file(&mut tx, page.id, file_key).await?.ok_or_raise(|| ErrorKind::FileNotFound {
            page: page_key.to_string(),
            file: file_key.to_string(),
        })?;
        let removed = sqlx::query(include_str!("../queries/delete_attachment_link.sql"))
            .bind(page.id)
            .bind(file.id)
            .bind(i64::from(page_revision))
            .execute(&mut *tx)
            .await
            .or_classify(ErrorKind::Conflict)?
            .rows_affected();
        tx.commit().await.or_classify(ErrorKind::Conflict)?;
        Ok(removed)
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Get an attachment, including its bytes, by page and file navigation
    /// keys.
    pub async fn get(
        &self,
        page_key: impl AsRef<str>,
        file_key: impl AsRef<str>,
        which: AttachmentRevision,
    ) -> Result<Option<Attachment>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        let Some(page) = fetch_page_by_navigation(&mut conn, page_key.as_ref()).await? else {
            return Ok(None);
        };
        let (query, revision) = match which {
            AttachmentRevision::Current => {
                (include_str!("../queries/get_attachment_at_page_revision.sql"), page.current_revision)
            },
            AttachmentRevision::PageRevision(revision) => {
                (include_str!("../queries/get_attachment_at_page_revision.sql"), revision)
            },
            AttachmentRevision::FileRevision(revision) => {
                (include_str!("../queries/get_attachment_by_file_revision.sql"), revision)
            },
        };
        let row: Option<AttachmentRow> = sqlx::query_as(query)
            .bind(page.id)
            .bind(file_key.as_ref())
            .bind(i64::from(revision))
            .fetch_optional(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Attachment::try_from).transpose()
    }

    /// Whether a page has a file under the given navigation key, attached or
    /// not.
    pub async fn file_exists(&self, page_id: i64, file_key: impl AsRef<str>) -> Result<bool> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        Ok(fetch_file(&mut conn, page_id, file_key.as_ref()).await?.is_some())
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// List the attachments visible at a page revision (`None` for the
    /// page's current revision), ordered by file name.
    pub async fn list(&self, page_id: i64, page_revision: Option<u32>) -> Result<Vec<AttachmentInfo>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        let page_revision = match page_revision {
            Some(revision) => revision,
            None => match fetch_page(&mut conn, page_id).await? {
                Some(page) => page.current_revision,
                None => return Ok(Vec::new()),
            },
        };
        let rows: Vec<AttachmentInfoRow> = sqlx::query_as(include_str!("../queries/list_attachments.sql"))
            .bind(page_id)
            .bind(i64::from(page_revision))
            .fetch_all(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(AttachmentInfo::try_from).collect()
    }

    /// List every stored revision of one attachment, newest first.
    pub async fn history(
        &self,
        page_key: impl AsRef<str>,
        file_key: impl AsRef<str>,
    ) -> Result<Vec<FileRevisionInfo>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        let Some(page) = fetch_page_by_navigation(&mut conn, page_key.as_ref()).await? else {
            return Ok(Vec::new());
        };
        let rows: Vec<FileRevisionRow> = sqlx::query_as(include_str!("../queries/list_file_revisions.sql"))
            .bind(page.id)
            .bind(file_key.as_ref())
            .fetch_all(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileRevisionInfo::try_from).collect()
    }
}

async fn fetch_file(conn: &mut SqliteConnection, page_id: i64, file_key: &str) -> Result<Option<PageFile>> {
    let row: Option<PageFileRow> = sqlx::query_as(include_str!("../queries/get_file_by_navigation.sql"))
        .bind(page_id)
        .bind(file_key)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(PageFile::try_from).transpose()
}
