use crate::error::Error;
use crate::models::{Page, PageRevision, PageRevisionRow, PageRow, timestamp_from_row};
use time::UtcDateTime;

/// An archived page, restorable under its original id until purged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedPage {
    pub page: Page,
    pub deleted_by: String,
    pub deleted_at: UtcDateTime,
}

/// An archived page revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRevision {
    pub revision: PageRevision,
    pub deleted_by: String,
    pub deleted_at: UtcDateTime,
    /// `true` when the revision was archived because its whole page was, in
    /// which case restoring the page restores it too.
    pub archived_with_page: bool,
}

#[derive(sqlx::FromRow)]
pub(crate) struct DeletedPageRow {
    #[sqlx(flatten)]
    pub(crate) page: PageRow,
    pub(crate) deleted_by: String,
    pub(crate) deleted_at: i64,
}
impl TryFrom<DeletedPageRow> for DeletedPage {
    type Error = Error;
    fn try_from(row: DeletedPageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            page: row.page.try_into()?,
            deleted_by: row.deleted_by,
            deleted_at: timestamp_from_row(row.deleted_at, "deletion date")?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DeletedRevisionRow {
    #[sqlx(flatten)]
    pub(crate) revision: PageRevisionRow,
    pub(crate) deleted_by: String,
    pub(crate) deleted_at: i64,
    pub(crate) archived_with_page: bool,
}
impl TryFrom<DeletedRevisionRow> for DeletedRevision {
    type Error = Error;
    fn try_from(row: DeletedRevisionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            revision: row.revision.try_into()?,
            deleted_by: row.deleted_by,
            deleted_at: timestamp_from_row(row.deleted_at, "deletion date")?,
            archived_with_page: row.archived_with_page,
        })
    }
}
