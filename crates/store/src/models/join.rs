//! Rows selected from `page_files JOIN page_file_revisions`, optionally
//! joined further with the attachment link table.
//!
//! **Important**: flattened rows share one column namespace, which is why the
//! revision table uses `uploaded_by`/`uploaded_at` rather than repeating the
//! file table's `created_at`.

use crate::error::Error;
use crate::models::{FileRevisionInfo, FileRevisionRow, PageFile, PageFileRow, revision_from_row};

/// A file revision as seen through a specific page revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub file: PageFile,
    pub revision: FileRevisionInfo,
    pub page_revision: u32,
}

/// A file revision including its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file: PageFile,
    pub revision: FileRevisionInfo,
    /// The page revision the attachment was resolved through, or `None` when
    /// it was requested by explicit file revision.
    pub page_revision: Option<u32>,
    pub data: Vec<u8>,
}

/// A file revision that no attachment link references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    pub file: PageFile,
    pub revision: FileRevisionInfo,
}

#[derive(sqlx::FromRow)]
pub(crate) struct AttachmentInfoRow {
    #[sqlx(flatten)]
    pub(crate) file: PageFileRow,
    #[sqlx(flatten)]
    pub(crate) revision: FileRevisionRow,
    pub(crate) page_revision: i64,
}
impl TryFrom<AttachmentInfoRow> for AttachmentInfo {
    type Error = Error;
    fn try_from(row: AttachmentInfoRow) -> Result<Self, Self::Error> {
        Ok(Self {
            file: row.file.try_into()?,
            revision: row.revision.try_into()?,
            page_revision: revision_from_row(row.page_revision)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AttachmentRow {
    #[sqlx(flatten)]
    pub(crate) file: PageFileRow,
    #[sqlx(flatten)]
    pub(crate) revision: FileRevisionRow,
    pub(crate) page_revision: Option<i64>,
    pub(crate) data: Vec<u8>,
}
impl TryFrom<AttachmentRow> for Attachment {
    type Error = Error;
    fn try_from(row: AttachmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            file: row.file.try_into()?,
            revision: row.revision.try_into()?,
            page_revision: row.page_revision.map(revision_from_row).transpose()?,
            data: row.data,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct OrphanRow {
    #[sqlx(flatten)]
    pub(crate) file: PageFileRow,
    #[sqlx(flatten)]
    pub(crate) revision: FileRevisionRow,
}
impl TryFrom<OrphanRow> for Orphan {
    type Error = Error;
    fn try_from(row: OrphanRow) -> Result<Self, Self::Error> {
        Ok(Self {
            file: row.file.try_into()?,
            revision: row.revision.try_into()?,
        })
    }
}
