use crate::error::{Error, ErrorKind};
use crate::fingerprint::Fingerprint;
use crate::models::{revision_from_row, size_from_row, timestamp_from_row};
use exn::ResultExt;
use time::UtcDateTime;

/// Identity of an attachment on a page: one per distinct file name,
/// regardless of how many times its bytes have changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    pub id: i64,
    pub page_id: i64,
    pub name: String,
    pub navigation: String,
    pub current_revision: u32,
    pub created_at: UtcDateTime,
}

/// Metadata of one immutable blob revision of a [`PageFile`], without the
/// blob itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRevisionInfo {
    pub file_id: i64,
    pub revision: u32,
    pub content_type: String,
    pub size: u64,
    pub fingerprint: Fingerprint,
    pub uploaded_by: String,
    pub uploaded_at: UtcDateTime,
}

/// The complete desired state of an attachment, as presented by an uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub uploaded_by: String,
}
impl FileUpload {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
        uploaded_by: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
            uploaded_by: uploaded_by.into(),
        }
    }
}

/// Outcome of [`AttachmentStore::upsert`](crate::AttachmentStore::upsert).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted {
    pub file_id: i64,
    /// The file revision attached to the page's current revision after the
    /// upsert.
    pub file_revision: u32,
    /// Whether a new file revision was written.
    pub changed: bool,
}

#[derive(sqlx::FromRow)]
pub(crate) struct PageFileRow {
    pub(crate) id: i64,
    pub(crate) page_id: i64,
    pub(crate) name: String,
    pub(crate) navigation: String,
    pub(crate) current_revision: i64,
    pub(crate) created_at: i64,
}
impl TryFrom<PageFileRow> for PageFile {
    type Error = Error;
    fn try_from(row: PageFileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            page_id: row.page_id,
            name: row.name,
            navigation: row.navigation,
            current_revision: revision_from_row(row.current_revision)?,
            created_at: timestamp_from_row(row.created_at, "file creation date")?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRevisionRow {
    pub(crate) page_file_id: i64,
    pub(crate) revision: i64,
    pub(crate) content_type: String,
    pub(crate) size: i64,
    pub(crate) fingerprint: i64,
    pub(crate) uploaded_by: String,
    pub(crate) uploaded_at: i64,
}
impl TryFrom<FileRevisionRow> for FileRevisionInfo {
    type Error = Error;
    fn try_from(row: FileRevisionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            file_id: row.page_file_id,
            revision: revision_from_row(row.revision)?,
            content_type: row.content_type,
            size: size_from_row(row.size)?,
            fingerprint: u32::try_from(row.fingerprint)
                .or_raise(|| ErrorKind::InvalidData("file fingerprint"))?
                .into(),
            uploaded_by: row.uploaded_by,
            uploaded_at: timestamp_from_row(row.uploaded_at, "upload date")?,
        })
    }
}
