//! Public model types and the database rows they are converted from.
//!
//! Rows mirror table columns one-to-one using SQLite-friendly types (`i64`
//! for every integer, unix timestamps for dates). Models use the types
//! callers actually want. Conversion is fallible in both directions because
//! SQLite has no unsigned integers.

mod archive;
mod file;
mod join;
mod page;

pub use self::archive::{DeletedPage, DeletedRevision};
pub(crate) use self::archive::{DeletedPageRow, DeletedRevisionRow};
pub use self::file::{FileRevisionInfo, FileUpload, PageFile, Upserted};
pub(crate) use self::file::{FileRevisionRow, PageFileRow};
pub use self::join::{Attachment, AttachmentInfo, Orphan};
pub(crate) use self::join::{AttachmentInfoRow, AttachmentRow, OrphanRow};
pub use self::page::{Page, PageDraft, PageRevision, Saved};
pub(crate) use self::page::{PageRevisionRow, PageRow};

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::UtcDateTime;

/// Offset/limit window for listing operations.
///
/// Passed explicitly to every listing call; there are no global page-size
/// settings inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub offset: u32,
    pub limit: u32,
}
impl Default for Paging {
    fn default() -> Self {
        Self { offset: 0, limit: 100 }
    }
}
impl Paging {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }

    pub(crate) fn offset(&self) -> i64 {
        i64::from(self.offset)
    }

    pub(crate) fn limit(&self) -> i64 {
        i64::from(self.limit)
    }
}

pub(crate) fn revision_from_row(value: i64) -> Result<u32> {
    u32::try_from(value).or_raise(|| ErrorKind::InvalidData("revision"))
}

pub(crate) fn size_from_row(value: i64) -> Result<u64> {
    u64::try_from(value).or_raise(|| ErrorKind::InvalidData("size"))
}

pub(crate) fn timestamp_from_row(value: i64, field: &'static str) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(value).or_raise(|| ErrorKind::InvalidData(field))
}
