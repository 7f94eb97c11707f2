use crate::error::{Error, ErrorKind};
use crate::fingerprint::Fingerprint;
use crate::models::{revision_from_row, timestamp_from_row};
use exn::ResultExt;
use time::UtcDateTime;

/// The live pointer record of a wiki page.
///
/// Mutated in place on every save. `current_revision` always equals the
/// highest live [`PageRevision`] number for the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: i64,
    pub name: String,
    pub navigation: String,
    pub namespace: String,
    pub description: String,
    pub current_revision: u32,
    pub created_by: String,
    pub created_at: UtcDateTime,
    pub modified_by: String,
    pub modified_at: UtcDateTime,
}

/// An immutable snapshot of a page, keyed by `(page_id, revision)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRevision {
    pub page_id: i64,
    pub revision: u32,
    pub name: String,
    pub namespace: String,
    pub description: String,
    pub body: String,
    pub fingerprint: Fingerprint,
    pub change_summary: String,
    pub modified_by: String,
    pub modified_at: UtcDateTime,
}

/// The complete desired state of a page, as presented by an editor.
///
/// Namespace and navigation key are derived from `name`; they are not
/// supplied directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDraft {
    /// `None` creates a new page.
    pub id: Option<i64>,
    /// The revision the editor started from. When set, the save fails with a
    /// conflict if somebody else has saved the page since.
    pub expected_revision: Option<u32>,
    pub name: String,
    pub description: String,
    pub body: String,
    pub change_summary: String,
    pub modified_by: String,
}
impl PageDraft {
    /// Draft for a brand-new page.
    pub fn new(name: impl Into<String>, body: impl Into<String>, modified_by: impl Into<String>) -> Self {
        Self {
            id: None,
            expected_revision: None,
            name: name.into(),
            description: String::new(),
            body: body.into(),
            change_summary: String::new(),
            modified_by: modified_by.into(),
        }
    }

    /// Draft for an edit of an existing page, prefilled from its current
    /// revision.
    pub fn edit(revision: &PageRevision, modified_by: impl Into<String>) -> Self {
        Self {
            id: Some(revision.page_id),
            expected_revision: Some(revision.revision),
            name: revision.name.clone(),
            description: revision.description.clone(),
            body: revision.body.clone(),
            change_summary: revision.change_summary.clone(),
            modified_by: modified_by.into(),
        }
    }

    pub fn for_page(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn expecting(mut self, revision: u32) -> Self {
        self.expected_revision = Some(revision);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_summary(mut self, change_summary: impl Into<String>) -> Self {
        self.change_summary = change_summary.into();
        self
    }
}

/// Outcome of [`PageStore::save`](crate::PageStore::save).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Saved {
    pub page_id: i64,
    /// The page's current revision after the save.
    pub revision: u32,
    /// Whether a new revision was written.
    pub changed: bool,
}

#[derive(sqlx::FromRow)]
pub(crate) struct PageRow {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) navigation: String,
    pub(crate) namespace: String,
    pub(crate) description: String,
    pub(crate) current_revision: i64,
    pub(crate) created_by: String,
    pub(crate) created_at: i64,
    pub(crate) modified_by: String,
    pub(crate) modified_at: i64,
}
impl TryFrom<PageRow> for Page {
    type Error = Error;
    fn try_from(row: PageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            navigation: row.navigation,
            namespace: row.namespace,
            description: row.description,
            current_revision: revision_from_row(row.current_revision)?,
            created_by: row.created_by,
            created_at: timestamp_from_row(row.created_at, "page creation date")?,
            modified_by: row.modified_by,
            modified_at: timestamp_from_row(row.modified_at, "page modification date")?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PageRevisionRow {
    pub(crate) page_id: i64,
    pub(crate) revision: i64,
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) description: String,
    pub(crate) body: String,
    pub(crate) fingerprint: i64,
    pub(crate) change_summary: String,
    pub(crate) modified_by: String,
    pub(crate) modified_at: i64,
}
impl TryFrom<PageRevisionRow> for PageRevision {
    type Error = Error;
    fn try_from(row: PageRevisionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            page_id: row.page_id,
            revision: revision_from_row(row.revision)?,
            name: row.name,
            namespace: row.namespace,
            description: row.description,
            body: row.body,
            fingerprint: u32::try_from(row.fingerprint)
                .or_raise(|| ErrorKind::InvalidData("page fingerprint"))?
                .into(),
            change_summary: row.change_summary,
            modified_by: row.modified_by,
            modified_at: timestamp_from_row(row.modified_at, "revision modification date")?,
        })
    }
}
