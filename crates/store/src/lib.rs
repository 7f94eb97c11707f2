//! SQLite-backed revision store for wiki pages and their attachments.
//!
//! Every page and every attached file has an immutable revision history.
//! Writers always present the complete desired state; the store decides
//! whether that state differs from what is current (see [`fingerprint`]) and
//! only then allocates a new revision number.
//!
//! # Architecture
//! - [`PageStore`]: the live page record and its append-only revisions.
//! - [`AttachmentStore`]: file identity per page, append-only blob revisions,
//!   and the links recording which blob was attached at which page revision.
//! - [`Archive`]: moves pages and revisions into the `deleted_*` tables and
//!   back, or purges them for good.
//! - [`OrphanCollector`]: finds and deletes blob revisions nothing links to.
//!
//! All of them are cheap handles over the same [`Database`] pool.

mod archive;
mod attachments;
mod db;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod navigation;
mod orphans;
mod pages;

pub use crate::archive::{Archive, DependentRows, PageScopedTable};
pub use crate::attachments::{AttachmentRevision, AttachmentStore};
pub use crate::db::{Database, PoolOptions};
pub use crate::fingerprint::Fingerprint;
pub use crate::orphans::OrphanCollector;
pub use crate::pages::PageStore;
