//! Command handlers. Each one returns the lines to print so it can be
//! exercised without a terminal.

use crate::cli::{ArchiveCommand, Command, OrphanCommand};
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use folio_store::models::Page;
use folio_store::{Archive, AttachmentStore, Database, OrphanCollector, PageStore, navigation};
use time::UtcDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;

pub struct Context<'a> {
    pub db: &'a Database,
    pub dry_run: bool,
}

#[instrument(skip_all)]
pub async fn run(ctx: &Context<'_>, command: Command) -> Result<Vec<String>> {
    match command {
        Command::History { page, paging } => history(ctx, &page, paging.into()).await,
        Command::Attachments { page, revision } => attachments(ctx, &page, revision).await,
        Command::Orphans { command } => orphans(ctx, command).await,
        Command::Archive { command } => archive(ctx, command).await,
    }
}

fn timestamp(at: UtcDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

async fn live_page(ctx: &Context<'_>, name: &str) -> Result<Page> {
    let key = navigation::page_key(name).or_raise(|| ErrorKind::Usage(format!("not a valid page name: {name}")))?;
    PageStore::from(ctx.db)
        .get_by_navigation(&key)
        .await
        .or_raise(|| ErrorKind::Store)?
        .ok_or_raise(|| ErrorKind::Usage(format!("no live page at {key}")))
}

async fn history(ctx: &Context<'_>, name: &str, paging: folio_store::models::Paging) -> Result<Vec<String>> {
    let page = live_page(ctx, name).await?;
    let revisions = PageStore::from(ctx.db).list_revisions(page.id, paging).await.or_raise(|| ErrorKind::Store)?;
    Ok(revisions
        .into_iter()
        .map(|r| {
            let marker = if r.revision == page.current_revision { "*" } else { " " };
            format!(
                "{marker}{:>5}  {}  {:<16} {}  {}",
                r.revision,
                timestamp(r.modified_at),
                r.modified_by,
                r.fingerprint,
                r.change_summary
            )
        })
        .collect())
}

async fn attachments(ctx: &Context<'_>, name: &str, revision: Option<u32>) -> Result<Vec<String>> {
    let page = live_page(ctx, name).await?;
    let listed = AttachmentStore::from(ctx.db).list(page.id, revision).await.or_raise(|| ErrorKind::Store)?;
    Ok(listed
        .into_iter()
        .map(|a| {
            format!(
                "{:<32} r{:<4} {:>10}  {:<24} {}",
                a.file.navigation, a.revision.revision, a.revision.size, a.revision.content_type, a.revision.fingerprint
            )
        })
        .collect())
}

async fn orphans(ctx: &Context<'_>, command: OrphanCommand) -> Result<Vec<String>> {
    let collector = OrphanCollector::new(ctx.db.pool().clone(), ctx.dry_run);
    let verb = if ctx.dry_run { "would purge" } else { "purged" };
    match command {
        OrphanCommand::List { paging } => {
            let found = collector.find(paging.into()).await.or_raise(|| ErrorKind::Store)?;
            Ok(found
                .into_iter()
                .map(|o| {
                    format!(
                        "{:>6} r{:<4} page {:<6} {:<32} {:>10}  {}",
                        o.file.id,
                        o.revision.revision,
                        o.file.page_id,
                        o.file.navigation,
                        o.revision.size,
                        timestamp(o.revision.uploaded_at)
                    )
                })
                .collect())
        },
        OrphanCommand::Purge { file_id: Some(file_id), revision: Some(revision) } => {
            collector.purge(file_id, revision).await.or_raise(|| ErrorKind::Store)?;
            Ok(vec![format!("{verb} revision {revision} of file {file_id}")])
        },
        OrphanCommand::Purge { .. } => {
            let count = collector.purge_all().await.or_raise(|| ErrorKind::Store)?;
            Ok(vec![format!("{verb} {count} orphaned file revisions")])
        },
    }
}

async fn archive(ctx: &Context<'_>, command: ArchiveCommand) -> Result<Vec<String>> {
    let archive = Archive::from(ctx.db);
    match command {
        ArchiveCommand::List { paging } => {
            let deleted = archive.list_deleted(paging.into()).await.or_raise(|| ErrorKind::Store)?;
            Ok(deleted
                .into_iter()
                .map(|d| {
                    format!(
                        "{:>6}  {:<32} r{:<4} {}  {}",
                        d.page.id,
                        d.page.navigation,
                        d.page.current_revision,
                        timestamp(d.deleted_at),
                        d.deleted_by
                    )
                })
                .collect())
        },
        ArchiveCommand::Restore { id } => {
            let page = archive.restore(id).await.or_raise(|| ErrorKind::Store)?;
            Ok(vec![format!("restored {} at revision {}", page.navigation, page.current_revision)])
        },
        ArchiveCommand::Purge { id } => {
            if ctx.dry_run {
                let deleted = archive.get_deleted(id).await.or_raise(|| ErrorKind::Store)?;
                let Some(deleted) = deleted else {
                    exn::bail!(ErrorKind::Usage(format!("no archived page with id {id}")));
                };
                return Ok(vec![format!("would purge {}", deleted.page.navigation)]);
            }
            archive.purge(id).await.or_raise(|| ErrorKind::Store)?;
            Ok(vec![format!("purged archived page {id}")])
        },
    }
}
