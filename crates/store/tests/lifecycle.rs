//! End-to-end walk through a page's life: edits, attachments, archiving and
//! orphan collection, all against one in-memory database.

use folio_store::models::{FileUpload, PageDraft, Paging};
use folio_store::{Archive, AttachmentRevision, AttachmentStore, Database, OrphanCollector, PageStore};

async fn links(db: &Database) -> Vec<(i64, i64, i64, i64)> {
    sqlx::query_as(
        "SELECT page_id, page_file_id, file_revision, page_revision
         FROM page_revision_attachments ORDER BY page_revision, page_file_id",
    )
    .fetch_all(db.pool())
    .await
    .unwrap()
}

fn png(data: &[u8]) -> FileUpload {
    FileUpload::new("img.png", "image/png", data, "alice")
}

#[tokio::test]
async fn page_and_attachment_lifecycle() {
    let db = Database::connect_in_memory().await.unwrap();
    let pages = PageStore::from(&db);
    let attachments = AttachmentStore::from(&db);
    let archive = Archive::from(&db);
    let orphans = OrphanCollector::from(&db);

    // Create, edit, then repeat the edit.
    let created = pages.save(&PageDraft::new("A", "x", "alice")).await.unwrap();
    assert_eq!((created.revision, created.changed), (1, true));
    let page_id = created.page_id;
    let edited = pages.save(&PageDraft::new("A", "y", "alice").for_page(page_id)).await.unwrap();
    assert_eq!((edited.revision, edited.changed), (2, true));
    let repeated = pages.save(&PageDraft::new("A", "y", "alice").for_page(page_id)).await.unwrap();
    assert_eq!((repeated.revision, repeated.changed), (2, false));

    // Attach at r2, then edit the body: the link is carried onto r3.
    let first = attachments.upsert(page_id, &png(b"B1")).await.unwrap();
    let file_id = first.file_id;
    assert_eq!(links(&db).await, vec![(page_id, file_id, 1, 2)]);
    let third = pages.save(&PageDraft::new("A", "z", "alice").for_page(page_id)).await.unwrap();
    assert_eq!(third.revision, 3);
    assert_eq!(links(&db).await, vec![(page_id, file_id, 1, 2), (page_id, file_id, 1, 3)]);

    // Re-upload different bytes: new file revision, same page revision.
    let second = attachments.upsert(page_id, &png(b"B2")).await.unwrap();
    assert_eq!((second.file_revision, second.changed), (2, true));
    assert_eq!(pages.current_revision(page_id).await.unwrap(), Some(3));
    assert_eq!(links(&db).await, vec![(page_id, file_id, 1, 2), (page_id, file_id, 2, 3)]);
    let current = attachments.get("a", "img.png", AttachmentRevision::Current).await.unwrap().unwrap();
    assert_eq!(current.data, b"B2");
    let historic = attachments.get("a", "img.png", AttachmentRevision::PageRevision(2)).await.unwrap().unwrap();
    assert_eq!(historic.data, b"B1");

    // Nothing is orphaned until r2's link goes away.
    assert!(orphans.find(Paging::default()).await.unwrap().is_empty());
    assert_eq!(attachments.detach("a", "img.png", 2).await.unwrap(), 1);
    let found = orphans.find(Paging::default()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!((found[0].file.id, found[0].revision.revision), (file_id, 1));
    orphans.purge(file_id, 1).await.unwrap();
    assert!(orphans.find(Paging::default()).await.unwrap().is_empty());
    assert_eq!(attachments.history("a", "img.png").await.unwrap().len(), 1);

    // Archive round trip leaves the page exactly as it was.
    let before = pages.get(page_id).await.unwrap().unwrap();
    archive.move_to_deleted(page_id, "bob").await.unwrap();
    assert!(!pages.exists("a").await.unwrap());
    assert_eq!(archive.list_deleted(Paging::default()).await.unwrap().len(), 1);
    assert_eq!(archive.restore(page_id).await.unwrap(), before);
    assert_eq!(pages.get(page_id).await.unwrap().unwrap(), before);
    let listed = attachments.list(page_id, None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].revision.revision, 2);

    // Archive again and purge: nothing of the page remains.
    archive.move_to_deleted(page_id, "bob").await.unwrap();
    archive.purge(page_id).await.unwrap();
    assert!(archive.get_deleted(page_id).await.unwrap().is_none());
    assert!(links(&db).await.is_empty());
    assert_eq!(orphans.purge_all().await.unwrap(), 0);
    db.close().await;
}
