use bson::{Bson, doc, oid::ObjectId};
use docgate::{memory::InMemoryConnector, prelude::*};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

fn adapter(connector: &InMemoryConnector) -> Arc<Adapter> {
    Arc::new(Adapter::new(
        connector.clone(),
        AdapterConfig::new("memory://", "music"),
    ))
}

async fn seeded(connector: &InMemoryConnector) -> Gateway {
    let albums = Gateway::new(adapter(connector), "albums").unwrap();
    for (title, year, genre) in [
        ("Kind of Blue", 1959, "jazz"),
        ("Pastel Blues", 1965, "soul"),
        ("Blue Train", 1958, "jazz"),
        ("A Love Supreme", 1965, "jazz"),
        ("Songs in the Key of Life", 1976, "soul"),
    ] {
        albums
            .insert(Record::new().with("title", title).with("year", year).with("genre", genre))
            .await
            .unwrap();
    }
    albums
}

async fn titles(rows: ResultSet) -> Vec<String> {
    rows.collect_rows()
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.get("title").and_then(Bson::as_str).unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_save_inserts_then_updates() {
    let connector = InMemoryConnector::new();
    let albums = Gateway::new(adapter(&connector), "albums").unwrap();

    let mut album = Record::new().with("title", "Kind of Blue").with("year", 1959);
    albums.save(&mut album).await.unwrap();
    let id = album.id().cloned().unwrap();
    assert!(matches!(id, Bson::ObjectId(_)));
    assert_eq!(albums.last_insert_id().await, Some(id.clone()));

    albums.insert(Record::new().with("title", "Blue Train")).await.unwrap();

    album.insert("year", 1960);
    albums.save(&mut album).await.unwrap();

    let stored = albums.get(id.clone()).await.unwrap().unwrap();
    assert_eq!(stored.get("year"), Some(&Bson::Int32(1960)));

    let other = albums.find_one(doc! { "title": "Blue Train" }).await.unwrap().unwrap();
    assert_eq!(other.get("year"), None);
    assert_eq!(albums.last_insert_id().await, Some(id));
}

#[tokio::test]
async fn test_save_with_unknown_id_fails() {
    let connector = InMemoryConnector::new();
    let albums = Gateway::new(adapter(&connector), "albums").unwrap();

    let mut ghost = Record::new().with_id(ObjectId::new()).with("title", "Ghost");
    let result = albums.save(&mut ghost).await;

    assert!(matches!(result, Err(DocumentStoreError::Consistency(_))));
    assert!(connector.documents("music", "albums").await.is_empty());
}

#[tokio::test]
async fn test_find_with_order_limit_and_offset() {
    let connector = InMemoryConnector::new();
    let albums = seeded(&connector).await;

    let rows = albums
        .find(doc! { "genre": "jazz" }, doc! { "year": "desc" }, Some(2), Some(1))
        .await
        .unwrap();

    assert_eq!(titles(rows).await, vec!["Kind of Blue", "Blue Train"]);
}

#[tokio::test]
async fn test_find_counts_every_match() {
    let connector = InMemoryConnector::new();
    let albums = seeded(&connector).await;

    let mut rows = albums
        .find(doc! { "genre": "jazz" }, Bson::Null, Some(1), None)
        .await
        .unwrap();

    assert_eq!(rows.count().await.unwrap(), 3);
    assert!(rows.next_row().await.unwrap().is_some());
    assert!(rows.next_row().await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_rejects_non_mapping_arguments() {
    let connector = InMemoryConnector::new();
    let albums = seeded(&connector).await;

    let bad_filter = albums.find(Bson::Int32(5), Bson::Null, None, None).await;
    assert!(matches!(bad_filter, Err(DocumentStoreError::InvalidInput(_))));

    let bad_order = albums
        .find(Bson::Null, Bson::String("year".into()), None, None)
        .await;
    assert!(matches!(bad_order, Err(DocumentStoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_select_membership_and_negation() {
    let connector = InMemoryConnector::new();
    let albums = seeded(&connector).await;

    let in_years = albums.select(doc! { "year": [1958, 1976] }).await.unwrap();
    let mut found = titles(in_years).await;
    found.sort();
    assert_eq!(found, vec!["Blue Train", "Songs in the Key of Life"]);

    let not_jazz = albums.select(doc! { "-genre": "jazz" }).await.unwrap();
    let mut found = titles(not_jazz).await;
    found.sort();
    assert_eq!(found, vec!["Pastel Blues", "Songs in the Key of Life"]);

    let not_in = albums.select(doc! { "-year": [1965, 1959] }).await.unwrap();
    let mut found = titles(not_in).await;
    found.sort();
    assert_eq!(found, vec!["Blue Train", "Songs in the Key of Life"]);

    let raw = albums.select(doc! { "year": { "$gte": 1965 } }).await.unwrap();
    assert_eq!(titles(raw).await.len(), 3);
}

#[tokio::test]
async fn test_get_coerces_hex_identifiers() {
    let connector = InMemoryConnector::new();
    let albums = seeded(&connector).await;

    let ack = albums.insert(Record::new().with("title", "Mingus Ah Um")).await.unwrap();
    let Some(Bson::ObjectId(oid)) = ack.inserted_id else {
        panic!("expected a generated object id");
    };

    let by_hex = albums.get(oid.to_hex()).await.unwrap().unwrap();
    assert_eq!(by_hex.get("title"), Some(&Bson::String("Mingus Ah Um".into())));

    assert!(albums.get(ObjectId::new()).await.unwrap().is_none());
    assert!(albums.get("not-an-id").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_and_drop() {
    let connector = InMemoryConnector::new();
    let albums = seeded(&connector).await;
    assert!(albums.last_insert_id().await.is_some());

    assert!(albums.delete(doc! { "genre": "soul" }).await.unwrap());
    assert_eq!(connector.documents("music", "albums").await.len(), 3);
    assert_eq!(albums.last_insert_id().await, None);

    assert!(albums.drop().await.unwrap());
    assert!(connector.collection_names("music").await.is_empty());
    assert_eq!(albums.fetch_all().await.unwrap().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_update_sets_fields_on_every_match() {
    let connector = InMemoryConnector::new();
    let albums = seeded(&connector).await;

    let ack = albums
        .update(Record::new().with("label", "Impulse!"), doc! { "year": 1965 })
        .await
        .unwrap();
    assert_eq!(ack.affected, 2);

    let labelled = albums.select(doc! { "label": "Impulse!" }).await.unwrap();
    assert_eq!(titles(labelled).await.len(), 2);
}

#[tokio::test]
async fn test_duplicate_insert_reports_store_error() {
    let connector = InMemoryConnector::new();
    let albums = Gateway::new(adapter(&connector), "albums").unwrap();

    albums.insert(Record::new().with_id(7).with("title", "A")).await.unwrap();
    let result = albums.insert(Record::new().with_id(7).with("title", "B")).await;

    assert!(matches!(result, Err(DocumentStoreError::Query(_))));
}

#[tokio::test]
async fn test_pages() {
    let connector = InMemoryConnector::new();
    let tracks = Gateway::new(adapter(&connector), "tracks").unwrap();
    for n in 0..12 {
        tracks.insert(Record::new().with("n", n)).await.unwrap();
    }

    let pages = tracks.get_pages(Bson::Null, doc! { "n": 1 }).await.unwrap();
    assert_eq!(pages.source().count().await.unwrap(), 12);

    let rows = pages.source().items(10, 5).await.unwrap().collect_rows().await.unwrap();
    let numbers: Vec<_> = rows.iter().filter_map(|row| row.get("n").cloned()).collect();
    assert_eq!(numbers, vec![Bson::Int32(10), Bson::Int32(11)]);

    let last = pages.page(&PaginationParams::new(3, 5)).await.unwrap();
    assert_eq!(last.items.len(), 2);
    assert_eq!(last.count, 12);
    assert_eq!(last.next_page, None);
    assert_eq!(last.previous_page, Some(2));
    assert_eq!(pages.page_count(5).await.unwrap(), 3);
}

#[tokio::test]
async fn test_filtered_pages() {
    let connector = InMemoryConnector::new();
    let albums = seeded(&connector).await;

    let pages = albums
        .get_pages(doc! { "-genre": "jazz" }, doc! { "year": 1 })
        .await
        .unwrap();
    assert_eq!(pages.source().count().await.unwrap(), 2);
    assert_eq!(
        titles(pages.source().items(0, 5).await.unwrap()).await,
        vec!["Pastel Blues", "Songs in the Key of Life"]
    );
    assert_eq!(
        titles(pages.source().items(1, 5).await.unwrap()).await,
        vec!["Songs in the Key of Life"]
    );

    let pages = albums
        .get_pages(doc! { "genre": ["soul", "funk"], "year": { "$lt": 1970 } }, doc! {})
        .await
        .unwrap();
    let first = pages.page(&PaginationParams::new(1, 20)).await.unwrap();
    assert_eq!(first.count, 1);
    assert_eq!(first.next_page, None);
}

#[tokio::test]
async fn test_index_management() {
    let connector = InMemoryConnector::new();
    let albums = seeded(&connector).await;

    albums.create_index(doc! { "year": -1 }, Some("byYear")).await.unwrap();
    albums.create_index(doc! { "genre": 1 }, None).await.unwrap();
    assert_eq!(
        connector.index_names("music", "albums").await,
        vec!["_id_", "byYear", "albumsTextIndex"]
    );

    albums.ensure_index(doc! { "title": "text" }).await.unwrap();
    assert_eq!(
        connector.index_names("music", "albums").await,
        vec!["_id_", "albumsTextIndex"]
    );

    albums
        .create_indexes([
            ("byTitle".to_string(), doc! { "title": 1 }),
            ("byGenre".to_string(), doc! { "genre": 1 }),
        ])
        .await
        .unwrap();
    albums.drop_index("byTitle").await.unwrap();
    assert_eq!(
        connector.index_names("music", "albums").await,
        vec!["_id_", "byGenre"]
    );

    albums.drop_indexes().await.unwrap();
    assert_eq!(connector.index_names("music", "albums").await, vec!["_id_"]);
}

#[tokio::test]
async fn test_transactions_are_emulated() {
    let connector = InMemoryConnector::new();
    let albums = seeded(&connector).await;
    let adapter = albums.adapter().clone();

    adapter.begin_transaction().await.unwrap();
    assert!(adapter.in_transaction());
    albums.insert(Record::new().with("title", "Giant Steps")).await.unwrap();
    adapter.rollback().await.unwrap();

    assert!(!adapter.in_transaction());
    assert_eq!(connector.documents("music", "albums").await.len(), 6);
    assert!(matches!(
        adapter.rollback().await,
        Err(DocumentStoreError::Transaction(_))
    ));
}

#[tokio::test]
async fn test_connection_failure_surfaces_on_first_use() {
    let adapter = Arc::new(Adapter::new(
        InMemoryConnector::new(),
        AdapterConfig::new("mongodb://nowhere", "music"),
    ));
    let albums = Gateway::new(adapter, "albums").unwrap();

    assert!(!albums.is_initialized().await);
    let result = albums.fetch_all().await;
    assert!(matches!(result, Err(DocumentStoreError::Connection { .. })));
}

#[derive(Debug, Default)]
struct ReadOnly {
    seen: Mutex<Vec<(Verb, bool)>>,
}

impl Feature for ReadOnly {
    fn pre(&self, verb: Verb, table: &str) -> DocumentStoreResult<()> {
        if verb.is_write() {
            return Err(DocumentStoreError::InvalidInput(format!("{table} is read-only")));
        }
        Ok(())
    }

    fn post(&self, verb: Verb, _table: &str, succeeded: bool) {
        self.seen.lock().unwrap().push((verb, succeeded));
    }
}

#[tokio::test]
async fn test_features_intercept_verbs() {
    let connector = InMemoryConnector::new();
    let guard = Arc::new(ReadOnly::default());
    let mut features = FeatureSet::new();
    features.add(guard.clone());
    let albums = seeded(&connector).await.with_features(features);

    let refused = albums.insert(Record::new().with("title", "Nope")).await;
    assert!(matches!(refused, Err(DocumentStoreError::InvalidInput(_))));
    assert_eq!(connector.documents("music", "albums").await.len(), 5);

    assert!(albums.find_one(doc! { "year": 1959 }).await.unwrap().is_some());
    assert_eq!(
        *guard.seen.lock().unwrap(),
        vec![(Verb::FindOne, true)]
    );
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Album {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    title: String,
    year: i32,
}

impl Model for Album {
    fn exchange_record(&mut self, record: Record) -> DocumentStoreResult<()> {
        *self = record.deserialize()?;
        Ok(())
    }
}

#[tokio::test]
async fn test_typed_rows() {
    let connector = InMemoryConnector::new();
    let albums = Gateway::with_prototype(adapter(&connector), "albums", Album::default()).unwrap();

    for (title, year) in [("Kind of Blue", 1959), ("Blue Train", 1958)] {
        let album = Album { id: None, title: title.into(), year };
        albums.insert(Record::from_serialize(&album).unwrap()).await.unwrap();
    }

    let rows: Vec<Album> = albums
        .find(Bson::Null, doc! { "year": "asc" }, None, None)
        .await
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].title, "Blue Train");
    assert!(rows.iter().all(|album| album.id.is_some()));
}
