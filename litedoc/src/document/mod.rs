use crate::collection::Collection;
use crate::context::Context;
use crate::database::Database;
use crate::error::{is_primary_key_violation, LitedocError, Result};
use crate::identifier::validate_document_id;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A JSON document in a collection, identified by a caller-chosen id.
///
/// The handle is cheap and holds no payload until one is created, set or
/// fetched. Every operation goes straight to storage; nothing is cached
/// across handles.
#[derive(Clone)]
pub struct Document<'db> {
    db: &'db Database,
    collection: String,
    id: String,
    data: Option<Vec<u8>>,
}

impl std::fmt::Debug for Document<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("collection", &self.collection)
            .field("id", &self.id)
            .field("data", &self.data.as_deref().map(String::from_utf8_lossy))
            .finish()
    }
}

impl<'db> Document<'db> {
    pub(crate) fn new(db: &'db Database, collection: &str, id: &str) -> Self {
        Document {
            db,
            collection: collection.to_string(),
            id: id.to_string(),
            data: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The attached JSON payload, if any.
    pub fn raw(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// The attached payload as an untyped JSON value.
    pub fn value(&self) -> Result<serde_json::Value> {
        self.data_to()
    }

    /// Decode the attached payload. Fails with `NoData` if the document was
    /// never loaded or written through this handle.
    pub fn data_to<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self.data.as_deref().ok_or(LitedocError::NoData)?;
        serde_json::from_slice(data).map_err(LitedocError::Decode)
    }

    /// Insert this document with `value` as its payload, creating the
    /// collection's table if needed. Fails with `AlreadyExists` if the id is
    /// taken.
    pub fn create<T: Serialize + ?Sized>(&mut self, ctx: &Context, value: &T) -> Result<()> {
        let payload = encode(value)?;
        self.insert_raw(ctx, payload)
    }

    /// Replace the payload of an existing document. Fails with `NotFound` if
    /// no document has this id.
    pub fn set<T: Serialize + ?Sized>(&mut self, ctx: &Context, value: &T) -> Result<()> {
        let table = self.table()?;
        let payload = encode(value)?;
        log::debug!("set {}/{}", self.collection, self.id);

        let changed = self.db.with_conn(ctx, |conn| {
            Collection::ensure_table(conn, &table)?;
            conn.execute(
                &format!("UPDATE {table} SET data = ?1 WHERE id = ?2"),
                params![payload, self.id],
            )
        })?;

        if changed == 0 {
            return Err(self.not_found());
        }
        self.data = Some(payload.into_bytes());
        Ok(())
    }

    /// Fetch the stored payload, attach it to this handle, and decode it.
    pub fn get<T: DeserializeOwned>(&mut self, ctx: &Context) -> Result<T> {
        let table = self.table()?;
        log::debug!("get {}/{}", self.collection, self.id);

        let row = self.db.with_conn(ctx, |conn| {
            conn.query_row(
                &format!("SELECT CAST(data AS TEXT) FROM {table} WHERE id = ?1"),
                params![self.id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
        })?;

        let data = row.ok_or_else(|| self.not_found())?;
        self.data = data.map(String::into_bytes);
        self.data_to()
    }

    /// Remove the document. Removing an id that does not exist is not an error.
    pub fn delete(&mut self, ctx: &Context) -> Result<()> {
        let table = self.table()?;
        log::debug!("delete {}/{}", self.collection, self.id);

        self.db.with_conn(ctx, |conn| {
            conn.execute(
                &format!("DELETE FROM {table} WHERE id = ?1"),
                params![self.id],
            )
        })?;
        self.data = None;
        Ok(())
    }

    /// Insert an already-encoded payload verbatim.
    pub(crate) fn insert_raw(&mut self, ctx: &Context, payload: String) -> Result<()> {
        let table = self.table()?;
        log::debug!("create {}/{}", self.collection, self.id);

        let inserted = self.db.with_conn(ctx, |conn| {
            Collection::ensure_table(conn, &table)?;
            conn.execute(
                &format!("INSERT INTO {table} (id, data) VALUES (?1, ?2)"),
                params![self.id, payload],
            )
        });

        match inserted {
            Ok(_) => {
                self.data = Some(payload.into_bytes());
                Ok(())
            }
            Err(LitedocError::Storage(e)) if is_primary_key_violation(&e) => {
                Err(LitedocError::AlreadyExists {
                    collection: self.collection.clone(),
                    id: self.id.clone(),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn attach(&mut self, data: Option<Vec<u8>>) {
        self.data = data;
    }

    fn table(&self) -> Result<String> {
        validate_document_id(&self.id)?;
        self.db.collection(&self.collection).table()
    }

    fn not_found(&self) -> LitedocError {
        LitedocError::NotFound {
            collection: self.collection.clone(),
            id: self.id.clone(),
        }
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(LitedocError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[allow(non_snake_case)]
    struct Number {
        Type: String,
        Digits: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[allow(non_snake_case)]
    struct Person {
        Name: String,
        Age: i64,
        Dead: bool,
        Numbers: Vec<Number>,
    }

    fn blain() -> Person {
        Person {
            Name: "Blain Smith".into(),
            Age: 40,
            Dead: false,
            Numbers: vec![
                Number {
                    Type: "home".into(),
                    Digits: "9784305790".into(),
                },
                Number {
                    Type: "mobile".into(),
                    Digits: "9784305790".into(),
                },
            ],
        }
    }

    #[test]
    fn test_document_scenario() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path().join("test.db")).unwrap();
        let ctx = Context::background();
        let d1 = blain();

        db.collection("test").document("my-doc").create(&ctx, &d1).unwrap();
        db.collection("test").document("my-doc-1").create(&ctx, &d1).unwrap();

        let d2: Person = db.collection("test").document("my-doc").get(&ctx).unwrap();
        assert_eq!(d2.Name, "Blain Smith");
        assert_eq!(d2, d1);

        let docs = db
            .collection("test")
            .query(&ctx, "$.Numbers[0].Type", crate::Op::Equal, "home")
            .unwrap();
        assert_eq!(docs.len(), 2);

        db.close().unwrap();
    }

    #[test]
    fn test_data_to_without_payload() {
        let db = Database::open_in_memory().unwrap();
        let doc = db.collection("test").document("fresh");
        assert!(doc.raw().is_none());
        let err = doc.data_to::<Person>().unwrap_err();
        assert!(matches!(err, LitedocError::NoData));
    }

    #[test]
    fn test_create_attaches_payload() {
        let db = Database::open_in_memory().unwrap();
        let mut doc = db.collection("test").document("my-doc");
        doc.create(&Context::background(), &blain()).unwrap();

        let back: Person = doc.data_to().unwrap();
        assert_eq!(back, blain());
        assert_eq!(doc.value().unwrap()["Numbers"][1]["Type"], "mobile");
    }

    #[test]
    fn test_create_duplicate_is_already_exists() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        db.collection("test").document("dup").create(&ctx, &blain()).unwrap();

        let err = db
            .collection("test")
            .document("dup")
            .create(&ctx, &blain())
            .unwrap_err();
        match err {
            LitedocError::AlreadyExists { collection, id } => {
                assert_eq!(collection, "test");
                assert_eq!(id, "dup");
            }
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[test]
    fn test_second_create_keeps_first_rows() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        let test = db.collection("fresh");

        test.document("a").create(&ctx, &serde_json::json!({"n": 1})).unwrap();
        test.document("b").create(&ctx, &serde_json::json!({"n": 2})).unwrap();

        let docs = test.query_all(&ctx).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].value().unwrap(), serde_json::json!({"n": 1}));
    }

    #[test]
    fn test_set_replaces_payload() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        let mut doc = db.collection("test").document("my-doc");
        doc.create(&ctx, &blain()).unwrap();

        let mut older = blain();
        older.Age = 41;
        doc.set(&ctx, &older).unwrap();

        let fetched: Person = db.collection("test").document("my-doc").get(&ctx).unwrap();
        assert_eq!(fetched.Age, 41);
    }

    #[test]
    fn test_scalar_payloads_keep_their_text() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        let numbers = db.collection("numbers");

        numbers.document("max").create(&ctx, &u64::MAX).unwrap();
        numbers.document("one").create(&ctx, &1.0f64).unwrap();
        numbers.document("word").create(&ctx, "10").unwrap();

        let max: u64 = numbers.document("max").get(&ctx).unwrap();
        assert_eq!(max, u64::MAX);
        let one: f64 = numbers.document("one").get(&ctx).unwrap();
        assert_eq!(one, 1.0);
        let word: String = numbers.document("word").get(&ctx).unwrap();
        assert_eq!(word, "10");

        let docs = numbers.query_all(&ctx).unwrap();
        let raw: Vec<String> = docs
            .iter()
            .filter_map(|d| d.raw())
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect();
        assert_eq!(raw, vec!["18446744073709551615", "1.0", "\"10\""]);

        let stored: Vec<String> = db
            .with_conn(&ctx, |conn| {
                let mut stmt = conn.prepare("SELECT typeof(data) FROM \"numbers\"")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .unwrap();
        assert_eq!(stored, vec!["text"; 3]);
    }

    #[test]
    fn test_set_missing_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        let mut doc = db.collection("test").document("ghost");

        let err = doc.set(&ctx, &blain()).unwrap_err();
        assert!(matches!(err, LitedocError::NotFound { .. }));
        assert!(doc.raw().is_none());
        // The table was still provisioned.
        assert!(db.collection("test").query_all(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        db.collection("test").document("real").create(&ctx, &blain()).unwrap();

        let err = db
            .collection("test")
            .document("ghost")
            .get::<Person>(&ctx)
            .unwrap_err();
        assert!(matches!(err, LitedocError::NotFound { .. }));
    }

    #[test]
    fn test_get_wrong_shape_is_decode_error() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        db.collection("test")
            .document("flat")
            .create(&ctx, &serde_json::json!({"Name": 12}))
            .unwrap();

        let err = db
            .collection("test")
            .document("flat")
            .get::<Person>(&ctx)
            .unwrap_err();
        assert!(matches!(err, LitedocError::Decode(_)));
    }

    #[test]
    fn test_delete_then_get() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        let mut doc = db.collection("test").document("gone");
        doc.create(&ctx, &blain()).unwrap();
        doc.delete(&ctx).unwrap();
        assert!(doc.raw().is_none());

        let err = doc.get::<Person>(&ctx).unwrap_err();
        assert!(matches!(err, LitedocError::NotFound { .. }));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        db.collection("test").document("real").create(&ctx, &blain()).unwrap();

        db.collection("test").document("ghost").delete(&ctx).unwrap();
        assert_eq!(db.collection("test").query_all(&ctx).unwrap().len(), 1);
    }

    #[test]
    fn test_ids_with_quotes_are_stored_literally() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        let id = "o'brien'); DROP TABLE test; --";
        db.collection("test").document(id).create(&ctx, &blain()).unwrap();

        let docs = db.collection("test").query_all(&ctx).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id(), id);
    }

    #[test]
    fn test_path_like_id_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .collection("test")
            .document("../accounts/admin")
            .create(&Context::background(), &blain())
            .unwrap_err();
        assert!(matches!(err, LitedocError::InvalidName(_)));
    }

    #[test]
    fn test_concurrent_distinct_creates() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path().join("test.db")).unwrap();

        std::thread::scope(|s| {
            for i in 0..8 {
                let db = &db;
                s.spawn(move || {
                    let ctx = Context::with_timeout(Duration::from_secs(30));
                    db.collection("test")
                        .document(&format!("doc-{i}"))
                        .create(&ctx, &blain())
                        .unwrap();
                });
            }
        });

        let docs = db.collection("test").query_all(&Context::background()).unwrap();
        assert_eq!(docs.len(), 8);
    }

    #[test]
    fn test_concurrent_same_id_one_wins() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path().join("test.db")).unwrap();

        let results: Vec<Result<()>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let db = &db;
                    s.spawn(move || {
                        db.collection("test")
                            .document("same")
                            .create(&Context::background(), &blain())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(LitedocError::AlreadyExists { .. })))
            .count();
        assert_eq!((ok, dup), (1, 1));
    }
}
