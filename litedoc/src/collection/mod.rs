use crate::context::Context;
use crate::database::Database;
use crate::document::Document;
use crate::error::{LitedocError, Result};
use crate::identifier::{quote_table, validate_collection_name};
use crate::query::{self, Literal, Op, Predicate};
use rusqlite::Connection;

/// A named group of documents, backed by one table `(id TEXT PRIMARY KEY, data JSON TEXT)`.
///
/// The table is created on the first write, so a collection never needs to
/// be provisioned up front.
#[derive(Clone)]
pub struct Collection<'db> {
    db: &'db Database,
    name: String,
}

impl<'db> Collection<'db> {
    pub(crate) fn new(db: &'db Database, name: &str) -> Self {
        Collection {
            db,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a handle to a document in this collection. No I/O.
    pub fn document(&self, id: &str) -> Document<'db> {
        Document::new(self.db, &self.name, id)
    }

    /// All documents in the collection, ordered by id.
    ///
    /// An empty collection yields an empty list; a collection that has never
    /// been written to has no table and fails with a storage error.
    pub fn query_all(&self, ctx: &Context) -> Result<Vec<Document<'db>>> {
        let table = self.table()?;
        log::debug!("query_all {}", self.name);

        let rows = self.db.with_conn(ctx, |conn| {
            let sql = format!("SELECT id, CAST(data AS TEXT) FROM {table} ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        Ok(self.documents_from_rows(rows))
    }

    /// Documents whose node at `key_path` compares true against `value`.
    ///
    /// `key_path` is a root-anchored JSON path such as `$.Numbers[0].Type`
    /// or `$."first name"`. Comparison follows SQLite's own rules, so a JSON
    /// number compared to a text literal orders the way the engine orders
    /// mixed types. A path the engine cannot parse, or an ordering operator
    /// against a null literal, fails with [`LitedocError::InvalidQuery`].
    pub fn query(
        &self,
        ctx: &Context,
        key_path: &str,
        op: Op,
        value: impl Into<Literal>,
    ) -> Result<Vec<Document<'db>>> {
        let table = self.table()?;
        let predicate = Predicate::new(key_path, op, value);
        predicate.check()?;
        log::debug!("query {} where {predicate}", self.name);

        let rows = self
            .db
            .with_conn(ctx, |conn| query::select_matching(conn, &table, &predicate))?
            .ok_or_else(|| {
                LitedocError::InvalidQuery(format!("malformed JSON path '{key_path}'"))
            })?;

        Ok(self.documents_from_rows(rows))
    }

    /// Create the backing table if it is missing. Existing rows are untouched.
    pub(crate) fn ensure_table(conn: &Connection, table: &str) -> rusqlite::Result<()> {
        conn.execute(
            &format!("CREATE TABLE IF NOT EXISTS {table} (id TEXT PRIMARY KEY, data JSON TEXT)"),
            [],
        )?;
        Ok(())
    }

    /// The validated, quoted table identifier for this collection.
    pub(crate) fn table(&self) -> Result<String> {
        validate_collection_name(&self.name)?;
        Ok(quote_table(&self.name))
    }

    fn documents_from_rows(&self, rows: Vec<(String, Option<String>)>) -> Vec<Document<'db>> {
        rows.into_iter()
            .map(|(id, data)| {
                let mut doc = self.document(&id);
                doc.attach(data.map(String::into_bytes));
                doc
            })
            .collect()
    }
}
