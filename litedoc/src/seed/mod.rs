use crate::collection::Collection;
use crate::context::Context;
use crate::database::Database;
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Counts reported by [`Database::seed_from_dir`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub collections: usize,
    pub documents: usize,
}

impl Database {
    /// Bulk-load a directory tree: one subdirectory per collection, one file
    /// per document. The file name minus a `.json` suffix is the document id
    /// and the file contents are stored verbatim.
    ///
    /// Stops at the first error. Documents inserted before the failure stay
    /// committed.
    pub fn seed_from_dir(&self, ctx: &Context, dir: &Path) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        for collection_dir in sorted_entries(dir)? {
            if !collection_dir.is_dir() {
                log::warn!("seed: skipping non-directory {}", collection_dir.display());
                continue;
            }
            let name = file_name(&collection_dir);
            let collection = self.collection(&name);

            let table = collection.table()?;
            self.with_conn(ctx, |conn| Collection::ensure_table(conn, &table))?;
            summary.collections += 1;

            for doc_path in sorted_entries(&collection_dir)? {
                if doc_path.is_dir() {
                    log::warn!("seed: skipping nested directory {}", doc_path.display());
                    continue;
                }
                let file = file_name(&doc_path);
                let id = file.strip_suffix(".json").unwrap_or(&file);
                let payload = std::fs::read_to_string(&doc_path)?;

                collection.document(id).insert_raw(ctx, payload)?;
                summary.documents += 1;
            }
            log::debug!("seed: loaded collection {name}");
        }

        log::info!(
            "seeded {} collections, {} documents from {}",
            summary.collections,
            summary.documents,
            dir.display()
        );
        Ok(summary)
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        paths.push(entry?.path());
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LitedocError, Op};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_seed_collections_and_documents() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "boards/board-1.json", r#"{"title":"Work","list_ids":["l1","l2"]}"#);
        write(root, "boards/board-2.json", r#"{"title":"Home","list_ids":[]}"#);
        write(root, "lists/l1.json", r#"{"title":"Todo","card_ids":["c1"]}"#);
        write(root, "lists/l2.json", r#"{"title":"Done","card_ids":[]}"#);
        write(root, "cards/c1.json", r#"{"title":"Ship it","desc":""}"#);
        std::fs::create_dir_all(root.join("accounts")).unwrap();
        write(root, "README", "not a collection");

        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        let summary = db.seed_from_dir(&ctx, root).unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                collections: 4,
                documents: 5
            }
        );

        let boards = db.collection("boards").query_all(&ctx).unwrap();
        let ids: Vec<&str> = boards.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["board-1", "board-2"]);

        let raw = boards[0].raw().unwrap();
        assert_eq!(raw, br#"{"title":"Work","list_ids":["l1","l2"]}"#.as_slice());

        let todo = db
            .collection("lists")
            .query(&ctx, "$.card_ids[0]", Op::Equal, "c1")
            .unwrap();
        assert_eq!(todo.len(), 1);
        assert_eq!(todo[0].id(), "l1");

        // Empty collection directories still get a table.
        assert!(db.collection("accounts").query_all(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_seed_skips_nested_directories() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "cards/c1.json", "{}");
        write(tmp.path(), "cards/archive/c0.json", "{}");

        let db = Database::open_in_memory().unwrap();
        let summary = db.seed_from_dir(&Context::background(), tmp.path()).unwrap();
        assert_eq!(summary.documents, 1);
    }

    #[test]
    fn test_seed_halts_on_first_error_keeping_prior_writes() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "cards/a.json", r#"{"n":1}"#);
        write(tmp.path(), "cards/b", r#"{"n":2}"#);
        write(tmp.path(), "cards/b.json", r#"{"n":3}"#);
        write(tmp.path(), "cards/c.json", r#"{"n":4}"#);

        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        let err = db.seed_from_dir(&ctx, tmp.path()).unwrap_err();
        assert!(matches!(err, LitedocError::AlreadyExists { .. }));

        // "a" and "b" landed before "b.json" collided; "c" was never reached.
        let ids: Vec<String> = db
            .collection("cards")
            .query_all(&ctx)
            .unwrap()
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_seed_rejects_unsafe_collection_dir() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "bad-name/x.json", "{}");

        let db = Database::open_in_memory().unwrap();
        let err = db.seed_from_dir(&Context::background(), tmp.path()).unwrap_err();
        assert!(matches!(err, LitedocError::InvalidName(_)));
    }

    #[test]
    fn test_seed_missing_dir_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let err = db
            .seed_from_dir(&Context::background(), &tmp.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, LitedocError::Io(_)));
    }
}
