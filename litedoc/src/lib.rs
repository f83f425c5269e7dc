//! A small document database on top of SQLite.
//!
//! Collections are tables of `(id, data)` rows where `data` is a JSON
//! document. Documents are created, read, replaced and deleted by id, and a
//! collection can be filtered with a single JSON-path predicate.
//!
//! ```no_run
//! use litedoc::{Context, Database, Op};
//!
//! # fn main() -> litedoc::Result<()> {
//! let db = Database::open("./knbn.sqlite")?;
//! let ctx = Context::background();
//!
//! db.collection("boards")
//!     .document("board-1")
//!     .create(&ctx, &serde_json::json!({ "title": "Work", "list_ids": [] }))?;
//!
//! let work = db.collection("boards").query(&ctx, "$.title", Op::Equal, "Work")?;
//! assert_eq!(work.len(), 1);
//!
//! db.close()?;
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod config;
pub mod context;
pub mod database;
pub mod document;
pub mod error;
pub mod identifier;
pub mod query;
pub mod seed;

pub use collection::Collection;
pub use config::ConnectionConfig;
pub use context::Context;
pub use database::Database;
pub use document::Document;
pub use error::{LitedocError, Result};
pub use query::{Literal, Op, Predicate};
pub use seed::SeedSummary;
