// Collection names end up inside statement text as table identifiers, so
// they are checked against a strict pattern and then quoted. Document ids are
// always bound as parameters; they are checked so that ids stay usable as
// file stems in a seed directory.

use crate::error::{LitedocError, Result};
use regex::Regex;
use std::sync::OnceLock;

pub const MAX_COLLECTION_NAME_LEN: usize = 64;
pub const MAX_DOCUMENT_ID_LEN: usize = 255;

fn collection_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("collection name pattern is valid")
    })
}

/// Check that a collection name is usable as a table identifier.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(LitedocError::InvalidName(format!(
            "collection name longer than {MAX_COLLECTION_NAME_LEN} bytes: '{name}'"
        )));
    }
    if !collection_pattern().is_match(name) {
        return Err(LitedocError::InvalidName(format!(
            "collection name must match [A-Za-z_][A-Za-z0-9_]*: '{name}'"
        )));
    }
    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(LitedocError::InvalidName(format!(
            "collection name uses the reserved sqlite_ prefix: '{name}'"
        )));
    }
    Ok(())
}

/// Check that a document id is a plain key.
pub fn validate_document_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(LitedocError::InvalidName("document id is empty".into()));
    }
    if id.len() > MAX_DOCUMENT_ID_LEN {
        return Err(LitedocError::InvalidName(format!(
            "document id longer than {MAX_DOCUMENT_ID_LEN} bytes"
        )));
    }
    if id == "." || id == ".." {
        return Err(LitedocError::InvalidName(format!("document id '{id}' is reserved")));
    }
    if let Some(c) = id.chars().find(|c| matches!(c, '/' | '\\') || c.is_control()) {
        return Err(LitedocError::InvalidName(format!(
            "document id '{}' contains forbidden character {:?}",
            id.escape_debug(),
            c
        )));
    }
    Ok(())
}

/// Quote a validated collection name for use as a table identifier.
pub(crate) fn quote_table(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
