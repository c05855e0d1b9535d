//! Opaque Pagination Cursors
//!
//! List operations accept an optional cursor and return `next_cursor` when
//! more pages exist. Cursors encode `(revision, offset)`; the revision
//! lets a traversal notice churn, but stability under concurrent mutation
//! is deliberately not guaranteed beyond "deterministic absent churn".

// Layer 2: Third-party crate imports
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

// Layer 3: Internal module imports
use crate::engine::{McpError, McpResult};
use crate::protocol::Cursor;

/// One page of a list traversal
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Cursor for the next page; `None` on the final page
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    /// A single page holding everything
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

/// Slice a snapshot into one page
///
/// With no page size configured the whole snapshot is returned at once.
///
/// # Errors
///
/// Returns `InvalidParams` for cursors this side did not mint.
pub fn paginate<T: Clone>(
    snapshot: &[T],
    cursor: Option<&Cursor>,
    page_size: Option<usize>,
    revision: u64,
) -> McpResult<Page<T>> {
    let offset = match cursor {
        None => 0,
        Some(cursor) => {
            let (_cursor_revision, offset) = decode_cursor(cursor)?;
            // A traversal spanning a mutation restarts determinism from
            // the offset; no further guarantee is offered.
            offset
        }
    };

    let Some(page_size) = page_size else {
        if offset > 0 {
            // Unpaginated registries never mint cursors.
            return Err(McpError::invalid_params("invalid cursor"));
        }
        return Ok(Page::complete(snapshot.to_vec()));
    };

    if offset > snapshot.len() {
        return Ok(Page::complete(Vec::new()));
    }
    let end = (offset + page_size).min(snapshot.len());
    let items = snapshot[offset..end].to_vec();
    let next_cursor = (end < snapshot.len()).then(|| encode_cursor(end, revision));
    Ok(Page { items, next_cursor })
}

fn encode_cursor(offset: usize, revision: u64) -> Cursor {
    Cursor::new(STANDARD.encode(format!("v1:{revision}:{offset}")))
}

fn decode_cursor(cursor: &Cursor) -> McpResult<(u64, usize)> {
    let invalid = || McpError::invalid_params("invalid cursor");
    let raw = STANDARD.decode(cursor.as_str()).map_err(|_| invalid())?;
    let raw = String::from_utf8(raw).map_err(|_| invalid())?;
    let mut parts = raw.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("v1"), Some(revision), Some(offset), None) => {
            let revision = revision.parse().map_err(|_| invalid())?;
            let offset = offset.parse().map_err(|_| invalid())?;
            Ok((revision, offset))
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_page_without_page_size() {
        let page = paginate(&[1, 2, 3], None, None, 0).unwrap();
        assert_eq!(page.items, vec![1, 2, 3]);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn walks_pages_to_completion() {
        let items: Vec<i32> = (0..5).collect();
        let first = paginate(&items, None, Some(2), 7).unwrap();
        assert_eq!(first.items, vec![0, 1]);
        let cursor = first.next_cursor.unwrap();

        let second = paginate(&items, Some(&cursor), Some(2), 7).unwrap();
        assert_eq!(second.items, vec![2, 3]);
        let cursor = second.next_cursor.unwrap();

        let last = paginate(&items, Some(&cursor), Some(2), 7).unwrap();
        assert_eq!(last.items, vec![4]);
        assert!(last.next_cursor.is_none());
    }

    #[test]
    fn garbage_cursor_is_invalid_params() {
        let result = paginate(&[1], Some(&Cursor::new("not-base64!")), Some(2), 0);
        assert!(matches!(result, Err(McpError::InvalidParams { .. })));
    }

    #[test]
    fn offset_past_end_yields_empty_final_page() {
        let items = vec![1, 2];
        let first = paginate(&items, None, Some(2), 0).unwrap();
        assert!(first.next_cursor.is_none());

        // Cursor minted against a longer snapshot, registry since shrank.
        let long: Vec<i32> = (0..6).collect();
        let page = paginate(&long, None, Some(4), 0).unwrap();
        let cursor = page.next_cursor.unwrap();
        let shrunk = vec![1, 2];
        let page = paginate(&shrunk, Some(&cursor), Some(4), 1).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }
}
