//! Paged API response parsing.
//!
//! ```json
//! { "data": [ {...}, ... ], "paging": { "cursors": { "after": "..." }, "next": "https://..." } }
//! ```

use crate::error::{AdLibraryError, Result};
use crate::record::Record;
use serde_json::Value;
use tracing::warn;

/// One decoded page of results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResponse {
    pub records: Vec<Record>,
    /// Continuation token; `None` marks the last page.
    pub after: Option<String>,
}

impl PageResponse {
    /// Decode a page.
    ///
    /// A missing `data` key means no records on this page. The continuation
    /// token is only kept when both `paging.cursors.after` and `paging.next`
    /// are present. A body with neither `data` nor `paging` (or that is not an
    /// object at all) is malformed.
    pub fn parse(body: &Value) -> Result<Self> {
        let Some(object) = body.as_object() else {
            return Err(AdLibraryError::MalformedPage(format!(
                "expected a JSON object, got {}",
                summarize(body)
            )));
        };

        let data = object.get("data");
        let paging = object.get("paging").filter(|p| p.is_object());
        if data.is_none() && paging.is_none() {
            return Err(AdLibraryError::MalformedPage(format!(
                "neither 'data' nor 'paging' in {}",
                summarize(body)
            )));
        }

        let records = match data {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(rows)) => rows
                .iter()
                .filter_map(|row| match Record::from_value(row.clone()) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("skipping record: {e}");
                        None
                    }
                })
                .collect(),
            Some(other) => {
                return Err(AdLibraryError::MalformedPage(format!(
                    "'data' is not a list: {}",
                    summarize(other)
                )))
            }
        };

        let after = paging.and_then(|p| {
            let has_next = p.get("next").is_some_and(|n| !n.is_null());
            let token = p
                .get("cursors")
                .and_then(|c| c.get("after"))
                .and_then(|a| a.as_str());
            token.filter(|_| has_next).map(|t| t.to_string())
        });

        Ok(Self { records, after })
    }
}

fn summarize(value: &Value) -> String {
    let mut text = value.to_string();
    if text.len() > 200 {
        let cut = (0..=200).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_with_continuation() {
        let page = PageResponse::parse(&json!({
            "data": [{"id": "1"}, {"id": "2"}],
            "paging": {"cursors": {"after": "X"}, "next": "https://graph.facebook.com/next"}
        }))
        .unwrap();

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].id(), Some("2"));
        assert_eq!(page.after.as_deref(), Some("X"));
    }

    #[test]
    fn test_after_without_next_is_terminal() {
        let page = PageResponse::parse(&json!({
            "data": [{"id": "1"}],
            "paging": {"cursors": {"after": "X"}}
        }))
        .unwrap();
        assert!(page.after.is_none());
    }

    #[test]
    fn test_next_without_after_is_terminal() {
        let page = PageResponse::parse(&json!({
            "data": [],
            "paging": {"next": "https://graph.facebook.com/next"}
        }))
        .unwrap();
        assert!(page.after.is_none());
        assert!(page.records.is_empty());
    }

    #[test]
    fn test_paging_only_page_has_no_records() {
        let page = PageResponse::parse(&json!({
            "paging": {"cursors": {"after": "Y"}, "next": "n"}
        }))
        .unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.after.as_deref(), Some("Y"));
    }

    #[test]
    fn test_malformed_pages() {
        for body in [json!({}), json!("text"), json!({"data": "nope"}), json!({"error": {}})] {
            assert!(
                matches!(PageResponse::parse(&body), Err(AdLibraryError::MalformedPage(_))),
                "expected malformed: {body}"
            );
        }
    }

    #[test]
    fn test_row_with_foreign_ad_elements_is_kept() {
        let page = PageResponse::parse(&json!({
            "data": [{"id": "1", "ad_elements": "legacy"}, {"id": "2"}]
        }))
        .unwrap();
        let ids: Vec<_> = page.records.iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(page.records[0].ad_elements().is_none());
    }

    #[test]
    fn test_non_object_rows_are_skipped() {
        let page = PageResponse::parse(&json!({"data": [{"id": "1"}, 42, {"id": "3"}]})).unwrap();
        let ids: Vec<_> = page.records.iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
