//! Pagination strategies for vendor list endpoints.
//!
//! Vendors page their collections in a handful of ways. [`Pagination`]
//! describes the scheme declaratively and [`Paginator::fetch_all`] walks the
//! pages through any [`Integration`].

use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::Integration;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// How a vendor pages list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum Pagination {
    /// Single response, no paging.
    None,

    /// `?page=N&per_page=M`.
    PageNumber {
        /// Page number parameter.
        page_param: &'static str,
        /// Page size parameter, if the vendor accepts one.
        size_param: Option<&'static str>,
        /// Items per page.
        page_size: u32,
        /// Number of the first page (0 or 1).
        first_page: u32,
    },

    /// `?offset=N&limit=M`.
    Offset {
        /// Offset parameter.
        offset_param: &'static str,
        /// Limit parameter.
        limit_param: &'static str,
        /// Items per page.
        limit: u32,
        /// Pointer to the next offset in the body, when the vendor reports it.
        next_offset_pointer: Option<&'static str>,
    },

    /// Opaque cursor returned in the body.
    Cursor {
        /// Cursor parameter.
        cursor_param: &'static str,
        /// Page size parameter, if the vendor accepts one.
        limit_param: Option<&'static str>,
        /// Items per page.
        limit: u32,
        /// Pointer to the next cursor.
        next_cursor_pointer: &'static str,
    },

    /// The id of the last item is the cursor (`starting_after=<id>`).
    LastItemCursor {
        /// Cursor parameter.
        cursor_param: &'static str,
        /// Limit parameter.
        limit_param: &'static str,
        /// Items per page.
        limit: u32,
        /// Field holding each item's id.
        id_field: &'static str,
        /// Pointer to the boolean "more pages" flag.
        has_more_pointer: &'static str,
    },

    /// The body carries the URL of the next page.
    NextLink {
        /// Pointer to the next page URL or path.
        next_link_pointer: &'static str,
    },
}

/// Items gathered across pages.
#[derive(Debug, Clone, Serialize)]
pub struct FetchedPages {
    /// All items, in page order.
    pub items: Vec<Value>,

    /// Pages requested.
    pub pages: u32,

    /// Whether `max_pages` stopped the walk before the vendor ran out.
    pub truncated: bool,
}

/// Walks a paginated endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginator {
    /// Paging scheme.
    pub pagination: Pagination,

    /// JSON pointer to the item array.
    ///
    /// With `""` the body itself is the array, or an envelope object whose
    /// single array field (directly or under `_embedded`) holds the items.
    pub items_pointer: String,

    /// Hard stop on the number of pages requested.
    pub max_pages: u32,
}

enum Next {
    Done,
    Query(Vec<(String, String)>),
    Link(String),
}

impl Paginator {
    /// Create a paginator.
    pub fn new(pagination: Pagination, items_pointer: impl Into<String>) -> Self {
        Self {
            pagination,
            items_pointer: items_pointer.into(),
            max_pages: 50,
        }
    }

    /// Set the page limit.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Override the item pointer.
    pub fn with_items_pointer(mut self, items_pointer: impl Into<String>) -> Self {
        self.items_pointer = items_pointer.into();
        self
    }

    /// Fetch every page of `path`, starting from `query`.
    pub async fn fetch_all(
        &self,
        integration: &dyn Integration,
        path: &str,
        query: &[(String, String)],
    ) -> IntegrationResult<FetchedPages> {
        let mut items = Vec::new();
        let mut pages = 0;
        let mut current_path = path.to_string();
        let mut current_query = self.first_query(query);

        loop {
            if pages >= self.max_pages {
                debug!(integration = integration.name(), pages, "Page limit reached");
                return Ok(FetchedPages {
                    items,
                    pages,
                    truncated: true,
                });
            }

            let body = integration.get(&current_path, &current_query).await?;
            pages += 1;

            let page = extract_items(&body, &self.items_pointer)?;
            let count = page.len();
            let last = page.last().cloned();
            items.extend(page);

            match self.next(&current_query, &body, count, last.as_ref()) {
                Next::Done => {
                    return Ok(FetchedPages {
                        items,
                        pages,
                        truncated: false,
                    })
                }
                Next::Query(q) => current_query = q,
                Next::Link(link) => {
                    current_path = link;
                    current_query = Vec::new();
                }
            }
        }
    }

    fn first_query(&self, base: &[(String, String)]) -> Vec<(String, String)> {
        let mut query = base.to_vec();
        match self.pagination {
            Pagination::None | Pagination::NextLink { .. } => {}
            Pagination::PageNumber {
                page_param,
                size_param,
                page_size,
                first_page,
            } => {
                set(&mut query, page_param, first_page.to_string());
                if let Some(size_param) = size_param {
                    set(&mut query, size_param, page_size.to_string());
                }
            }
            Pagination::Offset {
                offset_param,
                limit_param,
                limit,
                ..
            } => {
                set(&mut query, offset_param, "0".to_string());
                set(&mut query, limit_param, limit.to_string());
            }
            Pagination::Cursor {
                limit_param, limit, ..
            } => {
                if let Some(limit_param) = limit_param {
                    set(&mut query, limit_param, limit.to_string());
                }
            }
            Pagination::LastItemCursor {
                limit_param, limit, ..
            } => set(&mut query, limit_param, limit.to_string()),
        }
        query
    }

    fn next(
        &self,
        current: &[(String, String)],
        body: &Value,
        count: usize,
        last: Option<&Value>,
    ) -> Next {
        if count == 0 {
            return Next::Done;
        }

        match self.pagination {
            Pagination::None => Next::Done,
            Pagination::PageNumber {
                page_param,
                page_size,
                ..
            } => {
                if count < page_size as usize {
                    return Next::Done;
                }
                let page = get(current, page_param)
                    .and_then(|p| p.parse::<u64>().ok())
                    .unwrap_or(0);
                let mut query = current.to_vec();
                set(&mut query, page_param, (page + 1).to_string());
                Next::Query(query)
            }
            Pagination::Offset {
                offset_param,
                limit,
                next_offset_pointer,
                ..
            } => {
                let next = match next_offset_pointer {
                    Some(pointer) => match body.pointer(pointer) {
                        Some(Value::Number(n)) => n.as_u64(),
                        Some(Value::String(s)) if !s.is_empty() => s.parse().ok(),
                        _ => None,
                    },
                    None if count < limit as usize => None,
                    None => {
                        let offset = get(current, offset_param)
                            .and_then(|o| o.parse::<u64>().ok())
                            .unwrap_or(0);
                        Some(offset + count as u64)
                    }
                };
                match next {
                    Some(offset) => {
                        let mut query = current.to_vec();
                        set(&mut query, offset_param, offset.to_string());
                        Next::Query(query)
                    }
                    None => Next::Done,
                }
            }
            Pagination::Cursor {
                cursor_param,
                next_cursor_pointer,
                ..
            } => match body.pointer(next_cursor_pointer).and_then(scalar_string) {
                Some(cursor) => {
                    let mut query = current.to_vec();
                    set(&mut query, cursor_param, cursor);
                    Next::Query(query)
                }
                None => Next::Done,
            },
            Pagination::LastItemCursor {
                cursor_param,
                id_field,
                has_more_pointer,
                ..
            } => {
                let has_more = body
                    .pointer(has_more_pointer)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let id = last.and_then(|item| item.get(id_field)).and_then(scalar_string);
                match (has_more, id) {
                    (true, Some(id)) => {
                        let mut query = current.to_vec();
                        set(&mut query, cursor_param, id);
                        Next::Query(query)
                    }
                    _ => Next::Done,
                }
            }
            Pagination::NextLink { next_link_pointer } => {
                match body.pointer(next_link_pointer).and_then(Value::as_str) {
                    Some(link) if !link.is_empty() => Next::Link(link.to_string()),
                    _ => Next::Done,
                }
            }
        }
    }
}

/// Pull the item array out of a page body.
///
/// A missing or `null` value is an empty page. With an empty pointer an
/// envelope object such as `{"users": [...], "next_page": ...}` or
/// `{"_embedded": {"conversations": [...]}}` yields its only array.
/// Anything else that is not an array is an error.
pub fn extract_items(body: &Value, pointer: &str) -> IntegrationResult<Vec<Value>> {
    match body.pointer(pointer) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::Object(fields)) if pointer.is_empty() => envelope_items(fields)
            .cloned()
            .ok_or_else(|| {
                let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                IntegrationError::InvalidResponse(format!(
                    "response object has no single item array (fields: {}); set items_pointer",
                    keys.join(", ")
                ))
            }),
        Some(other) => Err(IntegrationError::InvalidResponse(format!(
            "expected an array at '{}', found {}",
            pointer,
            kind(other)
        ))),
    }
}

fn envelope_items(fields: &Map<String, Value>) -> Option<&Vec<Value>> {
    let mut arrays = fields.values().filter_map(Value::as_array);
    match (arrays.next(), arrays.next()) {
        (Some(items), None) => Some(items),
        (Some(_), Some(_)) => None,
        (None, _) => match fields.get("_embedded") {
            Some(Value::Object(embedded)) => {
                let mut arrays = embedded.values().filter_map(Value::as_array);
                match (arrays.next(), arrays.next()) {
                    (Some(items), None) => Some(items),
                    _ => None,
                }
            }
            _ => None,
        },
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn get<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn set(query: &mut Vec<(String, String)>, key: &str, value: String) {
    match query.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value,
        None => query.push((key.to_string(), value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_items() {
        let body = json!({"data": [1, 2], "meta": {"count": 2}});
        assert_eq!(extract_items(&body, "/data").unwrap().len(), 2);
        assert!(extract_items(&body, "/missing").unwrap().is_empty());
        assert!(extract_items(&body, "/meta").is_err());
        assert_eq!(extract_items(&json!([1, 2, 3]), "").unwrap().len(), 3);
    }

    #[test]
    fn test_extract_items_from_envelope() {
        let zendesk = json!({"users": [{"id": 1}], "next_page": null, "count": 1});
        assert_eq!(extract_items(&zendesk, "").unwrap(), vec![json!({"id": 1})]);

        let helpscout = json!({
            "_embedded": {"conversations": [{"id": 7}, {"id": 8}]},
            "_links": {"next": {"href": "https://api.helpscout.net/v2/conversations?page=2"}},
            "page": {"number": 1}
        });
        assert_eq!(extract_items(&helpscout, "").unwrap().len(), 2);

        let ambiguous = json!({"tickets": [], "users": []});
        let err = extract_items(&ambiguous, "").unwrap_err().to_string();
        assert!(err.contains("items_pointer"));

        assert!(extract_items(&json!({"total": 3}), "").is_err());
    }

    #[test]
    fn test_first_query_page_number() {
        let paginator = Paginator::new(
            Pagination::PageNumber {
                page_param: "page",
                size_param: Some("per_page"),
                page_size: 100,
                first_page: 1,
            },
            "",
        );
        let query = paginator.first_query(&[("updated_since".into(), "2024-01-01".into())]);
        assert_eq!(get(&query, "page"), Some("1"));
        assert_eq!(get(&query, "per_page"), Some("100"));
        assert_eq!(get(&query, "updated_since"), Some("2024-01-01"));
    }

    #[test]
    fn test_next_stops_on_short_page() {
        let paginator = Paginator::new(
            Pagination::Offset {
                offset_param: "offset",
                limit_param: "limit",
                limit: 10,
                next_offset_pointer: None,
            },
            "/items",
        );
        let current = paginator.first_query(&[]);
        assert!(matches!(
            paginator.next(&current, &json!({}), 4, None),
            Next::Done
        ));
        match paginator.next(&current, &json!({}), 10, None) {
            Next::Query(q) => assert_eq!(get(&q, "offset"), Some("10")),
            _ => panic!("expected another page"),
        }
    }

    #[test]
    fn test_last_item_cursor() {
        let paginator = Paginator::new(
            Pagination::LastItemCursor {
                cursor_param: "starting_after",
                limit_param: "limit",
                limit: 2,
                id_field: "id",
                has_more_pointer: "/has_more",
            },
            "/data",
        );
        let body = json!({"data": [{"id": "cus_1"}, {"id": "cus_2"}], "has_more": true});
        let last = json!({"id": "cus_2"});
        match paginator.next(&[], &body, 2, Some(&last)) {
            Next::Query(q) => assert_eq!(get(&q, "starting_after"), Some("cus_2")),
            _ => panic!("expected another page"),
        }

        let done = json!({"data": [{"id": "cus_3"}], "has_more": false});
        assert!(matches!(
            paginator.next(&[], &done, 1, Some(&json!({"id": "cus_3"}))),
            Next::Done
        ));
    }
}
