use super::{PageRequest, PageToken};
use crate::record::{get_field, get_path, non_empty, Record};
use serde_json::Value;

/// How an offset parameter moves between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetUnit {
    /// Page number, +1 per page.
    Page,
    /// Item offset (`offset`, `skip`), + items received per page.
    Items,
}

/// Where the next cursor comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenSource {
    /// A dotted path in the response body, e.g. `pages.next.starting_after`.
    Body(String),
    /// A field of the last item, while the optional boolean at `has_more`
    /// is true.
    LastItem {
        field: String,
        has_more: Option<String>,
    },
}

impl TokenSource {
    pub fn body(path: impl Into<String>) -> Self {
        TokenSource::Body(path.into())
    }

    pub fn last_item(field: impl Into<String>, has_more: impl Into<String>) -> Self {
        TokenSource::LastItem {
            field: field.into(),
            has_more: Some(has_more.into()),
        }
    }
}

/// Pagination strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Pagination {
    /// Page number or item offset.
    ///
    /// The last page is the first one with fewer than `page_size` items.
    Offset {
        param: String,
        size_param: Option<String>,
        page_size: usize,
        unit: OffsetUnit,
        first: u64,
    },
    /// Continuation token taken from the response.
    ///
    /// The last page is the first one without a token.
    Cursor {
        param: String,
        size_param: Option<String>,
        page_size: Option<usize>,
        source: TokenSource,
    },
    /// Later pages go to `scroll_endpoint` with only the scroll token.
    Scroll {
        scroll_endpoint: String,
        param: String,
        token_path: String,
    },
    /// One request, one page.
    Single,
}

impl Pagination {
    /// Item offset starting at 0, `param` advancing by the items received.
    pub fn offset(param: impl Into<String>, page_size: usize) -> Self {
        Pagination::Offset {
            param: param.into(),
            size_param: None,
            page_size,
            unit: OffsetUnit::Items,
            first: 0,
        }
    }

    /// Page number starting at 1.
    pub fn page_number(param: impl Into<String>, page_size: usize) -> Self {
        Pagination::Offset {
            param: param.into(),
            size_param: None,
            page_size,
            unit: OffsetUnit::Page,
            first: 1,
        }
    }

    pub fn cursor(param: impl Into<String>, source: TokenSource) -> Self {
        Pagination::Cursor {
            param: param.into(),
            size_param: None,
            page_size: None,
            source,
        }
    }

    pub fn scroll(
        scroll_endpoint: impl Into<String>,
        param: impl Into<String>,
        token_path: impl Into<String>,
    ) -> Self {
        Pagination::Scroll {
            scroll_endpoint: scroll_endpoint.into(),
            param: param.into(),
            token_path: token_path.into(),
        }
    }

    /// Sends the page size under `name` on every request.
    pub fn with_size_param(mut self, name: impl Into<String>, size: usize) -> Self {
        match &mut self {
            Pagination::Offset {
                size_param,
                page_size,
                ..
            } => {
                *size_param = Some(name.into());
                *page_size = size;
            }
            Pagination::Cursor {
                size_param,
                page_size,
                ..
            } => {
                *size_param = Some(name.into());
                *page_size = Some(size);
            }
            Pagination::Scroll { .. } | Pagination::Single => {}
        }
        self
    }

    /// First offset or page number (offset strategies only).
    pub fn starting_at(mut self, start: u64) -> Self {
        if let Pagination::Offset { first, .. } = &mut self {
            *first = start;
        }
        self
    }

    /// Fills in the parameters every request of this strategy carries.
    pub fn prepare(&self, request: &PageRequest) -> PageRequest {
        let mut request = request.clone();
        match self {
            Pagination::Offset {
                param,
                size_param,
                page_size,
                first,
                ..
            } => {
                if let Some(size_param) = size_param {
                    request.set_param(size_param.clone(), *page_size as u64);
                }
                if !request.params.contains_key(param) {
                    request.set_param(param.clone(), *first);
                }
            }
            Pagination::Cursor {
                size_param: Some(size_param),
                page_size: Some(page_size),
                ..
            } => {
                request.set_param(size_param.clone(), *page_size as u64);
            }
            _ => {}
        }
        request
    }

    /// Merges a continuation token into the previous request.
    pub fn apply_token(&self, previous: &PageRequest, token: PageToken) -> PageRequest {
        match self {
            Pagination::Offset { param, .. } | Pagination::Cursor { param, .. } => {
                let mut next = previous.clone();
                next.set_param(param.clone(), token.to_json());
                next.with_token(token)
            }
            Pagination::Scroll {
                scroll_endpoint,
                param,
                ..
            } => PageRequest::new(scroll_endpoint.clone())
                .param(param.clone(), token.to_json())
                .with_token(token),
            Pagination::Single => previous.clone(),
        }
    }

    /// Token for the page after this one, or `None` when this is the last.
    pub fn continuation(
        &self,
        request: &PageRequest,
        body: &Value,
        items: &[Record],
    ) -> Option<PageToken> {
        match self {
            Pagination::Offset {
                param,
                page_size,
                unit,
                first,
                ..
            } => {
                if items.is_empty() || items.len() < *page_size {
                    return None;
                }
                let current = request
                    .params
                    .get(param)
                    .and_then(Value::as_u64)
                    .unwrap_or(*first);
                let next = match unit {
                    OffsetUnit::Page => current + 1,
                    OffsetUnit::Items => current + items.len() as u64,
                };
                Some(PageToken::Number(next))
            }
            Pagination::Cursor { source, .. } => match source {
                TokenSource::Body(path) => {
                    non_empty(get_path(body, path)).and_then(PageToken::from_json)
                }
                TokenSource::LastItem { field, has_more } => {
                    if let Some(flag) = has_more {
                        let more = get_path(body, flag).and_then(Value::as_bool);
                        if more != Some(true) {
                            return None;
                        }
                    }
                    items
                        .last()
                        .and_then(|item| non_empty(get_field(item, field)))
                        .and_then(PageToken::from_json)
                }
            },
            Pagination::Scroll { token_path, .. } => {
                if items.is_empty() {
                    return None;
                }
                non_empty(get_path(body, token_path)).and_then(PageToken::from_json)
            }
            Pagination::Single => None,
        }
    }
}
