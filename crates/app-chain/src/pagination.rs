//! Cursor-based pagination of App-chain queries.

use serde::{Deserialize, Serialize};

/// Requests one page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRequest {
    /// Cursor returned by the previous page, `None` for the first page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Maximum number of items in the page.
    pub limit: u64,
}

impl PageRequest {
    /// The first page of at most `limit` items.
    pub const fn first(limit: u64) -> Self {
        Self { key: None, limit }
    }

    /// The page after the one that returned `next_key`.
    pub fn next(&self, next_key: String) -> Self {
        Self {
            key: Some(next_key),
            limit: self.limit,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items of this page.
    pub items: Vec<T>,

    /// Cursor of the next page, `None` when this is the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_key: Option<String>,
}

impl<T> Page<T> {
    /// The request for the following page, `None` when this is the last page.
    ///
    /// An empty cursor is treated as the end of the listing.
    pub fn next_request(&self, current: &PageRequest) -> Option<PageRequest> {
        self.next_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(|key| current.next(key.clone()))
    }

    /// Converts every item, dropping the ones that do not convert.
    ///
    /// `on_error` is handed the position in the page and the error of every dropped item. The
    /// cursor is kept, so one bad item never hides the rest of the listing.
    pub fn filter_convert<U, E>(
        self,
        mut f: impl FnMut(T) -> Result<U, E>,
        mut on_error: impl FnMut(usize, E),
    ) -> Page<U> {
        let items = self
            .items
            .into_iter()
            .enumerate()
            .filter_map(|(idx, item)| f(item).map_err(|err| on_error(idx, err)).ok())
            .collect();

        Page {
            items,
            next_key: self.next_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_has_no_successor() {
        let req = PageRequest::first(10);

        let page = Page::<u8> {
            items: vec![1, 2],
            next_key: Some("abc".into()),
        };
        assert_eq!(
            page.next_request(&req),
            Some(PageRequest {
                key: Some("abc".into()),
                limit: 10
            })
        );

        let last = Page::<u8> {
            items: vec![],
            next_key: Some(String::new()),
        };
        assert_eq!(last.next_request(&req), None);
    }

    #[test]
    fn unconvertible_items_are_dropped() {
        let page = Page {
            items: vec![1u8, 2, 3, 4],
            next_key: Some("next".into()),
        };

        let mut dropped = vec![];
        let converted = page.filter_convert(
            |x| if x % 2 == 0 { Err(x) } else { Ok(u16::from(x) * 10) },
            |idx, err| dropped.push((idx, err)),
        );

        assert_eq!(converted.items, vec![10, 30]);
        assert_eq!(converted.next_key.as_deref(), Some("next"));
        assert_eq!(dropped, vec![(1, 2), (3, 4)]);
    }
}
