//! List envelopes and the forward-only [`Paginator`].

use std::collections::BTreeMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::Bytes;
use pt_domain::error::{Error, Result};
use pt_domain::trace::TraceEvent;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 50;
pub const MAX_PER_PAGE: u32 = 100;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire envelopes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `{"object": "list", "data": [...], "meta": {"pagination": {...}}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEnvelope<T> {
    #[serde(default)]
    pub object: String,
    #[serde(default = "Vec::new")]
    pub data: Vec<Item<T>>,
    #[serde(default)]
    pub meta: Meta,
}

/// `{"object": "<kind>", "attributes": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item<T> {
    #[serde(default)]
    pub object: String,
    pub attributes: T,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub total: u64,
    pub count: u64,
    pub per_page: u32,
    pub current_page: u32,
    pub total_pages: u32,
}

impl<T> ListEnvelope<T> {
    /// Drop the per-item wrappers.
    pub fn into_items(self) -> Vec<T> {
        self.data.into_iter().map(|item| item.attributes).collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// List options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Query parameters for a list call. Zero `page`/`per_page` mean the
/// defaults (page 1, 50 per page).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub page: u32,
    pub per_page: u32,
    /// Sub-resources to embed, sent as `include=a,b`.
    pub include: Vec<String>,
    /// Sent as `filter[key]=value`.
    pub filter: BTreeMap<String, String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.include.push(relation.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.per_page > MAX_PER_PAGE {
            return Err(Error::InvalidArgument(format!(
                "per_page must not exceed {MAX_PER_PAGE}, got {}",
                self.per_page
            )));
        }
        Ok(())
    }

    /// Query pairs for one page, ordered by key.
    pub fn to_query(&self, page: u32, per_page: u32) -> Vec<(String, String)> {
        let mut query = BTreeMap::new();
        for (key, value) in &self.filter {
            query.insert(format!("filter[{key}]"), value.clone());
        }
        if !self.include.is_empty() {
            query.insert("include".to_owned(), self.include.join(","));
        }
        query.insert("page".to_owned(), page.to_string());
        query.insert("per_page".to_owned(), per_page.to_string());
        query.into_iter().collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Page source seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fetches the raw body of one page. Implemented by [`Client`](crate::Client).
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn get_page(&self, path: &str, query: &[(String, String)]) -> Result<Bytes>;
}

#[async_trait]
impl<S: PageSource + ?Sized> PageSource for &S {
    async fn get_page(&self, path: &str, query: &[(String, String)]) -> Result<Bytes> {
        (**self).get_page(path, query).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Paginator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Forward-only cursor over a paginated list endpoint.
///
/// [`start`](Self::start) fetches the first page; each
/// [`next_page`](Self::next_page) fetches one more until
/// `current_page == total_pages`, after which it keeps returning
/// `Ok(None)` without touching the network.
pub struct Paginator<T, S> {
    source: S,
    path: String,
    options: ListOptions,
    current_page: u32,
    total_pages: u32,
    per_page: u32,
    _item: PhantomData<fn() -> T>,
}

impl<T, S> std::fmt::Debug for Paginator<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("path", &self.path)
            .field("current_page", &self.current_page)
            .field("total_pages", &self.total_pages)
            .field("per_page", &self.per_page)
            .finish_non_exhaustive()
    }
}

impl<T, S> Paginator<T, S>
where
    T: DeserializeOwned,
    S: PageSource,
{
    pub async fn start(
        source: S,
        path: impl Into<String>,
        options: ListOptions,
    ) -> Result<(Vec<T>, Self)> {
        options.validate()?;

        let page = if options.page == 0 { 1 } else { options.page };
        let per_page = if options.per_page == 0 {
            DEFAULT_PER_PAGE
        } else {
            options.per_page
        };

        let mut paginator = Self {
            source,
            path: path.into(),
            options,
            current_page: page,
            total_pages: 0,
            per_page,
            _item: PhantomData,
        };

        let (items, pagination) = paginator.fetch(page).await?;
        paginator.total_pages = pagination.total_pages;
        if paginator.total_pages == 0 && !items.is_empty() {
            paginator.total_pages = 1;
        }

        Ok((items, paginator))
    }

    pub fn has_more(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if !self.has_more() {
            return Ok(None);
        }

        let next = self.current_page + 1;
        let (items, pagination) = self.fetch(next).await?;
        self.current_page = next;
        if pagination.total_pages > 0 {
            self.total_pages = pagination.total_pages;
        }
        Ok(Some(items))
    }

    /// Drain every remaining page.
    pub async fn collect_remaining(mut self) -> Result<Vec<T>> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    async fn fetch(&self, page: u32) -> Result<(Vec<T>, Pagination)> {
        let query = self.options.to_query(page, self.per_page);
        let body = self.source.get_page(&self.path, &query).await.map_err(|e| {
            tracing::debug!(path = %self.path, page, error = %e, "page fetch failed");
            e
        })?;

        let envelope: ListEnvelope<T> = serde_json::from_slice(&body)?;
        let pagination = envelope.meta.pagination.clone();
        let items = envelope.into_items();

        TraceEvent::PageFetched {
            path: self.path.clone(),
            page,
            total_pages: pagination.total_pages,
            items: items.len(),
        }
        .emit();

        Ok((items, pagination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Widget {
        id: u32,
    }

    /// Serves canned pages keyed by the `page` query parameter.
    struct FakeSource {
        total_pages: u32,
        per_page_items: u32,
        /// Per-page override of the reported `total_pages`, indexed from page 1.
        reported_totals: Vec<u32>,
        calls: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl FakeSource {
        fn new(total_pages: u32, per_page_items: u32) -> Self {
            Self {
                total_pages,
                per_page_items,
                reported_totals: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn reporting(mut self, totals: &[u32]) -> Self {
            self.reported_totals = totals.to_vec();
            self
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn get_page(&self, _path: &str, query: &[(String, String)]) -> Result<Bytes> {
            self.calls.lock().unwrap().push(query.to_vec());
            let page: u32 = query
                .iter()
                .find(|(k, _)| k == "page")
                .map(|(_, v)| v.parse().unwrap())
                .unwrap();
            let total_pages = self
                .reported_totals
                .get(page as usize - 1)
                .copied()
                .unwrap_or(self.total_pages);

            let data: Vec<_> = (0..self.per_page_items)
                .map(|i| {
                    serde_json::json!({
                        "object": "widget",
                        "attributes": { "id": (page - 1) * self.per_page_items + i }
                    })
                })
                .collect();
            let body = serde_json::json!({
                "object": "list",
                "data": data,
                "meta": { "pagination": {
                    "total": total_pages * self.per_page_items,
                    "count": self.per_page_items,
                    "per_page": self.per_page_items,
                    "current_page": page,
                    "total_pages": total_pages,
                }}
            });
            Ok(Bytes::from(serde_json::to_vec(&body).unwrap()))
        }
    }

    #[tokio::test]
    async fn walks_all_pages_then_stops() {
        let source = FakeSource::new(3, 2);
        let (first, mut pager) =
            Paginator::<Widget, _>::start(&source, "application/widgets", ListOptions::new())
                .await
                .unwrap();
        assert_eq!(first, vec![Widget { id: 0 }, Widget { id: 1 }]);
        assert_eq!(pager.current_page(), 1);
        assert_eq!(pager.total_pages(), 3);
        assert_eq!(pager.per_page(), DEFAULT_PER_PAGE);

        assert_eq!(pager.next_page().await.unwrap().unwrap()[0], Widget { id: 2 });
        assert_eq!(pager.next_page().await.unwrap().unwrap()[0], Widget { id: 4 });
        assert!(!pager.has_more());
        assert_eq!(source.calls(), 3);

        // Past the end: no further requests.
        assert!(pager.next_page().await.unwrap().is_none());
        assert!(pager.next_page().await.unwrap().is_none());
        assert_eq!(source.calls(), 3);
        assert_eq!(pager.current_page(), 3);
    }

    #[tokio::test]
    async fn later_pages_can_grow_the_total() {
        // The list grows while it is walked; the last page reports no total.
        let source = FakeSource::new(2, 1).reporting(&[2, 3, 0]);
        let (first, mut pager) = Paginator::<Widget, _>::start(&source, "x", ListOptions::new())
            .await
            .unwrap();
        assert_eq!(first, vec![Widget { id: 0 }]);
        assert_eq!(pager.total_pages(), 2);

        assert_eq!(pager.next_page().await.unwrap(), Some(vec![Widget { id: 1 }]));
        assert_eq!(pager.total_pages(), 3);
        assert!(pager.has_more());

        assert_eq!(pager.next_page().await.unwrap(), Some(vec![Widget { id: 2 }]));
        assert_eq!(pager.total_pages(), 3, "a zero total keeps the last known one");
        assert!(!pager.has_more());

        assert!(pager.next_page().await.unwrap().is_none());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn invalid_per_page_fails_before_any_request() {
        let source = FakeSource::new(1, 1);
        let err = Paginator::<Widget, _>::start(&source, "x", ListOptions::new().per_page(101))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn zero_total_pages_with_items_counts_as_one() {
        let source = FakeSource::new(0, 3);
        let (items, mut pager) = Paginator::<Widget, _>::start(&source, "x", ListOptions::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(pager.total_pages(), 1);
        assert!(pager.next_page().await.unwrap().is_none());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn empty_list_has_no_more_pages() {
        let source = FakeSource::new(0, 0);
        let (items, pager) = Paginator::<Widget, _>::start(&source, "x", ListOptions::new())
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(pager.total_pages(), 0);
        assert!(!pager.has_more());
    }

    #[tokio::test]
    async fn starting_mid_list_and_collecting_the_rest() {
        let source = FakeSource::new(4, 1);
        let (first, pager) =
            Paginator::<Widget, _>::start(&source, "x", ListOptions::new().page(2).per_page(1))
                .await
                .unwrap();
        assert_eq!(first, vec![Widget { id: 1 }]);
        let rest = pager.collect_remaining().await.unwrap();
        assert_eq!(rest, vec![Widget { id: 2 }, Widget { id: 3 }]);

        let calls = source.calls.lock().unwrap();
        assert!(calls[0].contains(&("per_page".into(), "1".into())));
    }

    #[test]
    fn query_is_ordered_and_encodes_include_and_filters() {
        let opts = ListOptions::new()
            .include("allocations")
            .include("user")
            .filter("name", "lobby");
        assert_eq!(
            opts.to_query(2, 25),
            vec![
                ("filter[name]".to_string(), "lobby".to_string()),
                ("include".to_string(), "allocations,user".to_string()),
                ("page".to_string(), "2".to_string()),
                ("per_page".to_string(), "25".to_string()),
            ]
        );
    }

    #[test]
    fn envelope_flattens_attributes() {
        let raw = r#"{
            "object": "list",
            "data": [
                {"object": "widget", "attributes": {"id": 7}},
                {"object": "widget", "attributes": {"id": 8}}
            ],
            "meta": {"pagination": {
                "total": 2, "count": 2, "per_page": 50, "current_page": 1, "total_pages": 1
            }}
        }"#;
        let env: ListEnvelope<Widget> = serde_json::from_str(raw).unwrap();
        assert_eq!(env.meta.pagination.total, 2);
        assert_eq!(env.into_items(), vec![Widget { id: 7 }, Widget { id: 8 }]);
    }

    #[test]
    fn envelope_without_meta_defaults_to_zero() {
        let env: ListEnvelope<Widget> =
            serde_json::from_str(r#"{"object":"list","data":[]}"#).unwrap();
        assert_eq!(env.meta.pagination, Pagination::default());
    }
}
