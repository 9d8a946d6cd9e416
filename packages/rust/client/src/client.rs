//! HTTP client for the remote content API.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use url::Url;

use pagesmith_shared::{
    ApiErrorBody, ClientConfig, DateValue, PagesmithError, Paginated, PostMetadata, PostStatus,
    PropertyValue, RawBlock, RemotePage, Result,
};

use crate::properties;
use crate::retry::ApiExecutor;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("pagesmith/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// ContentSource
// ---------------------------------------------------------------------------

/// Read access to the remote content source.
///
/// [`ContentClient`] is the HTTP implementation; the sync orchestrator is
/// generic over this trait so it can run against an in-memory source.
pub trait ContentSource: Send + Sync {
    /// Verify credentials and database access.
    fn test_connection(&self) -> impl Future<Output = Result<()>> + Send;

    /// Published posts with a publish date in the past, newest first.
    fn published_posts(&self) -> impl Future<Output = Result<Vec<RemotePage>>> + Send;

    /// Posts with status Scheduled, soonest first.
    fn scheduled_posts(&self) -> impl Future<Output = Result<Vec<RemotePage>>> + Send;

    /// Posts with status Draft.
    fn draft_posts(&self) -> impl Future<Output = Result<Vec<RemotePage>>> + Send;

    /// A single page by id.
    fn page(&self, id: &str) -> impl Future<Output = Result<RemotePage>> + Send;

    /// The page's top-level blocks, with children attached where they are rendered.
    fn page_blocks(&self, id: &str) -> impl Future<Output = Result<Vec<RawBlock>>> + Send;

    /// Map a page's properties onto post metadata.
    fn extract_metadata(&self, page: &RemotePage) -> Result<PostMetadata>;
}

// ---------------------------------------------------------------------------
// ContentClient
// ---------------------------------------------------------------------------

/// Rate-limited, retrying client for a Notion-style database API.
pub struct ContentClient {
    http: Client,
    config: ClientConfig,
    executor: ApiExecutor,
}

impl ContentClient {
    /// Create a client from a resolved [`ClientConfig`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| PagesmithError::Network(format!("failed to build HTTP client: {e}")))?;

        let executor = ApiExecutor::from_config(&config.rate_limit, &config.retry);

        Ok(Self {
            http,
            config,
            executor,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| PagesmithError::config(format!("invalid endpoint '{path}': {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.config.api_key)
            .header("Notion-Version", &self.config.api_version)
    }

    /// Send one request and decode the JSON body. No retry here.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| PagesmithError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PagesmithError::Network(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            let parsed: Option<ApiErrorBody> = serde_json::from_str(&body).ok();
            let code = parsed.as_ref().and_then(|b| b.code.clone());
            let message = parsed
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(PagesmithError::api(status.as_u16(), code.as_deref(), message));
        }

        serde_json::from_str(&body)
            .map_err(|e| PagesmithError::parse(format!("unexpected response shape: {e}")))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        label: &str,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<T> {
        self.executor
            .execute(label, || {
                let mut request = self.request(method.clone(), url.clone());
                if let Some(body) = body {
                    request = request.json(body);
                }
                self.send(request)
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Endpoints
    // -----------------------------------------------------------------------

    /// Query the configured database, following continuation cursors until exhausted.
    #[instrument(skip_all, fields(database = %self.config.database_id))]
    pub async fn query_database(
        &self,
        filter: Option<Value>,
        sorts: Option<Value>,
    ) -> Result<Vec<RemotePage>> {
        let url = self.endpoint(&format!(
            "v1/databases/{}/query",
            self.config.database_id
        ))?;

        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": self.config.page_size });
            if let Some(filter) = &filter {
                body["filter"] = filter.clone();
            }
            if let Some(sorts) = &sorts {
                body["sorts"] = sorts.clone();
            }
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }

            let batch: Paginated<RemotePage> = self
                .call("query database", Method::POST, &url, Some(&body))
                .await?;
            let next = batch.continuation().map(str::to_string);
            pages.extend(batch.results);

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(count = pages.len(), "database query complete");
        Ok(pages)
    }

    /// All direct children of a block (or page), across every result page.
    pub async fn block_children(&self, block_id: &str) -> Result<Vec<RawBlock>> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = self.endpoint(&format!("v1/blocks/{block_id}/children"))?;
            url.query_pairs_mut()
                .append_pair("page_size", &self.config.page_size.to_string());
            if let Some(cursor) = &cursor {
                url.query_pairs_mut().append_pair("start_cursor", cursor);
            }

            let batch: Paginated<RawBlock> = self
                .call("list block children", Method::GET, &url, None)
                .await?;
            let next = batch.continuation().map(str::to_string);
            blocks.extend(batch.results);

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(blocks)
    }

    /// Write a publish date back to a page.
    pub async fn update_publish_date(&self, page_id: &str, date: NaiveDate) -> Result<()> {
        let url = self.endpoint(&format!("v1/pages/{page_id}"))?;
        let body = json!({
            "properties": {
                self.config.properties.publish_date.as_str(): {
                    "date": { "start": date.format("%Y-%m-%d").to_string() }
                }
            }
        });

        let _: Value = self
            .call("update publish date", Method::PATCH, &url, Some(&body))
            .await?;
        Ok(())
    }

    fn status_filter(&self, status: PostStatus) -> Value {
        json!({
            "property": self.config.properties.status,
            "select": { "equals": status.as_str() }
        })
    }

    fn date_sort(&self, direction: &str) -> Value {
        json!([{ "property": self.config.properties.publish_date, "direction": direction }])
    }

    fn publish_date_of(&self, page: &RemotePage) -> Option<DateTime<Utc>> {
        properties::date(&page.properties, &self.config.properties.publish_date)
            .ok()
            .flatten()
    }

    /// Give a page without a publish date today's date, remotely and in memory.
    ///
    /// A failed write-back is logged; the in-memory date is applied regardless.
    async fn backfill_publish_date(&self, page: &mut RemotePage, today: NaiveDate) {
        match self.update_publish_date(&page.id, today).await {
            Ok(()) => info!(page_id = %page.id, date = %today, "assigned missing publish date"),
            Err(e) => warn!(
                page_id = %page.id,
                error = %e,
                "failed to write back publish date"
            ),
        }

        page.properties.insert(
            self.config.properties.publish_date.clone(),
            PropertyValue::Date {
                date: Some(DateValue {
                    start: today.format("%Y-%m-%d").to_string(),
                    end: None,
                }),
            },
        );
    }
}

impl ContentSource for ContentClient {
    #[instrument(skip_all)]
    async fn test_connection(&self) -> Result<()> {
        let url = self.endpoint(&format!("v1/databases/{}", self.config.database_id))?;
        let _: Value = self
            .call("retrieve database", Method::GET, &url, None)
            .await?;
        info!(database = %self.config.database_id, "connected to content source");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn published_posts(&self) -> Result<Vec<RemotePage>> {
        let pages = self
            .query_database(
                Some(self.status_filter(PostStatus::Published)),
                Some(self.date_sort("descending")),
            )
            .await?;

        let now = Utc::now();
        let today = now.date_naive();
        let mut dated = Vec::with_capacity(pages.len());

        for mut page in pages {
            if self.publish_date_of(&page).is_none() {
                self.backfill_publish_date(&mut page, today).await;
            }
            match self.publish_date_of(&page) {
                Some(date) if date <= now => dated.push((date, page)),
                Some(date) => debug!(page_id = %page.id, %date, "publish date in the future, skipping"),
                None => {}
            }
        }

        dated.sort_by(|a, b| b.0.cmp(&a.0));
        let posts: Vec<RemotePage> = dated.into_iter().map(|(_, page)| page).collect();
        info!(count = posts.len(), "fetched published posts");
        Ok(posts)
    }

    async fn scheduled_posts(&self) -> Result<Vec<RemotePage>> {
        self.query_database(
            Some(self.status_filter(PostStatus::Scheduled)),
            Some(self.date_sort("ascending")),
        )
        .await
    }

    async fn draft_posts(&self) -> Result<Vec<RemotePage>> {
        self.query_database(Some(self.status_filter(PostStatus::Draft)), None)
            .await
    }

    async fn page(&self, id: &str) -> Result<RemotePage> {
        let url = self.endpoint(&format!("v1/pages/{id}"))?;
        self.call("retrieve page", Method::GET, &url, None).await
    }

    #[instrument(skip_all, fields(page_id = %id))]
    async fn page_blocks(&self, id: &str) -> Result<Vec<RawBlock>> {
        let mut blocks = self.block_children(id).await?;

        for block in blocks.iter_mut().filter(|b| b.wants_children()) {
            block.children = self.block_children(&block.id).await?;
        }

        debug!(count = blocks.len(), "fetched page blocks");
        Ok(blocks)
    }

    fn extract_metadata(&self, page: &RemotePage) -> Result<PostMetadata> {
        properties::extract_metadata(page, &self.config.properties)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pagesmith_shared::{PropertyNames, RateLimitConfig, RetryConfig};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> ContentClient {
        ContentClient::new(ClientConfig {
            base_url: Url::parse(&server.uri()).unwrap(),
            api_version: "2022-06-28".into(),
            api_key: "test-token".into(),
            database_id: "db1".into(),
            timeout: Duration::from_secs(5),
            page_size: 100,
            properties: PropertyNames::default(),
            rate_limit: RateLimitConfig {
                max_requests: 1000,
                window_secs: 60,
            },
            retry: RetryConfig {
                max_retries: 3,
                base_delay_ms: 1,
                backoff_factor: 2.0,
                max_delay_ms: 5,
            },
        })
        .expect("build client")
    }

    fn page_json(id: &str, title: &str, publish_date: Option<&str>) -> Value {
        let date = match publish_date {
            Some(d) => json!({"type": "date", "date": {"start": d}}),
            None => json!({"type": "date", "date": null}),
        };
        json!({
            "object": "page",
            "id": id,
            "last_edited_time": "2024-03-01T10:00:00.000Z",
            "properties": {
                "Title": {"type": "title", "title": [{"plain_text": title}]},
                "Status": {"type": "select", "select": {"name": "Published"}},
                "Publish Date": date
            }
        })
    }

    #[tokio::test]
    async fn query_follows_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .and(body_partial_json(json!({"start_cursor": "cursor-2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("p3", "Three", Some("2024-01-03"))],
                "next_cursor": null,
                "has_more": false
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .and(header("authorization", "Bearer test-token"))
            .and(header("Notion-Version", "2022-06-28"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    page_json("p1", "One", Some("2024-01-01")),
                    page_json("p2", "Two", Some("2024-01-02"))
                ],
                "next_cursor": "cursor-2",
                "has_more": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pages = client.query_database(None, None).await.unwrap();
        let ids: Vec<_> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn transient_server_error_is_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/pages/p1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/pages/p1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_json("p1", "One", None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let page = client.page("p1").await.unwrap();
        assert_eq!(page.id, "p1");
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/pages/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "object": "error",
                "status": 404,
                "code": "object_not_found",
                "message": "Could not find page with ID: missing."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.page("missing").await.unwrap_err();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("Could not find page"));
    }

    #[tokio::test]
    async fn connection_test_reports_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/databases/db1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "unauthorized",
                "message": "API token is invalid."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.test_connection().await.unwrap_err();
        assert!(matches!(
            err,
            PagesmithError::Api {
                kind: pagesmith_shared::ApiErrorKind::Unauthorized,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn published_posts_backfill_and_filter() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .and(body_partial_json(json!({
                "filter": {"property": "Status", "select": {"equals": "Published"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    page_json("old", "Old", Some("2023-05-01")),
                    page_json("undated", "Undated", None),
                    page_json("future", "Future", Some("2999-01-01")),
                    page_json("newer", "Newer", Some("2024-02-01"))
                ],
                "next_cursor": null,
                "has_more": false
            })))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/v1/pages/undated"))
            .and(body_partial_json(json!({"properties": {"Publish Date": {"date": {}}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(
                "undated", "Undated", None,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let posts = client.published_posts().await.unwrap();
        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["undated", "newer", "old"]);

        let meta = client.extract_metadata(&posts[0]).unwrap();
        assert_eq!(
            meta.publish_date.map(|d| d.date_naive()),
            Some(Utc::now().date_naive())
        );
    }

    #[tokio::test]
    async fn failed_backfill_still_applies_in_memory() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("undated", "Undated", None)],
                "has_more": false
            })))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/v1/pages/undated"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "validation_error",
                "message": "Publish Date is not a property that exists."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let posts = client.published_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert!(client.publish_date_of(&posts[0]).is_some());
    }

    #[tokio::test]
    async fn page_blocks_fetches_list_item_children() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/blocks/page1/children"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"id": "b1", "type": "paragraph", "has_children": false,
                     "paragraph": {"rich_text": [{"plain_text": "Intro"}]}},
                    {"id": "b2", "type": "bulleted_list_item", "has_children": true,
                     "bulleted_list_item": {"rich_text": [{"plain_text": "Item"}]}},
                    {"id": "b3", "type": "toggle", "has_children": true,
                     "toggle": {"rich_text": []}}
                ],
                "next_cursor": null,
                "has_more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/blocks/b2/children"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"id": "c1", "type": "code", "has_children": false,
                     "code": {"language": "rust", "rich_text": [{"plain_text": "fn main() {}"}]}}
                ],
                "has_more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let blocks = client.page_blocks("page1").await.unwrap();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].children.is_empty());
        assert_eq!(blocks[1].children.len(), 1);
        assert_eq!(blocks[1].children[0].block_type, "code");
        // toggle children are never rendered, so never fetched
        assert!(blocks[2].children.is_empty());
    }
}
