//! Elasticsearch-backed email index: schema management, document writes,
//! structured + full-text queries, partial updates, and an exhaustive scan
//! cursor for the reprocessing job.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    email::EmailDocument,
    error::{AppError, AppResult},
    server_config::SearchConfig,
    HttpClient,
};

const DEFAULT_SEARCH_SIZE: usize = 50;
const SCAN_PAGE_SIZE: usize = 500;
const SCROLL_KEEPALIVE: &str = "1m";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: Option<String>,
    pub folder: Option<String>,
    pub account: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// One ranked hit, flattened for API responses:
/// `{id, ...document fields, highlight}`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(flatten)]
    pub doc: EmailDocument,
    pub highlight: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct EsHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: EmailDocument,
    #[serde(default)]
    highlight: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct EsHits {
    hits: Vec<EsHit>,
}

#[derive(Debug, Deserialize)]
struct EsSearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: EsHits,
}

#[derive(Debug, Deserialize)]
struct EsIndexResponse {
    #[serde(rename = "_id")]
    id: String,
}

/// Builds the `bool`/`must` conjunction for the supplied filters. A text
/// query matches across subject/body/from/to; no clauses at all falls back to
/// `match_all`.
pub fn build_search_query(params: &SearchParams, size: usize) -> Value {
    let mut must: Vec<Value> = Vec::new();

    if let Some(query) = params.query.as_ref().filter(|q| !q.trim().is_empty()) {
        must.push(json!({
            "multi_match": {
                "query": query,
                "fields": ["subject", "body", "from", "to"]
            }
        }));
    }

    if let Some(folder) = &params.folder {
        must.push(json!({ "term": { "folder": folder } }));
    }

    if let Some(account) = &params.account {
        must.push(json!({ "term": { "account": account } }));
    }

    if params.start_date.is_some() || params.end_date.is_some() {
        let mut range = serde_json::Map::new();
        if let Some(start) = &params.start_date {
            range.insert("gte".to_string(), json!(start));
        }
        if let Some(end) = &params.end_date {
            range.insert("lte".to_string(), json!(end));
        }
        must.push(json!({ "range": { "date": range } }));
    }

    let query = if must.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "bool": { "must": must } })
    };

    json!({
        "size": size,
        "query": query,
        "highlight": {
            "fields": { "subject": {}, "body": {} }
        }
    })
}

fn index_mappings() -> Value {
    json!({
        "mappings": {
            "properties": {
                "from": { "type": "text" },
                "to": { "type": "text" },
                "subject": { "type": "text" },
                "body": { "type": "text" },
                "folder": { "type": "keyword" },
                "account": { "type": "keyword" },
                "date": { "type": "date" },
                "category": { "type": "keyword" },
                "suggestedReply": { "type": "text" }
            }
        }
    })
}

/// Owns the one logical collection of email documents.
#[derive(Clone)]
pub struct SearchStore {
    http_client: HttpClient,
    node: String,
    index: String,
}

impl SearchStore {
    pub fn new(http_client: HttpClient, config: &SearchConfig) -> Self {
        SearchStore {
            http_client,
            node: config.node.trim_end_matches('/').to_string(),
            index: config.index.clone(),
        }
    }

    fn index_url(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.node, self.index, suffix)
    }

    /// Idempotent create-if-absent of the field schema. Losing the creation
    /// race ("already exists") counts as success, so concurrent callers all
    /// observe one logical schema.
    pub async fn ensure_schema(&self) -> AppResult<()> {
        let head = self
            .http_client
            .head(self.index_url(""))
            .send()
            .await?;
        if head.status().is_success() {
            tracing::debug!(index = %self.index, "Search index already exists");
            return Ok(());
        }

        let resp = self
            .http_client
            .put(self.index_url(""))
            .json(&index_mappings())
            .send()
            .await?;

        if resp.status().is_success() {
            tracing::info!(index = %self.index, "Search index created");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        if body.contains("resource_already_exists_exception") {
            tracing::debug!(index = %self.index, "Search index created concurrently");
            return Ok(());
        }

        Err(AppError::SearchStore(format!(
            "index creation failed: {body}"
        )))
    }

    /// Inserts a document and waits for it to become searchable before
    /// returning its store-assigned id.
    pub async fn index(&self, doc: &EmailDocument) -> AppResult<String> {
        let resp = self
            .http_client
            .post(self.index_url("/_doc"))
            .query(&[("refresh", "wait_for")])
            .json(doc)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let created = resp.json::<EsIndexResponse>().await?;
        Ok(created.id)
    }

    /// Patches only the given fields, leaving the rest of the document
    /// untouched.
    pub async fn update(&self, id: &str, partial_fields: Value) -> AppResult<()> {
        let resp = self
            .http_client
            .post(self.index_url(&format!("/_update/{id}")))
            .query(&[("refresh", "wait_for")])
            .json(&json!({ "doc": partial_fields }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    /// Ranked search over the supplied filters, with highlight fragments for
    /// subject/body where the text query matched.
    pub async fn search(&self, params: &SearchParams) -> AppResult<Vec<SearchHit>> {
        let resp = self
            .http_client
            .post(self.index_url("/_search"))
            .json(&build_search_query(params, DEFAULT_SEARCH_SIZE))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let parsed = resp.json::<EsSearchResponse>().await?;
        Ok(parsed.hits.hits.into_iter().map(into_hit).collect())
    }

    /// Exhaustive retrieval of every document via the scroll cursor. A single
    /// bounded search page is not enough for the reprocessing job.
    pub async fn scan_all(&self) -> AppResult<Vec<SearchHit>> {
        let resp = self
            .http_client
            .post(self.index_url("/_search"))
            .query(&[("scroll", SCROLL_KEEPALIVE)])
            .json(&json!({
                "size": SCAN_PAGE_SIZE,
                "query": { "match_all": {} }
            }))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let mut page = resp.json::<EsSearchResponse>().await?;

        let mut out: Vec<SearchHit> = Vec::new();
        let mut scroll_id = None;
        loop {
            let batch = page.hits.hits;
            scroll_id = page.scroll_id.or(scroll_id);
            if batch.is_empty() {
                break;
            }
            out.extend(batch.into_iter().map(into_hit));

            let Some(id) = scroll_id.as_ref() else {
                break;
            };
            let resp = self
                .http_client
                .post(format!("{}/_search/scroll", self.node))
                .json(&json!({
                    "scroll": SCROLL_KEEPALIVE,
                    "scroll_id": id
                }))
                .send()
                .await?;
            let resp = check_status(resp).await?;
            page = resp.json::<EsSearchResponse>().await?;
        }

        if let Some(id) = scroll_id {
            // Frees the server-side scroll context early; ignore failures.
            let _ = self
                .http_client
                .delete(format!("{}/_search/scroll", self.node))
                .json(&json!({ "scroll_id": [id] }))
                .send()
                .await;
        }

        Ok(out)
    }
}

fn into_hit(hit: EsHit) -> SearchHit {
    SearchHit {
        id: hit.id,
        doc: hit.source,
        highlight: hit.highlight,
    }
}

async fn check_status(resp: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(AppError::SearchStore(format!("{status}: {body}")))
}
