//! Notion REST client — schema validation, task queries, status mutations.
//!
//! Queries filter server-side (due date equals the requested day, status not
//! already done) as an optimization only; aggregation re-derives completion
//! from the fetched rows as the source of truth.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::coordinator::TaskSource;
use crate::types::{QueryConfig, Task, UNTITLED_FALLBACK};

use super::properties::PropertyValue;
use super::{send_with_retry, NotionError, RetryPolicy, NOTION_API_BASE, NOTION_VERSION};

/// Property name → underlying type, from the database object.
type Schema = HashMap<String, String>;

#[derive(Debug, Deserialize)]
struct DatabaseObject {
    #[serde(default)]
    properties: HashMap<String, SchemaProperty>,
}

#[derive(Debug, Clone, Deserialize)]
struct SchemaProperty {
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    /// Rows stay raw here so one malformed page degrades alone instead of
    /// failing the whole batch.
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

/// Notion REST API client. One instance serves every surface; database
/// schemas are fetched once and memoized per database.
pub struct NotionClient {
    http: reqwest::Client,
    retry: RetryPolicy,
    schemas: tokio::sync::Mutex<HashMap<String, Schema>>,
}

impl Default for NotionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NotionClient {
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            retry,
            schemas: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
    }

    /// Fetch (or reuse) the property schema for the configured database.
    async fn database_schema(&self, config: &QueryConfig) -> Result<Schema, NotionError> {
        {
            let cache = self.schemas.lock().await;
            if let Some(schema) = cache.get(&config.database_id) {
                return Ok(schema.clone());
            }
        }

        let url = format!("{}/databases/{}", NOTION_API_BASE, config.database_id);
        let resp = send_with_retry(
            self.request(reqwest::Method::GET, &url, &config.token),
            &self.retry,
        )
        .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(NotionError::Config(format!(
                "Database {} not found or not shared with the integration",
                config.database_id
            )));
        }
        let resp = error_for_status(resp).await?;

        let database: DatabaseObject = resp.json().await?;
        let schema: Schema = database
            .properties
            .into_iter()
            .map(|(name, prop)| (name, prop.kind))
            .collect();

        self.schemas
            .lock()
            .await
            .insert(config.database_id.clone(), schema.clone());
        Ok(schema)
    }
}

#[async_trait]
impl TaskSource for NotionClient {
    async fn fetch_tasks(
        &self,
        config: &QueryConfig,
        for_date: NaiveDate,
    ) -> Result<Vec<Task>, NotionError> {
        let schema = self.database_schema(config).await?;
        validate_config(&schema, config)?;

        let status_kind = schema
            .get(&config.status_property)
            .cloned()
            .unwrap_or_default();
        let filter = build_query_filter(config, &status_kind, for_date);

        let url = format!(
            "{}/databases/{}/query",
            NOTION_API_BASE, config.database_id
        );
        let mut tasks = Vec::new();
        let mut start_cursor: Option<String> = None;

        loop {
            let mut body = json!({ "filter": filter, "page_size": 100 });
            if let Some(cursor) = &start_cursor {
                body["start_cursor"] = json!(cursor);
            }

            let resp = send_with_retry(
                self.request(reqwest::Method::POST, &url, &config.token)
                    .json(&body),
                &self.retry,
            )
            .await?;
            let resp = error_for_status(resp).await?;
            let page: QueryResponse = resp.json().await?;

            for row in &page.results {
                match page_to_task(row, config) {
                    Some(task) => tasks.push(task),
                    None => log::warn!("notion query: skipping malformed page object"),
                }
            }

            start_cursor = if page.has_more { page.next_cursor } else { None };
            if start_cursor.is_none() {
                break;
            }
        }

        log::debug!("notion query: {} tasks due {}", tasks.len(), for_date);
        Ok(tasks)
    }

    async fn update_status(
        &self,
        config: &QueryConfig,
        task_id: &str,
        new_value: &str,
    ) -> Result<(), NotionError> {
        let schema = self.database_schema(config).await?;
        check_property(&schema, &config.status_property, &["status", "select"])?;
        let status_kind = schema
            .get(&config.status_property)
            .cloned()
            .unwrap_or_default();

        let url = format!("{}/pages/{}", NOTION_API_BASE, task_id);
        let body = build_status_patch(&config.status_property, &status_kind, new_value);

        let resp = send_with_retry(
            self.request(reqwest::Method::PATCH, &url, &config.token)
                .json(&body),
            &self.retry,
        )
        .await?;
        error_for_status(resp).await?;
        log::info!("notion: marked page {} as {}", task_id, new_value);
        Ok(())
    }
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, NotionError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(NotionError::Config(
            "Notion token was rejected (unauthorized)".to_string(),
        ));
    }
    let message = resp.text().await.unwrap_or_default();
    Err(NotionError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Every configured property must exist in the schema with an underlying
/// type extraction can handle.
fn validate_config(schema: &Schema, config: &QueryConfig) -> Result<(), NotionError> {
    check_property(schema, &config.status_property, &["status", "select"])?;
    check_property(schema, &config.date_property, &["date"])?;
    for name in [
        &config.priority_property,
        &config.pillar_property,
        &config.project_property,
    ] {
        check_property(schema, name, &["select", "multi_select", "rich_text", "status"])?;
    }
    Ok(())
}

fn check_property(schema: &Schema, name: &str, accepted: &[&str]) -> Result<(), NotionError> {
    match schema.get(name) {
        None => Err(NotionError::Config(format!(
            "Property \"{}\" does not exist in the database",
            name
        ))),
        Some(kind) if accepted.contains(&kind.as_str()) => Ok(()),
        Some(kind) => Err(NotionError::Config(format!(
            "Property \"{}\" has type \"{}\", expected {}",
            name,
            kind,
            accepted.join(" or ")
        ))),
    }
}

/// Compound query filter: due date equals the requested day, status not
/// already done. The status clause key depends on the property's actual
/// type (`status` vs `select`).
fn build_query_filter(config: &QueryConfig, status_kind: &str, for_date: NaiveDate) -> Value {
    let status_key = if status_kind == "select" { "select" } else { "status" };
    let mut status_clause = serde_json::Map::new();
    status_clause.insert("property".to_string(), json!(config.status_property));
    status_clause.insert(
        status_key.to_string(),
        json!({ "does_not_equal": config.done_value }),
    );

    json!({
        "and": [
            {
                "property": config.date_property,
                "date": { "equals": for_date.format("%Y-%m-%d").to_string() }
            },
            Value::Object(status_clause),
        ]
    })
}

fn build_status_patch(status_property: &str, status_kind: &str, new_value: &str) -> Value {
    let status_key = if status_kind == "select" { "select" } else { "status" };
    let mut prop = serde_json::Map::new();
    prop.insert(status_key.to_string(), json!({ "name": new_value }));
    let mut properties = serde_json::Map::new();
    properties.insert(status_property.to_string(), Value::Object(prop));
    json!({ "properties": Value::Object(properties) })
}

/// Assemble one Task from a raw page object. Malformed individual
/// properties degrade to absent; only a page without an id is dropped.
fn page_to_task(row: &Value, config: &QueryConfig) -> Option<Task> {
    let id = row.get("id")?.as_str()?.to_string();
    if id.is_empty() {
        return None;
    }
    let props = row.get("properties").and_then(Value::as_object);

    let title = props
        .and_then(extract_title)
        .unwrap_or_else(|| UNTITLED_FALLBACK.to_string());

    Some(Task {
        id,
        title,
        priority: extract_property(props, &config.priority_property),
        status: extract_property(props, &config.status_property),
        pillar: extract_property(props, &config.pillar_property),
        project: extract_property(props, &config.project_property),
        due: extract_property(props, &config.date_property),
        url: row.get("url").and_then(Value::as_str).map(str::to_string),
    })
}

fn extract_property(
    props: Option<&serde_json::Map<String, Value>>,
    name: &str,
) -> Option<String> {
    let value = props?.get(name)?;
    serde_json::from_value::<PropertyValue>(value.clone())
        .ok()?
        .extract()
}

/// The page title lives in whichever property carries the `title` type.
fn extract_title(props: &serde_json::Map<String, Value>) -> Option<String> {
    props
        .values()
        .find(|v| v.get("type").and_then(Value::as_str) == Some("title"))
        .and_then(|v| serde_json::from_value::<PropertyValue>(v.clone()).ok())
        .and_then(|p| p.extract())
}
