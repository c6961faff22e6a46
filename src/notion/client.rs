use crate::config::{Config, NotionConfig, PropertyNames};
use crate::notion::api_types::{
  ApiBlock, ApiError, ApiList, ApiObjectRef, ApiPage, ApiQueryRequest,
};
use crate::notion::types::RemoteItem;
use crate::notion::Workspace;
use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

/// Notion API client wrapper
#[derive(Clone)]
pub struct NotionClient {
  http: reqwest::Client,
  base_url: Url,
  properties: PropertyNames,
}

impl NotionClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;
    Self::with_token(&config.notion, &token)
  }

  pub fn with_token(config: &NotionConfig, token: &str) -> Result<Self> {
    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
      .map_err(|e| eyre!("Invalid Notion token: {}", e))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create Notion client: {}", e))?;

    // Url::join drops the last segment unless the base ends with a slash
    let base = if config.base_url.ends_with('/') {
      config.base_url.clone()
    } else {
      format!("{}/", config.base_url)
    };
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid Notion URL {}: {}", config.base_url, e))?;

    Ok(Self {
      http,
      base_url,
      properties: config.properties.clone(),
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))
  }

  /// Send a request and decode the JSON body, turning non-2xx into errors.
  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T> {
    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Failed to {}: {}", action, e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      let detail = match serde_json::from_str::<ApiError>(&body) {
        Ok(err) => format!("{} ({})", err.message, err.code),
        Err(_) => body,
      };
      return Err(eyre!("Failed to {}: HTTP {}: {}", action, status, detail));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| eyre!("Failed to parse response to {}: {}", action, e))
  }

  /// Get a block, `None` for partial block objects
  async fn get_block(&self, block_id: &str) -> Result<Option<ApiBlock>> {
    let url = self.endpoint(&format!("blocks/{}", block_id))?;
    let block: ApiBlock = self
      .send(self.http.get(url), &format!("get block {}", block_id))
      .await?;

    Ok(block.is_full().then_some(block))
  }

  /// Get the IDs of every child database directly under a block
  pub async fn get_child_database_ids(&self, block_id: &str) -> Result<Vec<String>> {
    let mut database_ids = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
      let mut url = self.endpoint(&format!("blocks/{}/children", block_id))?;
      {
        let mut query = url.query_pairs_mut();
        query.append_pair("page_size", &PAGE_SIZE.to_string());
        if let Some(c) = &cursor {
          query.append_pair("start_cursor", c);
        }
      }

      let response: ApiList<ApiBlock> = self
        .send(
          self.http.get(url),
          &format!("list children of {}", block_id),
        )
        .await?;

      database_ids.extend(
        response
          .results
          .into_iter()
          .filter(ApiBlock::is_child_database)
          .map(|block| block.id),
      );

      match response.next_cursor {
        Some(next) if response.has_more => cursor = Some(next),
        _ => break,
      }
    }

    Ok(database_ids)
  }

  /// Get the IDs of every row in a database
  pub async fn get_database_page_ids(&self, database_id: &str) -> Result<Vec<String>> {
    let url = self.endpoint(&format!("databases/{}/query", database_id))?;
    let mut page_ids = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
      let body = ApiQueryRequest {
        page_size: PAGE_SIZE,
        start_cursor: cursor.as_deref(),
      };

      let response: ApiList<ApiObjectRef> = self
        .send(
          self.http.post(url.clone()).json(&body),
          &format!("query database {}", database_id),
        )
        .await?;

      page_ids.extend(response.results.into_iter().map(|row| row.id));

      match response.next_cursor {
        Some(next) if response.has_more => cursor = Some(next),
        _ => break,
      }
    }

    Ok(page_ids)
  }

  /// Get a page as a tracked item, `None` for partial page objects
  pub async fn get_page(&self, page_id: &str) -> Result<Option<RemoteItem>> {
    let url = self.endpoint(&format!("pages/{}", page_id))?;
    let page: ApiPage = self
      .send(self.http.get(url), &format!("get page {}", page_id))
      .await?;

    let item = page.into_remote_item(&self.properties);
    if item.is_none() {
      debug!(page_id, "Skipping partially loaded page");
    }
    Ok(item)
  }

  async fn update_page_properties(&self, page_id: &str, properties: Value) -> Result<()> {
    let url = self.endpoint(&format!("pages/{}", page_id))?;
    let body = json!({ "properties": properties });

    self
      .send::<Value>(
        self.http.patch(url).json(&body),
        &format!("update page {}", page_id),
      )
      .await?;

    Ok(())
  }

  /// Set the status checkbox of a page
  pub async fn update_page_checkbox(&self, page_id: &str, checked: bool) -> Result<()> {
    let mut properties = serde_json::Map::new();
    properties.insert(
      self.properties.status.clone(),
      json!({ "checkbox": checked }),
    );
    self
      .update_page_properties(page_id, Value::Object(properties))
      .await
  }

  /// Set the "last modified" date property of a page (date only, no time)
  pub async fn update_page_date(&self, page_id: &str, date: NaiveDate) -> Result<()> {
    let mut properties = serde_json::Map::new();
    properties.insert(
      self.properties.last_modified.clone(),
      json!({ "date": { "start": date.format("%Y-%m-%d").to_string() } }),
    );
    self
      .update_page_properties(page_id, Value::Object(properties))
      .await
  }
}

impl Workspace for NotionClient {
  async fn block_last_edited(&self, block_id: &str) -> Result<Option<DateTime<Utc>>> {
    Ok(
      self
        .get_block(block_id)
        .await?
        .and_then(|block| block.last_edited_time),
    )
  }

  async fn child_database_ids(&self, block_id: &str) -> Result<Vec<String>> {
    self.get_child_database_ids(block_id).await
  }

  async fn database_page_ids(&self, database_id: &str) -> Result<Vec<String>> {
    self.get_database_page_ids(database_id).await
  }

  async fn page(&self, page_id: &str) -> Result<Option<RemoteItem>> {
    self.get_page(page_id).await
  }

  async fn set_checkbox(&self, page_id: &str, checked: bool) -> Result<()> {
    self.update_page_checkbox(page_id, checked).await
  }

  async fn set_last_modified(&self, page_id: &str, date: NaiveDate) -> Result<()> {
    self.update_page_date(page_id, date).await
  }
}
