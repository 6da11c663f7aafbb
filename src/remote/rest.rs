//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了 PostgREST 风格的 HTTP 远程存储实现。

use super::RemoteStore;
use crate::config::RemoteConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// HTTP 远程存储
///
/// 表地址为 `{url}/rest/v1/{table}`，过滤条件使用 `column=eq.value` 查询参数。
#[derive(Clone)]
pub struct RestRemoteStore {
    client: reqwest::Client,
    base_url: String,
    auth_headers: HeaderMap,
    users_table: String,
    external_id_column: String,
}

impl RestRemoteStore {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        let auth_headers = build_auth_headers(config.api_key.expose_secret())?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_headers,
            users_table: config.users_table.clone(),
            external_id_column: config.external_id_column.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let text = response.text().await?;
            Err(CacheError::Remote(format!("HTTP {}: {}", status.as_u16(), text)))
        }
    }

    async fn expect_success(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await?;
            Err(CacheError::Remote(format!("HTTP {}: {}", status.as_u16(), text)))
        }
    }

    async fn select(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(self.table_url(table))
            .headers(self.auth_headers.clone())
            .query(query)
            .send()
            .await?;
        self.parse_response(response).await
    }

    async fn post_rows(&self, table: &str, body: &Value) -> Result<Vec<Value>> {
        let response = self
            .client
            .post(self.table_url(table))
            .headers(self.auth_headers.clone())
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        self.parse_response(response).await
    }
}

fn build_auth_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("apikey"),
        HeaderValue::from_str(api_key).map_err(|e| CacheError::ConfigError(e.to_string()))?,
    );
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| CacheError::ConfigError(e.to_string()))?,
    );
    Ok(headers)
}

fn first_id(rows: &[Value]) -> Option<String> {
    rows.first()
        .and_then(|row| row.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    #[instrument(skip(self), level = "debug")]
    async fn find_user(&self, external_id: &str) -> Result<Option<String>> {
        let rows = self
            .select(
                &self.users_table,
                &[
                    ("select", "id".to_string()),
                    (self.external_id_column.as_str(), format!("eq.{}", external_id)),
                ],
            )
            .await?;
        Ok(first_id(&rows))
    }

    #[instrument(skip(self), level = "debug")]
    async fn ensure_user(&self, external_id: &str) -> Result<String> {
        if let Some(user_id) = self.find_user(external_id).await? {
            return Ok(user_id);
        }

        debug!("Creating remote user record");
        let mut row = serde_json::Map::new();
        row.insert(
            self.external_id_column.clone(),
            Value::String(external_id.to_string()),
        );
        let rows = self
            .post_rows(&self.users_table, &Value::Object(row))
            .await?;
        first_id(&rows)
            .ok_or_else(|| CacheError::Remote("user insert returned no id".to_string()))
    }

    #[instrument(skip(self), level = "debug")]
    async fn has_accounts(&self, user_id: &str) -> Result<bool> {
        let rows = self
            .select(
                "accounts",
                &[
                    ("select", "id".to_string()),
                    ("user_id", format!("eq.{}", user_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    #[instrument(skip(self, row), level = "debug")]
    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let rows = self.post_rows(table, &row).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| CacheError::Remote(format!("insert into {} returned no rows", table)))
    }

    #[instrument(skip(self, rows), level = "debug", fields(count = rows.len()))]
    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.post_rows(table, &Value::Array(rows)).await
    }

    #[instrument(skip(self, patch), level = "debug")]
    async fn update(&self, table: &str, id: &str, user_id: &str, patch: Value) -> Result<()> {
        let response = self
            .client
            .patch(self.table_url(table))
            .headers(self.auth_headers.clone())
            .query(&[("id", format!("eq.{}", id)), ("user_id", format!("eq.{}", user_id))])
            .json(&patch)
            .send()
            .await?;
        self.expect_success(response).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, table: &str, id: &str, user_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.table_url(table))
            .headers(self.auth_headers.clone())
            .query(&[("id", format!("eq.{}", id)), ("user_id", format!("eq.{}", user_id))])
            .send()
            .await?;
        self.expect_success(response).await
    }

    fn name(&self) -> &str {
        "rest"
    }
}
