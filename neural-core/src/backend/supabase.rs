//! Supabase (PostgREST) backend

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use tracing::debug;

use super::{BackendError, BackendResult, KeyValueBackend, Table};

/// Remote store speaking the PostgREST dialect exposed by Supabase
pub struct SupabaseBackend {
    client: Client,
    rest_base: String,
    api_key: String,
}

impl SupabaseBackend {
    /// Create a backend for the project at `url` authenticated with `api_key`
    pub fn new(url: &str, api_key: &str) -> BackendResult<Self> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| BackendError::Unavailable(format!("invalid Supabase URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackendError::Unavailable(format!(
                "unsupported Supabase URL scheme '{}'",
                parsed.scheme()
            )));
        }
        if api_key.trim().is_empty() {
            return Err(BackendError::Unavailable("Supabase API key is empty".to_string()));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rest_base: format!("{}/rest/v1", url.trim().trim_end_matches('/')),
            api_key: api_key.trim().to_string(),
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/{}", self.rest_base, table.name())
    }

    fn apply_headers(&self, req_builder: RequestBuilder) -> RequestBuilder {
        req_builder
            .header("apikey", self.api_key.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn check_status(response: Response) -> BackendResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(BackendError::Status { status, body })
    }
}

#[async_trait]
impl KeyValueBackend for SupabaseBackend {
    async fn get(&self, table: Table, key: &str) -> BackendResult<Option<serde_json::Value>> {
        debug!("Fetching {} row '{}'", table.name(), key);
        let filter = format!("eq.{}", key);
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("select", "*"), (table.key_column(), filter.as_str())]);

        let response = Self::check_status(self.apply_headers(request).send().await?).await?;
        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, table: Table, record: serde_json::Value) -> BackendResult<()> {
        let key = table.record_key(&record)?;
        debug!("Upserting {} row '{}'", table.name(), key);
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&record);

        Self::check_status(self.apply_headers(request).send().await?).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, key: &str) -> BackendResult<bool> {
        debug!("Deleting {} row '{}'", table.name(), key);
        let filter = format!("eq.{}", key);
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[(table.key_column(), filter.as_str())])
            .header("Prefer", "return=representation");

        let response = Self::check_status(self.apply_headers(request).send().await?).await?;
        let removed: Vec<serde_json::Value> = response.json().await?;
        Ok(!removed.is_empty())
    }
}
