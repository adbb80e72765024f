//! PostgREST client for a Supabase project.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{RemoteError, RemoteStore, RemoteTable};

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

/// Supabase REST client.
pub struct SupabaseRemote {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

impl SupabaseRemote {
    pub fn new(
        base_url: &str,
        anon_key: String,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            access_token,
        })
    }

    fn table_url(&self, table: RemoteTable) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    async fn check(response: Response) -> Result<Response, RemoteError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(status, message))
    }
}

#[async_trait]
impl RemoteStore for SupabaseRemote {
    async fn current_user(&self) -> Result<Option<String>, RemoteError> {
        if self.access_token.is_none() {
            return Ok(None);
        }
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self.authorized(self.client.get(&url)).send().await?;
        let user: AuthUser = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        Ok(Some(user.id))
    }

    async fn upsert(&self, table: RemoteTable, rows: Vec<Value>) -> Result<(), RemoteError> {
        if rows.is_empty() {
            return Ok(());
        }
        let count = rows.len();
        let request = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", table.key_column())])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows);
        let response = self.authorized(request).send().await?;
        Self::check(response).await?;
        debug!(table = table.as_str(), count, "upserted rows");
        Ok(())
    }

    async fn delete(&self, table: RemoteTable, id: &str, user_id: &str) -> Result<bool, RemoteError> {
        let key_filter = format!("eq.{}", id);
        let user_filter = format!("eq.{}", user_id);
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[
                (table.key_column(), key_filter.as_str()),
                ("user_id", user_filter.as_str()),
                ("select", table.key_column()),
            ])
            .header("Prefer", "return=representation");
        let response = self.authorized(request).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let deleted: Vec<Value> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        Ok(!deleted.is_empty())
    }

    async fn select_by_user(&self, table: RemoteTable, user_id: &str) -> Result<Vec<Value>, RemoteError> {
        let user_filter = format!("eq.{}", user_id);
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("user_id", user_filter.as_str()), ("select", "*")]);
        let response = self.authorized(request).send().await?;
        let rows: Vec<Value> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        debug!(table = table.as_str(), count = rows.len(), "selected rows");
        Ok(rows)
    }
}
