use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{api_error, Backend, BackendError};

impl Backend {
    /// PostgREST-style access to one hosted table.
    pub fn table(&self, name: &str) -> QueryBuilder {
        QueryBuilder {
            http: self.http.clone(),
            url: format!("{}/rest/v1/{}", self.base_url, name),
            anon_key: self.anon_key.clone(),
            token: None,
            query: Vec::new(),
        }
    }
}

/// Builder for a single request against `/rest/v1/{table}`.
/// Filters accumulate as query parameters (`col=eq.value`).
pub struct QueryBuilder {
    http: reqwest::Client,
    url: String,
    anon_key: String,
    token: Option<String>,
    query: Vec<(String, String)>,
}

impl QueryBuilder {
    /// Attach the caller's access token when there is one; the anon
    /// key is used otherwise.
    pub fn maybe_auth(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.query.push(("select".into(), columns.into()));
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lt(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "lt", value)
    }

    pub fn filter(mut self, column: &str, op: &str, value: impl ToString) -> Self {
        self.query
            .push((column.into(), format!("{op}.{}", value.to_string())));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let dir = if ascending { "asc" } else { "desc" };
        self.query.push(("order".into(), format!("{column}.{dir}")));
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.query.push(("limit".into(), n.to_string()));
        self
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let bearer = self.token.as_deref().unwrap_or(&self.anon_key);
        self.http
            .request(method, &self.url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .query(&self.query)
    }

    pub async fn fetch_all<T: DeserializeOwned>(self) -> Result<Vec<T>, BackendError> {
        let resp = self.request(reqwest::Method::GET).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// `maybe_single` semantics: zero rows is not an error.
    pub async fn fetch_optional<T: DeserializeOwned>(self) -> Result<Option<T>, BackendError> {
        let mut rows: Vec<T> = self.limit(1).fetch_all().await?;
        Ok(rows.pop())
    }

    /// Exact row count without fetching rows (HEAD + Content-Range).
    pub async fn count(self) -> Result<i64, BackendError> {
        let resp = self
            .request(reqwest::Method::HEAD)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let total = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        Ok(total)
    }

    /// Insert and return the stored representation.
    pub async fn insert<B: Serialize + ?Sized, R: DeserializeOwned>(
        self,
        rows: &B,
    ) -> Result<Vec<R>, BackendError> {
        let resp = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    pub async fn insert_minimal<B: Serialize + ?Sized>(self, rows: &B) -> Result<(), BackendError> {
        let resp = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    pub async fn update(self, patch: serde_json::Value) -> Result<(), BackendError> {
        let resp = self
            .request(reqwest::Method::PATCH)
            .header("Prefer", "return=minimal")
            .json(&patch)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    pub async fn delete(self) -> Result<(), BackendError> {
        let resp = self.request(reqwest::Method::DELETE).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }
}
