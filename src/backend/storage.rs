use bytes::Bytes;

use super::{api_error, Backend, BackendError};

impl Backend {
    /// Upload an object into the assets bucket, overwriting any
    /// previous object at the same path.
    pub async fn upload_object(
        &self,
        token: Option<&str>,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let bearer = token.unwrap_or(&self.anon_key);
        let resp = self
            .http
            .post(format!(
                "{}/storage/v1/object/{}/{}",
                self.base_url, self.assets_bucket, path
            ))
            .header("apikey", &self.anon_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .bearer_auth(bearer)
            .body(bytes)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    pub async fn remove_object(&self, token: Option<&str>, path: &str) -> Result<(), BackendError> {
        let bearer = token.unwrap_or(&self.anon_key);
        let resp = self
            .http
            .delete(format!(
                "{}/storage/v1/object/{}/{}",
                self.base_url, self.assets_bucket, path
            ))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.assets_bucket, path
        )
    }

    /// Recover the object path from a stored public URL, so an old
    /// photo can be removed when replaced.
    pub fn object_path_from_public_url(&self, url: &str) -> Option<String> {
        let marker = format!("/storage/v1/object/public/{}/", self.assets_bucket);
        url.find(&marker)
            .map(|idx| url[idx + marker.len()..].to_string())
            .filter(|p| !p.is_empty())
    }
}
