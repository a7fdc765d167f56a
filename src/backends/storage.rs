use super::ObjectStorage;
use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Bucket-based object storage reached over its REST API.
#[derive(Clone)]
pub struct HttpObjectStorage {
    client: Client,
    base_url: String,
    bucket: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

impl HttpObjectStorage {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key).header("apikey", key),
            None => request,
        }
    }

    fn object_url(&self, kind: &str, path: &str) -> String {
        format!(
            "{}/object/{}{}/{}",
            self.base_url,
            kind,
            self.bucket,
            path.trim_start_matches('/')
        )
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ServiceError::Http {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ServiceError> {
        let request = self
            .client
            .post(self.object_url("", path))
            .header(CONTENT_TYPE, content_type)
            .body(bytes);

        check(self.authorized(request).send().await?).await?;
        Ok(path.to_string())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<String, ServiceError> {
        let request = self
            .client
            .post(self.object_url("sign/", path))
            .json(&json!({ "expiresIn": ttl.as_secs() }));

        let response = check(self.authorized(request).send().await?).await?;
        let signed: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        if signed.signed_url.starts_with("http://") || signed.signed_url.starts_with("https://") {
            Ok(signed.signed_url)
        } else {
            Ok(format!(
                "{}/{}",
                self.base_url,
                signed.signed_url.trim_start_matches('/')
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_urls() {
        let storage = HttpObjectStorage::new("http://host/storage/v1/", "audio", None);
        assert_eq!(
            storage.object_url("", "u1/10_affirmation"),
            "http://host/storage/v1/object/audio/u1/10_affirmation"
        );
        assert_eq!(
            storage.object_url("sign/", "/u1/10_affirmation"),
            "http://host/storage/v1/object/sign/audio/u1/10_affirmation"
        );
    }
}
