//! reqwest clients for the mood, affirmation and speech services.

use super::{
    AffirmationRequest, AffirmationResponse, AffirmationService, MoodRequest, MoodResponse,
    MoodService, SpeechOutput, SpeechRequest, SpeechSynthesizer,
};
use crate::error::ServiceError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header::CONTENT_TYPE, Client, Response};
use serde::Serialize;
use serde_json::Value;

/// Longest error body we keep from a failed response.
const MAX_ERROR_BODY: usize = 300;

/// One POST endpoint of the AI function host.
#[derive(Clone)]
pub struct HttpEndpoint {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(Client::new(), url, api_key)
    }

    pub fn with_client(client: Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post_json<B: Serialize + ?Sized>(&self, body: &B) -> Result<Response, ServiceError> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| message.is_char_boundary(*i))
                    .unwrap_or(0);
                message.truncate(cut);
            }
            return Err(ServiceError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

fn reported_failure(error: Option<String>) -> ServiceError {
    ServiceError::InvalidResponse(
        error.unwrap_or_else(|| "service reported success=false".to_string()),
    )
}

#[async_trait]
impl MoodService for HttpEndpoint {
    async fn analyze(&self, request: &MoodRequest) -> Result<MoodResponse, ServiceError> {
        let response: MoodResponse = self
            .post_json(request)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        if !response.success {
            return Err(reported_failure(response.error));
        }
        Ok(response)
    }
}

#[async_trait]
impl AffirmationService for HttpEndpoint {
    async fn generate(
        &self,
        request: &AffirmationRequest,
    ) -> Result<AffirmationResponse, ServiceError> {
        let response: AffirmationResponse = self
            .post_json(request)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        if !response.success {
            return Err(reported_failure(response.error));
        }
        Ok(response)
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpEndpoint {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechOutput, ServiceError> {
        let response = self.post_json(request).await?;

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        if is_json {
            let json: Value = response
                .json()
                .await
                .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
            return parse_speech_json(&json);
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ServiceError::InvalidResponse("empty audio body".to_string()));
        }
        Ok(SpeechOutput::Audio(bytes.to_vec()))
    }
}

fn parse_speech_json(json: &Value) -> Result<SpeechOutput, ServiceError> {
    if json.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(reported_failure(
            json.get("error").and_then(Value::as_str).map(str::to_string),
        ));
    }

    if let Some(url) = json.get("audio_url").and_then(Value::as_str) {
        return Ok(SpeechOutput::Stored {
            audio_url: url.to_string(),
        });
    }

    if let Some(encoded) = json.get("audio_base64").and_then(Value::as_str) {
        let audio = STANDARD
            .decode(encoded)
            .map_err(|e| ServiceError::InvalidResponse(format!("bad base64 audio: {}", e)))?;
        if audio.is_empty() {
            return Err(ServiceError::InvalidResponse("empty audio body".to_string()));
        }
        return Ok(SpeechOutput::Audio(audio));
    }

    Err(ServiceError::InvalidResponse(
        "speech response carried neither audio_url nor audio_base64".to_string(),
    ))
}
