//! Gemini Provider Implementation
//!
//! Fills an [`ExtractionResult`] through the Gemini `generateContent` REST
//! API. Fields whose bindings are identical share one request; every request
//! carries the rendered prompt followed by the message assets.
//!
//! # Examples
//!
//! ```no_run
//! use tally_llm::{GeminiProvider, PromptLibrary};
//!
//! let provider = GeminiProvider::new("api-key", PromptLibrary::builtin());
//! ```

use crate::parser::parse_fields;
use crate::prompt::PromptLibrary;
use crate::LlmError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tally_domain::traits::ExtractionProvider;
use tally_domain::{Asset, AssetPayload, ExtractionResult, Field, FieldBinding, FieldBindings};
use tracing::{debug, info};

/// Default Gemini API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API provider
///
/// No retry and no client-side timeout: both are left to the caller.
pub struct GeminiProvider {
    endpoint: String,
    api_key: String,
    prompts: PromptLibrary,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiProvider {
    /// Create a new Gemini provider against the public endpoint
    pub fn new(api_key: impl Into<String>, prompts: PromptLibrary) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            prompts,
            client: reqwest::Client::new(),
        }
    }

    /// Point the provider at a different endpoint (proxies, tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the request body for one binding group
    fn build_request<'a>(
        prompt: &'a str,
        assets: &'a [Asset],
        binding: &FieldBinding,
    ) -> GenerateRequest<'a> {
        let mut parts = Vec::with_capacity(assets.len() + 1);
        parts.push(Part::Text { text: prompt });
        for asset in assets {
            parts.push(match &asset.payload {
                AssetPayload::Text(text) => Part::Text { text },
                AssetPayload::Bytes(bytes) => Part::Inline {
                    inline_data: InlineData {
                        mime_type: &asset.mime_type,
                        data: BASE64.encode(bytes),
                    },
                },
            });
        }

        GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: binding.temperature,
                top_k: binding.top_k,
                response_mime_type: "application/json",
            },
        }
    }

    /// Call generateContent for one group of fields and return its raw text
    async fn generate(
        &self,
        binding: &FieldBinding,
        fields: &[Field],
        assets: &[Asset],
    ) -> Result<String, LlmError> {
        let prompt = self.prompts.render(&binding.prompt, fields)?;
        let body = Self::build_request(&prompt, assets, binding);
        let url = format!("{}/models/{}:generateContent", self.endpoint, binding.model);

        debug!(
            "Requesting {:?} from {} (prompt '{}', {} assets)",
            fields,
            binding.model,
            binding.prompt,
            assets.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Communication(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LlmError::ModelNotAvailable(binding.model.clone()));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Communication(format!("HTTP {}: {}", status, error_text)));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        candidate_text(parsed)
    }
}

/// Concatenated text of the first candidate
fn candidate_text(response: GenerateResponse) -> Result<String, LlmError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::InvalidResponse("Empty candidate".to_string()));
    }
    Ok(text)
}

/// Combine the replies of all binding groups into one result.
///
/// Each reply contributes only the keys its group asked for. Any reply that
/// does not parse fails the whole extraction.
fn merge_groups(replies: &[(Vec<Field>, String)]) -> Result<ExtractionResult, LlmError> {
    let mut merged = Map::new();
    for (fields, text) in replies {
        merged.extend(parse_fields(text, fields)?);
    }

    serde_json::from_value(Value::Object(merged))
        .map_err(|e| LlmError::InvalidResponse(format!("Unusable extraction: {}", e)))
}

#[async_trait]
impl ExtractionProvider for GeminiProvider {
    type Error = LlmError;

    async fn extract(
        &self,
        assets: &[Asset],
        bindings: &FieldBindings,
    ) -> Result<ExtractionResult, Self::Error> {
        let mut replies = Vec::new();
        for (binding, fields) in bindings.groups() {
            let text = self.generate(binding, &fields, assets).await?;
            replies.push((fields, text));
        }

        let result = merge_groups(&replies)?;

        info!(
            "Extracted {} positions, spend {} {}",
            result.positions.len(),
            result.spend,
            result.currency
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_domain::AssetKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn receipt_replies() -> Vec<(Vec<Field>, String)> {
        vec![
            (
                vec![Field::Currency],
                r#"{"currency":"THB","spend":999}"#.to_string(),
            ),
            (
                vec![Field::Spend, Field::Positions],
                "```json\n{\"spend\":0,\"positions\":[{\"name\":\"milk\",\"price\":30},{\"name\":\"bread\",\"price\":20}]}\n```"
                    .to_string(),
            ),
            (
                vec![Field::CashierName],
                r#"{"cachier":"Anna","currency":"USD"}"#.to_string(),
            ),
        ]
    }

    fn split_bindings() -> FieldBindings {
        FieldBindings::empty()
            .bind(Field::Currency, FieldBinding::new("currency", "m-currency"))
            .bind(Field::Spend, FieldBinding::new("receipt", "m-receipt"))
            .bind(Field::Positions, FieldBinding::new("receipt", "m-receipt"))
            .bind(Field::CashierName, FieldBinding::new("cachier", "m-cashier"))
    }

    fn candidate(text: &str) -> String {
        serde_json::json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}).to_string()
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answer generateContent calls with canned (status, body) pairs keyed by model
    async fn serve(replies: Vec<(&'static str, u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let replies = replies.clone();
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    let (status, body) = replies
                        .iter()
                        .find(|(model, _, _)| request.contains(&format!("/models/{}:", model)))
                        .map(|(_, status, body)| (*status, body.clone()))
                        .unwrap_or((404, String::new()));

                    let response = format!(
                        "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_merge_groups_takes_only_requested_keys() {
        let result = merge_groups(&receipt_replies()).unwrap();

        // Keys outside a group's request are ignored
        assert_eq!(result.currency, "THB");
        assert_eq!(result.spend, 0.0);
        assert_eq!(result.cashier_name, "Anna");
        assert_eq!(result.positions.len(), 2);
        assert_eq!(result.positions[1].name, "bread");
        assert_eq!(result.total(), 50.0);
    }

    #[test]
    fn test_merge_groups_fails_on_any_bad_reply() {
        let mut replies = receipt_replies();
        replies[2].1 = "The cashier was Anna.".to_string();
        assert!(matches!(
            merge_groups(&replies),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_merge_groups_rejects_unusable_values() {
        let replies = vec![(vec![Field::Positions], r#"{"positions":"many"}"#.to_string())];
        assert!(matches!(
            merge_groups(&replies),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_merges_every_group() {
        let [currency, receipt, cashier]: [(Vec<Field>, String); 3] =
            receipt_replies().try_into().unwrap();
        let endpoint = serve(vec![
            ("m-currency", 200, candidate(&currency.1)),
            ("m-receipt", 200, candidate(&receipt.1)),
            ("m-cashier", 200, candidate(&cashier.1)),
        ])
        .await;

        let provider =
            GeminiProvider::new("key", PromptLibrary::builtin()).with_endpoint(endpoint);
        let result = provider
            .extract(&[Asset::text("milk 30, bread 20")], &split_bindings())
            .await
            .unwrap();

        assert_eq!(result.currency, "THB");
        assert_eq!(result.cashier_name, "Anna");
        assert_eq!(result.positions.len(), 2);
    }

    #[tokio::test]
    async fn test_extract_fails_whole_when_last_group_fails() {
        let endpoint = serve(vec![
            ("m-currency", 200, candidate(r#"{"currency":"THB"}"#)),
            ("m-receipt", 200, candidate(r#"{"spend":100,"positions":[]}"#)),
            ("m-cashier", 500, r#"{"error":"overloaded"}"#.to_string()),
        ])
        .await;

        let provider =
            GeminiProvider::new("key", PromptLibrary::builtin()).with_endpoint(endpoint);
        let result = provider
            .extract(&[Asset::text("100 THB")], &split_bindings())
            .await;

        assert!(matches!(result, Err(LlmError::Communication(msg)) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_extract_unknown_model() {
        let endpoint = serve(vec![]).await;
        let provider =
            GeminiProvider::new("key", PromptLibrary::builtin()).with_endpoint(endpoint);
        let result = provider
            .extract(&[Asset::text("x")], &split_bindings())
            .await;
        assert!(matches!(result, Err(LlmError::ModelNotAvailable(m)) if m == "m-currency"));
    }

    #[test]
    fn test_gemini_provider_creation() {
        let provider = GeminiProvider::new("key", PromptLibrary::builtin());
        assert_eq!(provider.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(provider.api_key, "key");
    }

    #[test]
    fn test_with_endpoint_trims_slash() {
        let provider = GeminiProvider::new("key", PromptLibrary::builtin())
            .with_endpoint("http://localhost:8080/v1beta/");
        assert_eq!(provider.endpoint, "http://localhost:8080/v1beta");
    }

    #[test]
    fn test_request_body_shape() {
        let assets = vec![
            Asset::text("Bought milk"),
            Asset::data(AssetKind::Image, vec![1, 2, 3], "image/jpeg"),
        ];
        let binding = FieldBinding::new("receipt", "gemini-2.5-pro").with_top_k(3);
        let body = GeminiProvider::build_request("Extract.", &assets, &binding);

        let json = serde_json::to_value(&body).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(parts[0]["text"], "Extract.");
        assert_eq!(parts[1]["text"], "Bought milk");
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[2]["inlineData"]["data"], "AQID");
        assert_eq!(json["generationConfig"]["topK"], 3);
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_candidate_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"spend\":"},{"text":"5}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(candidate_text(response).unwrap(), r#"{"spend":5}"#);
    }

    #[test]
    fn test_candidate_text_empty_is_error() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(
            candidate_text(response),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_template_fails_before_network() {
        let provider = GeminiProvider::new("key", PromptLibrary::builtin())
            .with_endpoint("http://127.0.0.1:9");
        let bindings = FieldBindings::empty()
            .bind(Field::Currency, FieldBinding::new("missing", "gemini-1.5-flash"));

        let result = provider.extract(&[Asset::text("x")], &bindings).await;
        assert!(matches!(result, Err(LlmError::Template(_))));
    }

    #[tokio::test]
    async fn test_gemini_error_handling() {
        // Nothing listens on the discard port
        let provider = GeminiProvider::new("key", PromptLibrary::builtin())
            .with_endpoint("http://127.0.0.1:9");

        let result = provider
            .extract(&[Asset::text("x")], &FieldBindings::default())
            .await;
        assert!(matches!(result, Err(LlmError::Communication(_))));
    }
}
