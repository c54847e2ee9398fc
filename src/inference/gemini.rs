use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::InferenceProvider;
use crate::error::InferenceError;
use crate::types::{FunctionCall, GenerateRequest, GenerateResponse, Usage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` client. The key travels in the
/// `x-goog-api-key` header.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

/// Request body in the API's camelCase shape.
pub(crate) fn build_body(request: &GenerateRequest) -> Value {
    let mut body = json!({
        "contents": request.contents,
        "generationConfig": request.generation_config,
    });

    if let Some(ref system) = request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }

    if !request.tools.is_empty() {
        body["tools"] = json!([{ "functionDeclarations": request.tools }]);
    }

    body
}

/// Interpret a `generateContent` response. Only the first candidate is used.
pub(crate) fn parse_response(parsed: &Value) -> Result<GenerateResponse, InferenceError> {
    let candidate = match parsed["candidates"].as_array().and_then(|c| c.first()) {
        Some(c) => c,
        None => {
            if let Some(reason) = parsed["promptFeedback"]["blockReason"].as_str() {
                return Err(InferenceError::Blocked(reason.to_string()));
            }
            return Err(InferenceError::EmptyResponse);
        }
    };

    // A candidate stopped for safety may come back without content.
    let content = match candidate.get("content") {
        Some(c) if c.is_object() => c.clone(),
        _ => json!({ "role": "model", "parts": [{ "text": "" }] }),
    };

    let mut text = String::new();
    let mut calls = Vec::new();
    for part in content["parts"].as_array().map(Vec::as_slice).unwrap_or_default() {
        if let Some(call) = part.get("functionCall") {
            calls.push(parse_call(call)?);
        } else if let Some(t) = part["text"].as_str() {
            if part["thought"].as_bool() != Some(true) {
                text.push_str(t);
            }
        }
    }

    let usage = Usage {
        prompt_tokens: token_count(&parsed["usageMetadata"]["promptTokenCount"]),
        candidate_tokens: token_count(&parsed["usageMetadata"]["candidatesTokenCount"]),
    };

    Ok(GenerateResponse {
        content,
        text,
        calls,
        finish_reason: candidate["finishReason"].as_str().map(str::to_string),
        usage,
    })
}

fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

fn parse_call(call: &Value) -> Result<FunctionCall, InferenceError> {
    let name = call["name"]
        .as_str()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| InferenceError::Parse("functionCall without a name".into()))?;

    let args = match call.get("args") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(InferenceError::Parse(format!(
                "functionCall {name} has non-object args: {other}"
            )))
        }
    };

    Ok(FunctionCall {
        name: name.to_string(),
        args,
    })
}

#[async_trait]
impl InferenceProvider for GeminiProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, InferenceError> {
        let body = build_body(&request);

        debug!(
            model = %request.model,
            contents = request.contents.len(),
            tools = request.tools.len(),
            "gemini generate request"
        );

        let resp = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        if status != 200 {
            return Err(InferenceError::ApiError { status, body: text });
        }

        let parsed: Value =
            serde_json::from_str(&text).map_err(|e| InferenceError::Parse(e.to_string()))?;

        parse_response(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FunctionDeclaration, FunctionParameters, SchemaType};
    use crate::types::GenerationConfig;

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gemini-2.0-flash-exp".into(),
            system_instruction: Some("You are a user management bot.".into()),
            tools: vec![FunctionDeclaration {
                name: "addUser".into(),
                description: "Add a user to the list".into(),
                parameters: Some(
                    FunctionParameters::object()
                        .property("name", SchemaType::String, "The name of the user to add")
                        .required("name"),
                ),
            }],
            contents: vec![json!({ "role": "user", "parts": [{ "text": "hi" }] })],
            generation_config: GenerationConfig::default(),
        }
    }

    #[test]
    fn body_carries_everything() {
        let body = build_body(&request());
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are a user management bot."
        );
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "addUser"
        );
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["parameters"]["type"],
            "OBJECT"
        );
        assert_eq!(body["generationConfig"]["topP"], json!(0.95));
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn body_omits_absent_fields() {
        let mut req = request();
        req.system_instruction = None;
        req.tools.clear();
        let body = build_body(&req);
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let p = GeminiProvider::new("key").with_base_url("http://localhost:8080/");
        assert_eq!(
            p.endpoint("gemini-pro"),
            "http://localhost:8080/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn parses_text_response() {
        let resp = parse_response(&json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hello " }, { "text": "there" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 3 }
        }))
        .unwrap();
        assert_eq!(resp.text, "Hello there");
        assert!(resp.calls.is_empty());
        assert_eq!(resp.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(resp.usage.prompt_tokens, 12);
        assert_eq!(resp.usage.candidate_tokens, 3);
    }

    #[test]
    fn parses_function_calls_in_order() {
        let resp = parse_response(&json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "functionCall": { "name": "getUserNames" } },
                    { "functionCall": { "name": "addUser", "args": { "name": "Dave" } } }
                ]}
            }]
        }))
        .unwrap();
        assert_eq!(resp.calls.len(), 2);
        assert_eq!(resp.calls[0].name, "getUserNames");
        assert!(resp.calls[0].args.is_empty());
        assert_eq!(resp.calls[1].args["name"], "Dave");
        // raw content kept for the transcript
        assert_eq!(resp.content["parts"][1]["functionCall"]["name"], "addUser");
    }

    #[test]
    fn thought_parts_excluded_from_text() {
        let resp = parse_response(&json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "let me think", "thought": true },
                    { "text": "Answer" }
                ]}
            }]
        }))
        .unwrap();
        assert_eq!(resp.text, "Answer");
    }

    #[test]
    fn candidate_without_content_is_empty_text() {
        let resp = parse_response(&json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .unwrap();
        assert_eq!(resp.text, "");
        assert!(resp.calls.is_empty());
        assert_eq!(resp.content["role"], "model");
    }

    #[test]
    fn no_candidates_is_an_error() {
        let err = parse_response(&json!({})).unwrap_err();
        assert!(matches!(err, InferenceError::EmptyResponse));
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let err = parse_response(&json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap_err();
        assert!(matches!(err, InferenceError::Blocked(ref r) if r == "SAFETY"));
    }

    #[test]
    fn oversized_token_counts_clamp() {
        let resp = parse_response(&json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": "x" }] } }],
            "usageMetadata": { "promptTokenCount": 5_000_000_000u64, "candidatesTokenCount": 7 }
        }))
        .unwrap();
        assert_eq!(resp.usage.prompt_tokens, u32::MAX);
        assert_eq!(resp.usage.candidate_tokens, 7);
    }

    #[test]
    fn empty_candidate_content_still_has_a_part() {
        let resp = parse_response(&json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .unwrap();
        assert_eq!(resp.content["parts"], json!([{ "text": "" }]));
    }

    const PATH: &str = "/v1beta/models/gemini-2.0-flash-exp:generateContent";

    #[tokio::test]
    async fn generate_posts_with_key_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "secret")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hi"}]},"finishReason":"STOP"}]}"#,
            )
            .create_async()
            .await;

        let provider = GeminiProvider::new("secret").with_base_url(server.url());
        let resp = provider.generate(request()).await.unwrap();
        assert_eq!(resp.text, "Hi");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_200_is_api_error_with_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(429)
            .with_body(r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#)
            .create_async()
            .await;

        let provider = GeminiProvider::new("secret").with_base_url(server.url());
        let err = provider.generate(request()).await.unwrap_err();
        match err {
            InferenceError::ApiError { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("RESOURCE_EXHAUSTED"));
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparsable_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let provider = GeminiProvider::new("secret").with_base_url(server.url());
        let err = provider.generate(request()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Parse(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_request_error() {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap();
        // nothing listens on port 1
        let provider = GeminiProvider::new("secret")
            .with_client(client)
            .with_base_url("http://127.0.0.1:1");
        let err = provider.generate(request()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Request(_)));
    }

    #[test]
    fn malformed_calls_are_parse_errors() {
        let nameless = parse_response(&json!({
            "candidates": [{ "content": { "parts": [{ "functionCall": { "args": {} } }] } }]
        }))
        .unwrap_err();
        assert!(matches!(nameless, InferenceError::Parse(_)));

        let bad_args = parse_response(&json!({
            "candidates": [{ "content": { "parts": [
                { "functionCall": { "name": "addUser", "args": "Dave" } }
            ]}}]
        }))
        .unwrap_err();
        assert!(matches!(bad_args, InferenceError::Parse(_)));
    }
}
