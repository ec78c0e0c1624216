use super::api::{GenerateContentRequest, GenerateContentResponse};
use crate::client::Client;
use crate::error::ProviderError;
use crate::traffic_log;
use crate::{ChatModel, ChatRequest};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// One-shot text generation over `generateContent`.
///
/// The API key travels in a header so it never appears in URLs, and
/// therefore never in error messages or logs.
pub struct GeminiChatModel {
    client: Client,
    base_url: String,
    model_name: String,
}

impl GeminiChatModel {
    pub fn new(
        base_url: impl Into<String>,
        model_name: impl Into<String>,
        api_key: &str,
    ) -> Result<Self, ProviderError> {
        let mut key =
            HeaderValue::from_str(api_key.trim()).map_err(|_| ProviderError::InvalidApiKey)?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);

        Ok(GeminiChatModel {
            client: Client::with_headers(headers)?,
            base_url: base_url.into(),
            model_name: model_name.into(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model_name
        )
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<String> {
        let api_request = GenerateContentRequest::from(request);
        traffic_log::log_request(&self.model_name, &api_request);

        let response: GenerateContentResponse = match self.client.post(self.url(), &api_request).await {
            Ok(response) => response,
            Err(e) => {
                traffic_log::log_error(&self.model_name, &e.to_string());
                return Err(e.into());
            }
        };
        traffic_log::log_response(&self.model_name, &response);

        response
            .into_text()
            .ok_or_else(|| ProviderError::EmptyResponse.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16384];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_chat_returns_candidate_text() {
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "[\"Why Rust?\"]"}]}}]
        })
        .to_string();
        let (base, request) = serve_once("200 OK", body).await;

        let model = GeminiChatModel::new(base, "models/test", "k123").unwrap();
        let text = model.chat(&ChatRequest::new("go")).await.unwrap();
        assert_eq!(text, "[\"Why Rust?\"]");

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /models/test:generateContent HTTP/1.1"));
        assert!(raw.to_lowercase().contains("x-goog-api-key: k123"));
    }

    #[tokio::test]
    async fn test_transport_error_never_contains_key() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let model =
            GeminiChatModel::new(format!("http://{}", addr), "models/x", "SECRETKEY123").unwrap();
        let err = model.chat(&ChatRequest::new("go")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::Transport(_))
        ));
        assert!(!err.to_string().contains("SECRETKEY123"));
        assert!(!format!("{:?}", err).contains("SECRETKEY123"));
    }

    #[test]
    fn test_key_with_newline_is_rejected() {
        assert!(matches!(
            GeminiChatModel::new("http://localhost", "models/x", "bad\nkey"),
            Err(ProviderError::InvalidApiKey)
        ));
    }

    #[tokio::test]
    async fn test_chat_rate_limit_is_downcastable() {
        let (base, _) = serve_once("429 Too Many Requests", "{}".to_string()).await;
        let model = GeminiChatModel::new(base, "models/test", "k").unwrap();
        let err = model.chat(&ChatRequest::new("go")).await.unwrap_err();
        assert!(err.downcast_ref::<ProviderError>().unwrap().is_rate_limited());
    }

    #[tokio::test]
    async fn test_chat_without_candidates_is_empty_response() {
        let (base, _) = serve_once("200 OK", "{\"candidates\": []}".to_string()).await;
        let model = GeminiChatModel::new(base, "models/test", "k").unwrap();
        let err = model.chat(&ChatRequest::new("go")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::EmptyResponse)
        ));
    }
}
