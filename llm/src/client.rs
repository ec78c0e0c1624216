use crate::error::ProviderError;
use reqwest::header::HeaderMap;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{Level, event, instrument};

#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
}

impl Default for Client {
    fn default() -> Self {
        Client {
            client: reqwest::Client::new(),
        }
    }
}

impl Client {
    /// A client that sends `headers` with every request.
    pub fn with_headers(headers: HeaderMap) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Client { client })
    }

    #[instrument(level = "trace", skip(self, url, request))]
    pub async fn post<U, S, T>(&self, url: U, request: &S) -> Result<T, ProviderError>
    where
        U: reqwest::IntoUrl + std::fmt::Debug,
        S: Serialize + Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(ProviderError::from_status(status.as_u16(), error_body));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;
        event!(Level::TRACE, response = text);

        serde_json::from_str::<T>(&text).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}
