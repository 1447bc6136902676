use futures_util::future::{FutureExt, LocalBoxFuture};

use crate::fetch::{FetchError, Transport};

/// Native HTTP transport.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Transport for HttpTransport {
    fn get(&self, url: &str) -> LocalBoxFuture<'_, Result<Vec<u8>, FetchError>> {
        let request = self.client.get(url);
        async move {
            let resp = request
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            Ok(bytes.to_vec())
        }
        .boxed_local()
    }
}

/// Browser transport over `fetch`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserTransport;

#[cfg(target_arch = "wasm32")]
impl Transport for BrowserTransport {
    fn get(&self, url: &str) -> LocalBoxFuture<'_, Result<Vec<u8>, FetchError>> {
        let url = url.to_string();
        async move {
            let resp = gloo_net::http::Request::get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            if !resp.ok() {
                return Err(FetchError::Status(resp.status()));
            }
            resp.binary()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))
        }
        .boxed_local()
    }
}
