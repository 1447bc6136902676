use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use streaming::{classify, CacheNames, Destination, OriginPolicy, ProxyMessage, ProxyRequest, Strategy};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod store;

use store::{CacheStore, CachedResponse};

#[derive(Parser, Debug)]
#[command(author, version, about = "Versioned caching proxy for quiz datasets and assets")]
struct Args {
    /// Listen address (default: $CACHE_PROXY_ADDR or 127.0.0.1:9200)
    #[arg(long)]
    addr: Option<String>,

    /// Origin the quiz is served from (default: $CACHE_PROXY_ORIGIN or http://<addr>)
    #[arg(long)]
    origin: Option<String>,

    /// Mirror caches to this directory (default: $CACHE_PROXY_DIR, in-memory when unset)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Clone)]
struct AppState {
    http: reqwest::Client,
    names: Arc<CacheNames>,
    policy: Arc<OriginPolicy>,
    store: Arc<CacheStore>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let addr: SocketAddr = args
        .addr
        .or_else(|| env::var("CACHE_PROXY_ADDR").ok())
        .unwrap_or_else(|| "127.0.0.1:9200".to_string())
        .parse()
        .expect("invalid CACHE_PROXY_ADDR");
    let origin = args
        .origin
        .or_else(|| env::var("CACHE_PROXY_ORIGIN").ok())
        .unwrap_or_else(|| format!("http://{addr}"));
    let cache_dir = args
        .cache_dir
        .or_else(|| env::var("CACHE_PROXY_DIR").ok().map(PathBuf::from));

    let names = CacheNames::default();
    let store = match cache_dir {
        Some(dir) => CacheStore::open(dir, &names)
            .await
            .expect("failed to open cache directory"),
        None => CacheStore::in_memory(),
    };

    let state = AppState {
        http: reqwest::Client::new(),
        names: Arc::new(names),
        policy: Arc::new(OriginPolicy::new(origin.clone())),
        store: Arc::new(store),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/fetch", get(handle_fetch))
        .route("/messages", post(handle_message))
        .route("/caches", get(list_caches))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(%origin, "cache proxy listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app)
        .await
        .unwrap();
}

async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

#[derive(Debug, Deserialize)]
struct FetchParams {
    url: String,
    #[serde(default)]
    navigate: bool,
    #[serde(default)]
    destination: Destination,
}

impl FetchParams {
    fn into_request(self) -> ProxyRequest {
        let request = ProxyRequest::get(self.url).with_destination(self.destination);
        if self.navigate {
            request.navigation()
        } else {
            request
        }
    }
}

async fn handle_fetch(State(state): State<AppState>, Query(params): Query<FetchParams>) -> Response {
    let request = params.into_request();
    let url = state.policy.resolve(&request.url);
    let strategy = classify(&request, &state.policy);
    debug!(%url, ?strategy, "fetch");

    match strategy {
        // Pass-through requests belong to the caller; only the own origin is proxied.
        Strategy::Bypass
        | Strategy::Navigation {
            cache_response: false,
        } => refuse(&url),
        Strategy::Navigation { .. } => {
            match fetch_upstream(&state.http, &url).await {
                Ok(resp) => {
                    if resp.is_ok() {
                        state.store.put(&state.names.assets(), &url, resp.clone()).await;
                    }
                    resp.into_response()
                }
                Err(err) => {
                    warn!(%url, %err, "navigation offline, serving cached shell");
                    match navigation_fallback(&state.store, &state.policy, &url) {
                        Some(hit) => hit.into_response(),
                        None => (StatusCode::SERVICE_UNAVAILABLE, "offline").into_response(),
                    }
                }
            }
        }
        Strategy::StaleWhileRevalidate => {
            let cached = state.store.get(&state.names.data(), &url);
            let refresh = revalidate(state.clone(), url.clone());
            match cached {
                Some(hit) => {
                    tokio::spawn(refresh);
                    hit.into_response()
                }
                None => match refresh.await {
                    Some(resp) => resp.into_response(),
                    None => (StatusCode::BAD_GATEWAY, "dataset unavailable").into_response(),
                },
            }
        }
        Strategy::NetworkFirst => match fetch_upstream(&state.http, &url).await {
            Ok(resp) => {
                if resp.is_ok() {
                    state.store.put(&state.names.assets(), &url, resp.clone()).await;
                }
                resp.into_response()
            }
            Err(err) => match state.store.get(&state.names.assets(), &url) {
                Some(hit) => {
                    debug!(%url, %err, "asset served from cache");
                    hit.into_response()
                }
                None => upstream_failed(&url, err),
            },
        },
    }
}

/// Refreshes a data entry. Any upstream response is returned, only successes are stored.
async fn revalidate(state: AppState, url: String) -> Option<CachedResponse> {
    match fetch_upstream(&state.http, &url).await {
        Ok(resp) => {
            if resp.is_ok() {
                state.store.put(&state.names.data(), &url, resp.clone()).await;
            }
            Some(resp)
        }
        Err(err) => {
            warn!(%url, %err, "dataset refresh failed");
            None
        }
    }
}

/// Cached copy of the page itself, else the cached root document.
fn navigation_fallback(store: &CacheStore, policy: &OriginPolicy, url: &str) -> Option<CachedResponse> {
    store
        .match_any(url)
        .or_else(|| store.match_any(&policy.resolve("/")))
}

async fn handle_message(State(state): State<AppState>, Json(message): Json<ProxyMessage>) -> Response {
    match message {
        ProxyMessage::PrecacheUrls { urls } => {
            let accepted = state.policy.filter_precache(&urls);
            if accepted.len() < urls.len() {
                debug!(dropped = urls.len() - accepted.len(), "precache urls outside the allowlist");
            }
            let count = accepted.len();
            tokio::spawn(precache(state, accepted));
            (StatusCode::ACCEPTED, Json(serde_json::json!({ "accepted": count }))).into_response()
        }
        ProxyMessage::ResetCache => match state.store.clear().await {
            Ok(()) => {
                info!("all caches cleared");
                (StatusCode::OK, "cleared").into_response()
            }
            Err(err) => {
                error!("cache reset failed: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "reset failed").into_response()
            }
        },
    }
}

async fn precache(state: AppState, urls: Vec<String>) {
    let cache = state.names.precache();
    let mut stored = 0usize;
    for url in &urls {
        match fetch_upstream(&state.http, url).await {
            Ok(resp) if resp.is_ok() => {
                state.store.put(&cache, url, resp).await;
                stored += 1;
            }
            Ok(resp) => warn!(%url, status = resp.status, "precache skipped"),
            Err(err) => warn!(%url, %err, "precache fetch failed"),
        }
    }
    info!(stored, total = urls.len(), "precache finished");
}

async fn list_caches(State(state): State<AppState>) -> Response {
    let sizes: BTreeMap<String, usize> = state
        .store
        .names()
        .into_iter()
        .map(|name| {
            let len = state.store.len(&name);
            (name, len)
        })
        .collect();
    Json(sizes).into_response()
}

async fn fetch_upstream(http: &reqwest::Client, url: &str) -> Result<CachedResponse, reqwest::Error> {
    let resp = http.get(url).send().await?;
    let status = resp.status().as_u16();
    let content_type = resp
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let body = resp.bytes().await?;
    Ok(CachedResponse {
        status,
        content_type,
        body,
    })
}

fn refuse(url: &str) -> Response {
    debug!(%url, "not proxied");
    (StatusCode::FORBIDDEN, "not proxied").into_response()
}

fn upstream_failed(url: &str, err: reqwest::Error) -> Response {
    error!("upstream GET {url} failed: {err}");
    (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{handle_fetch, navigation_fallback, AppState, FetchParams};
    use crate::store::{CacheStore, CachedResponse};
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use streaming::{CacheNames, Destination, OriginPolicy};

    fn state() -> AppState {
        AppState {
            http: reqwest::Client::new(),
            names: Arc::new(CacheNames::default()),
            policy: Arc::new(OriginPolicy::new("http://quiz.example")),
            store: Arc::new(CacheStore::in_memory()),
        }
    }

    fn params(url: &str, navigate: bool, destination: Destination) -> Query<FetchParams> {
        Query(FetchParams {
            url: url.to_string(),
            navigate,
            destination,
        })
    }

    fn page(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: 200,
            content_type: "text/html".to_string(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn query_params_become_proxy_requests() {
        let params: FetchParams =
            serde_json::from_str(r#"{"url":"/index.html","navigate":true}"#).expect("params");
        let request = params.into_request();
        assert!(request.navigate);
        assert_eq!(request.destination, Destination::Document);

        let params: FetchParams =
            serde_json::from_str(r#"{"url":"https://flagcdn.com/w320/fr.png","destination":"image"}"#)
                .expect("params");
        let request = params.into_request();
        assert!(!request.navigate);
        assert_eq!(request.destination, Destination::Image);
    }

    #[tokio::test]
    async fn offline_navigation_falls_back_to_the_root_document() {
        let policy = OriginPolicy::new("http://localhost:9200");
        let store = CacheStore::in_memory();
        assert_eq!(navigation_fallback(&store, &policy, "http://localhost:9200/about"), None);

        store.put("assets-v", "http://localhost:9200/", page("root")).await;
        assert_eq!(
            navigation_fallback(&store, &policy, "http://localhost:9200/about"),
            Some(page("root"))
        );

        store.put("assets-v", "http://localhost:9200/about", page("about")).await;
        assert_eq!(
            navigation_fallback(&store, &policy, "http://localhost:9200/about"),
            Some(page("about"))
        );
    }

    #[tokio::test]
    async fn off_allowlist_urls_are_never_fetched() {
        // Nothing listens on port 9: a fetch attempt would answer 502, not 403.
        let state = state();
        let internal = "http://127.0.0.1:9/admin/secret";
        for request in [
            params(internal, false, Destination::Other),
            params(internal, false, Destination::Image),
            params(internal, true, Destination::Document),
            params("http://127.0.0.1:9/countries.geojson", false, Destination::Other),
            params("ftp://quiz.example/a.json", false, Destination::Other),
        ] {
            let resp = handle_fetch(State(state.clone()), request).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        }
        assert!(state.store.names().is_empty());
    }
}
