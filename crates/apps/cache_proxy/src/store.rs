use std::io;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use streaming::CacheNames;
use tracing::{info, warn};

/// A stored upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_str(&self.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
        );
        (status, headers, Body::from(self.body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    content_type: String,
}

/// FNV-1a of the URL; the meta file keeps the URL itself.
fn entry_key(url: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in url.bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    format!("{hash:016x}")
}

/// Named response caches, optionally mirrored to disk as
/// `<root>/<cache name>/<key>.{json,body}`.
#[derive(Debug, Default)]
pub struct CacheStore {
    root: Option<PathBuf>,
    caches: DashMap<String, DashMap<String, CachedResponse>>,
}

impl CacheStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the on-disk mirror: caches of another version are deleted, the
    /// rest are loaded back.
    pub async fn open(root: PathBuf, names: &CacheNames) -> io::Result<Self> {
        tokio::fs::create_dir_all(&root).await?;
        let store = Self {
            root: Some(root.clone()),
            caches: DashMap::new(),
        };

        let mut dirs = tokio::fs::read_dir(&root).await?;
        while let Some(dir) = dirs.next_entry().await? {
            if !dir.file_type().await?.is_dir() {
                continue;
            }
            let name = dir.file_name().to_string_lossy().to_string();
            if names.is_stale(&name) {
                info!(cache = %name, "deleting stale cache");
                tokio::fs::remove_dir_all(dir.path()).await?;
                continue;
            }
            let loaded = store.load_cache(&name, &dir.path()).await?;
            info!(cache = %name, entries = loaded, "cache restored");
        }
        Ok(store)
    }

    async fn load_cache(&self, name: &str, dir: &Path) -> io::Result<usize> {
        let entries = self.caches.entry(name.to_string()).or_default();
        let mut files = tokio::fs::read_dir(dir).await?;
        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let meta: EntryMeta = match serde_json::from_slice(&tokio::fs::read(&path).await?) {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(?path, %err, "skipping unreadable cache entry");
                    continue;
                }
            };
            let body = tokio::fs::read(path.with_extension("body")).await?;
            entries.insert(
                meta.url,
                CachedResponse {
                    status: meta.status,
                    content_type: meta.content_type,
                    body: Bytes::from(body),
                },
            );
        }
        Ok(entries.len())
    }

    pub fn get(&self, cache: &str, url: &str) -> Option<CachedResponse> {
        self.caches.get(cache)?.get(url).map(|r| r.value().clone())
    }

    /// First hit for `url` in any cache.
    pub fn match_any(&self, url: &str) -> Option<CachedResponse> {
        self.caches
            .iter()
            .find_map(|cache| cache.value().get(url).map(|r| r.value().clone()))
    }

    pub async fn put(&self, cache: &str, url: &str, response: CachedResponse) {
        if let Some(root) = &self.root {
            if let Err(err) = write_entry(&root.join(cache), url, &response).await {
                warn!(cache, url, %err, "cache entry not persisted");
            }
        }
        self.caches
            .entry(cache.to_string())
            .or_default()
            .insert(url.to_string(), response);
    }

    pub fn len(&self, cache: &str) -> usize {
        self.caches.get(cache).map(|c| c.len()).unwrap_or(0)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    /// Drops every cache, on disk too.
    pub async fn clear(&self) -> io::Result<()> {
        let names = self.names();
        self.caches.clear();
        if let Some(root) = &self.root {
            for name in names {
                let dir = root.join(name);
                if tokio::fs::try_exists(&dir).await? {
                    tokio::fs::remove_dir_all(dir).await?;
                }
            }
        }
        Ok(())
    }
}

async fn write_entry(dir: &Path, url: &str, response: &CachedResponse) -> io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let key = entry_key(url);
    let meta = EntryMeta {
        url: url.to_string(),
        status: response.status,
        content_type: response.content_type.clone(),
    };
    let meta = serde_json::to_vec(&meta).map_err(io::Error::other)?;
    tokio::fs::write(dir.join(format!("{key}.body")), &response.body).await?;
    tokio::fs::write(dir.join(format!("{key}.json")), meta).await
}
