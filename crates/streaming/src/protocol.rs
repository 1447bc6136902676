//! Message and request policy shared with the background cache proxy.
//!
//! The proxy keeps three versioned named caches (precache, data, assets) and
//! answers requests according to a [`Strategy`] picked by [`classify`]:
//! - navigations go network-first and only same-origin pages are cached,
//! - dataset files (`.json`, `.geojson`, `.topojson`) are stale-while-revalidate,
//! - static assets go network-first with a cache fallback.
//!
//! Every cached origin must be on an allowlist.

use std::collections::BTreeSet;

use http::Uri;
use serde::{Deserialize, Serialize};

/// Bumping this orphans every cache created by an older proxy.
pub const CACHE_VERSION: &str = "v11-hardened";

/// Control message posted from the page to the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProxyMessage {
    /// Store these URLs (asset allowlist only) in the precache.
    PrecacheUrls { urls: Vec<String> },
    /// Drop every named cache.
    ResetCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub version: String,
}

impl Default for CacheNames {
    fn default() -> Self {
        Self::new(CACHE_VERSION)
    }
}

impl CacheNames {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn precache(&self) -> String {
        format!("precache-{}", self.version)
    }

    pub fn data(&self) -> String {
        format!("data-{}", self.version)
    }

    pub fn assets(&self) -> String {
        format!("assets-{}", self.version)
    }

    /// Caches left over from another version are deleted on start-up.
    pub fn is_stale(&self, cache_name: &str) -> bool {
        !cache_name.contains(&self.version)
    }
}

/// `scheme://authority` of an absolute URL.
pub fn origin_of(url: &str) -> Option<String> {
    let uri: Uri = url.parse().ok()?;
    let scheme = uri.scheme_str()?;
    let authority = uri.authority()?;
    Some(format!("{scheme}://{authority}"))
}

/// Which origins may be cached, per request class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    pub own_origin: String,
    pub asset_origins: BTreeSet<String>,
    pub data_origins: BTreeSet<String>,
}

impl OriginPolicy {
    /// Default allowlists: own origin, the map provider, the dataset CDN, and
    /// the flag CDN for assets only.
    pub fn new(own_origin: impl Into<String>) -> Self {
        let own_origin = own_origin.into();
        let shared = [
            own_origin.as_str(),
            "https://maps.googleapis.com",
            "https://maps.gstatic.com",
            "https://cdn.jsdelivr.net",
        ];
        let data_origins: BTreeSet<String> = shared.iter().map(|s| s.to_string()).collect();
        let mut asset_origins = data_origins.clone();
        asset_origins.insert("https://flagcdn.com".to_string());
        Self {
            own_origin,
            asset_origins,
            data_origins,
        }
    }

    /// Makes `url` absolute against the own origin when it is a path.
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with('/') && !url.starts_with("//") {
            format!("{}{url}", self.own_origin.trim_end_matches('/'))
        } else {
            url.to_string()
        }
    }

    pub fn allows_asset(&self, url: &str) -> bool {
        origin_of(&self.resolve(url)).is_some_and(|o| self.asset_origins.contains(&o))
    }

    pub fn allows_data(&self, url: &str) -> bool {
        origin_of(&self.resolve(url)).is_some_and(|o| self.data_origins.contains(&o))
    }

    /// URLs of a `PRECACHE_URLS` message that may be stored, made absolute.
    pub fn filter_precache(&self, urls: &[String]) -> Vec<String> {
        urls.iter()
            .filter(|u| self.allows_asset(u))
            .map(|u| self.resolve(u))
            .collect()
    }
}

/// `Request.destination` values the proxy cares about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Audio,
    Video,
    #[default]
    #[serde(other)]
    Other,
}

impl Destination {
    pub fn is_asset(&self) -> bool {
        matches!(
            self,
            Destination::Script
                | Destination::Style
                | Destination::Image
                | Destination::Font
                | Destination::Audio
                | Destination::Video
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    pub method: http::Method,
    pub url: String,
    pub navigate: bool,
    pub destination: Destination,
}

impl ProxyRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            url: url.into(),
            navigate: false,
            destination: Destination::Other,
        }
    }

    pub fn navigation(mut self) -> Self {
        self.navigate = true;
        self.destination = Destination::Document;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Not handled; the request goes to the network untouched.
    Bypass,
    /// Network first. On failure serve the cached request, then the cached root.
    Navigation { cache_response: bool },
    /// Serve cache immediately and refresh it in the background.
    StaleWhileRevalidate,
    /// Network first with cache fallback.
    NetworkFirst,
}

pub fn is_data_path(path: &str) -> bool {
    path.ends_with(".json") || path.ends_with(".geojson") || path.ends_with(".topojson")
}

pub fn classify(req: &ProxyRequest, policy: &OriginPolicy) -> Strategy {
    if req.method != http::Method::GET {
        return Strategy::Bypass;
    }
    let url = policy.resolve(&req.url);
    let Ok(uri) = url.parse::<Uri>() else {
        return Strategy::Bypass;
    };
    if !matches!(uri.scheme_str(), Some("http" | "https")) || uri.authority().is_none() {
        return Strategy::Bypass;
    }
    let origin = origin_of(&url);

    if req.navigate {
        return Strategy::Navigation {
            cache_response: origin.as_deref() == Some(policy.own_origin.as_str()),
        };
    }

    if is_data_path(uri.path()) {
        return if policy.allows_data(&url) {
            Strategy::StaleWhileRevalidate
        } else {
            Strategy::Bypass
        };
    }

    if req.destination.is_asset() && policy.allows_asset(&url) {
        return Strategy::NetworkFirst;
    }
    Strategy::Bypass
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OWN: &str = "http://localhost:8080";
    const COAST: &str = "https://cdn.jsdelivr.net/gh/nvkelso/natural-earth-vector/geojson/ne_110m_coastline.geojson";

    #[test]
    fn messages_use_screaming_type_tags() {
        let msg = ProxyMessage::PrecacheUrls {
            urls: vec!["/a.json".into()],
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json, serde_json::json!({"type": "PRECACHE_URLS", "urls": ["/a.json"]}));

        let reset: ProxyMessage =
            serde_json::from_str(r#"{"type":"RESET_CACHE"}"#).expect("parse");
        assert_eq!(reset, ProxyMessage::ResetCache);
    }

    #[test]
    fn cache_names_are_versioned() {
        let names = CacheNames::default();
        assert_eq!(names.data(), "data-v11-hardened");
        assert!(!names.is_stale(&names.precache()));
        assert!(names.is_stale("assets-v10"));
    }

    #[test]
    fn precache_filter_uses_asset_allowlist() {
        let policy = OriginPolicy::new(OWN);
        let urls = vec![
            COAST.to_string(),
            "https://flagcdn.com/w320/fr.png".to_string(),
            "https://evil.example/x.json".to_string(),
            "/index.html".to_string(),
        ];
        assert_eq!(
            policy.filter_precache(&urls),
            vec![
                COAST.to_string(),
                "https://flagcdn.com/w320/fr.png".to_string(),
                format!("{OWN}/index.html"),
            ]
        );
    }

    #[test]
    fn requests_are_classified_by_kind_and_origin() {
        let policy = OriginPolicy::new(OWN);

        assert_eq!(
            classify(&ProxyRequest::get(COAST), &policy),
            Strategy::StaleWhileRevalidate
        );
        // The flag CDN is an asset origin, not a data origin.
        assert_eq!(
            classify(&ProxyRequest::get("https://flagcdn.com/meta.json"), &policy),
            Strategy::Bypass
        );
        assert_eq!(
            classify(
                &ProxyRequest::get("https://flagcdn.com/w320/fr.png")
                    .with_destination(Destination::Image),
                &policy
            ),
            Strategy::NetworkFirst
        );
        assert_eq!(
            classify(&ProxyRequest::get("/").navigation(), &policy),
            Strategy::Navigation {
                cache_response: true
            }
        );
        assert_eq!(
            classify(
                &ProxyRequest::get("https://other.example/").navigation(),
                &policy
            ),
            Strategy::Navigation {
                cache_response: false
            }
        );
        assert_eq!(
            classify(&ProxyRequest::get("chrome-extension://abc/x.json"), &policy),
            Strategy::Bypass
        );

        let mut post = ProxyRequest::get(COAST);
        post.method = http::Method::POST;
        assert_eq!(classify(&post, &policy), Strategy::Bypass);
        assert_eq!(
            classify(&ProxyRequest::get("/api/thing"), &policy),
            Strategy::Bypass
        );
    }
}
