use crate::config::EngineConfig;
use crate::error::ResolveError;
use crate::library::track::{embed_url, StreamHandle, TrackReference};
use log::{debug, info, warn};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Network access used by stream acquisition.
pub trait HttpFetch: Send + Sync {
    fn get_text(&self, url: &str) -> Result<String, ResolveError>;
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ResolveError>;
}

impl<T: HttpFetch + ?Sized> HttpFetch for Arc<T> {
    fn get_text(&self, url: &str) -> Result<String, ResolveError> {
        (**self).get_text(url)
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        (**self).get_bytes(url)
    }
}

pub struct ReqwestFetch {
    client: Client,
}

impl ReqwestFetch {
    pub fn new(config: &EngineConfig) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

impl HttpFetch for ReqwestFetch {
    fn get_text(&self, url: &str) -> Result<String, ResolveError> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(ResolveError::Status(response.status().as_u16()));
        }
        Ok(response.text()?)
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(ResolveError::Status(response.status().as_u16()));
        }
        Ok(response.bytes()?.to_vec())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveStrategy {
    ResolveEndpoint,
    WidgetEmbed,
    PageProxy,
}

impl ResolveStrategy {
    pub const CHAIN: [ResolveStrategy; 3] = [
        ResolveStrategy::ResolveEndpoint,
        ResolveStrategy::WidgetEmbed,
        ResolveStrategy::PageProxy,
    ];
}

impl fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolveStrategy::ResolveEndpoint => "resolve endpoint",
            ResolveStrategy::WidgetEmbed => "widget embed",
            ResolveStrategy::PageProxy => "page proxy",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub handle: StreamHandle,
    /// Strategy that produced a direct stream; `None` for the sentinel or a pre-resolved track.
    pub strategy: Option<ResolveStrategy>,
}

/// Best-effort chain that turns a track page URL into a directly fetchable stream.
pub struct StreamResolver<F: HttpFetch> {
    fetch: F,
    endpoint: String,
    tokens: Vec<String>,
    embed_base: String,
    proxy_template: String,
}

impl<F: HttpFetch> StreamResolver<F> {
    pub fn new(fetch: F, config: &EngineConfig) -> Self {
        Self {
            fetch,
            endpoint: config.resolve_endpoint.clone(),
            tokens: config
                .credential_tokens
                .iter()
                .filter(|token| !token.trim().is_empty())
                .cloned()
                .collect(),
            embed_base: config.widget_embed_base.clone(),
            proxy_template: config.proxy_template.clone(),
        }
    }

    /// Never fails: exhaustion yields [`StreamHandle::WidgetOnly`].
    pub fn resolve(&self, track: &TrackReference) -> StreamHandle {
        self.resolve_detailed(track).handle
    }

    pub fn resolve_detailed(&self, track: &TrackReference) -> Resolution {
        let never = AtomicBool::new(false);
        self.resolve_cancellable(track, &never).unwrap_or(Resolution {
            handle: StreamHandle::WidgetOnly,
            strategy: None,
        })
    }

    /// Walks the chain, checking `cancelled` before every network step.
    /// Returns `None` once cancellation is observed.
    pub fn resolve_cancellable(
        &self,
        track: &TrackReference,
        cancelled: &AtomicBool,
    ) -> Option<Resolution> {
        if let Some(handle @ StreamHandle::Direct(_)) = &track.handle {
            return Some(Resolution {
                handle: handle.clone(),
                strategy: None,
            });
        }

        for strategy in ResolveStrategy::CHAIN {
            if cancelled.load(Ordering::Acquire) {
                debug!("Stream resolution for {} cancelled before {strategy}", track.url);
                return None;
            }
            match self.attempt(strategy, &track.url, cancelled) {
                Ok(stream_url) => {
                    info!("Resolved stream for {} via {strategy}", track.url);
                    return Some(Resolution {
                        handle: StreamHandle::Direct(stream_url),
                        strategy: Some(strategy),
                    });
                }
                Err(ResolveError::Cancelled) => return None,
                Err(err) => warn!("Stream resolution via {strategy} failed for {}: {err}", track.url),
            }
        }

        warn!(
            "Acquisition failure for {}: all strategies exhausted, continuing in widget-only mode",
            track.url
        );
        Some(Resolution {
            handle: StreamHandle::WidgetOnly,
            strategy: None,
        })
    }

    fn attempt(
        &self,
        strategy: ResolveStrategy,
        track_url: &str,
        cancelled: &AtomicBool,
    ) -> Result<String, ResolveError> {
        match strategy {
            ResolveStrategy::ResolveEndpoint => self.from_resolve_endpoint(track_url, cancelled),
            ResolveStrategy::WidgetEmbed => self.from_widget_embed(track_url),
            ResolveStrategy::PageProxy => self.from_page_proxy(track_url),
        }
    }

    fn from_resolve_endpoint(
        &self,
        track_url: &str,
        cancelled: &AtomicBool,
    ) -> Result<String, ResolveError> {
        if self.tokens.is_empty() {
            return Err(ResolveError::NoCredentials);
        }
        let mut last_error = ResolveError::NoStreamField;
        for token in &self.tokens {
            if cancelled.load(Ordering::Acquire) {
                return Err(ResolveError::Cancelled);
            }
            let request = Url::parse_with_params(
                &self.endpoint,
                &[("url", track_url), ("client_id", token.as_str())],
            )
            .map_err(|e| ResolveError::Url(e.to_string()))?;
            let outcome = self
                .fetch
                .get_text(request.as_str())
                .and_then(|body| Ok(serde_json::from_str::<ResolveResponse>(&body)?))
                .and_then(|payload| payload.stream_url().ok_or(ResolveError::NoStreamField));
            match outcome {
                Ok(stream_url) => return Ok(with_client_id(&stream_url, token)),
                Err(err) => {
                    warn!("Credential token rejected by resolve endpoint: {err}");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    fn from_widget_embed(&self, track_url: &str) -> Result<String, ResolveError> {
        let embed = embed_url(&self.embed_base, track_url).map_err(ResolveError::Url)?;
        let markup = self.fetch.get_text(&embed)?;
        extract_stream_url(&markup).ok_or(ResolveError::NoMatch)
    }

    fn from_page_proxy(&self, track_url: &str) -> Result<String, ResolveError> {
        let proxied = proxied_url(&self.proxy_template, track_url);
        let markup = self.fetch.get_text(&proxied)?;
        extract_stream_url(&markup).ok_or(ResolveError::NoMatch)
    }
}

fn with_client_id(stream_url: &str, token: &str) -> String {
    let separator = if stream_url.contains('?') { '&' } else { '?' };
    format!("{stream_url}{separator}client_id={token}")
}

fn proxied_url(template: &str, track_url: &str) -> String {
    let encoded: String = Url::parse_with_params("http://placeholder/", &[("u", track_url)])
        .ok()
        .and_then(|url| url.query().map(|query| query.trim_start_matches("u=").to_string()))
        .unwrap_or_else(|| track_url.to_string());
    template
        .replace("{url_encoded}", &encoded)
        .replace("{url}", track_url)
}

/// Finds a playable URL in page markup: a media element `src` first, then any
/// embedded audio URL (JSON-escaped slashes are accepted).
pub fn extract_stream_url(markup: &str) -> Option<String> {
    if let Some(src) = media_src_pattern()
        .and_then(|pattern| pattern.captures_iter(markup).find_map(|caps| usable(&caps[1])))
    {
        return Some(src);
    }
    embedded_url_pattern()
        .and_then(|pattern| pattern.find_iter(markup).find_map(|m| usable(m.as_str())))
}

fn usable(candidate: &str) -> Option<String> {
    let unescaped = candidate
        .replace("\\/", "/")
        .replace("\\u0026", "&")
        .replace("&amp;", "&");
    (unescaped.starts_with("https://") || unescaped.starts_with("http://")).then_some(unescaped)
}

fn media_src_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"(?is)<(?:audio|source)\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).ok()
        })
        .as_ref()
}

fn embedded_url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r#"(?i)https?:(?:\\?/){2}[^"'\s<>]+?(?:\.(?:mp3|m4a|aac|ogg|opus|wav)|/stream(?:s)?/[^"'\s<>]*)(?:\?[^"'\s<>]*)?"#,
            )
            .ok()
        })
        .as_ref()
}

#[derive(Deserialize)]
struct ResolveResponse {
    stream_url: Option<String>,
    #[serde(default)]
    media: Option<ResolveMedia>,
}

#[derive(Deserialize)]
struct ResolveMedia {
    #[serde(default)]
    transcodings: Vec<Transcoding>,
}

#[derive(Deserialize)]
struct Transcoding {
    url: Option<String>,
    format: Option<TranscodingFormat>,
}

#[derive(Deserialize)]
struct TranscodingFormat {
    protocol: Option<String>,
}

impl ResolveResponse {
    fn stream_url(self) -> Option<String> {
        let direct = self
            .stream_url
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"));
        direct.or_else(|| {
            self.media?.transcodings.into_iter().find_map(|transcoding| {
                let progressive = transcoding
                    .format
                    .and_then(|format| format.protocol)
                    .is_some_and(|protocol| protocol == "progressive");
                transcoding.url.filter(|_| progressive)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies by URL prefix and records every request.
    #[derive(Default)]
    struct FakeFetch {
        routes: Vec<(String, Result<String, u16>)>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeFetch {
        fn route(mut self, prefix: &str, body: Result<&str, u16>) -> Self {
            self.routes
                .push((prefix.to_string(), body.map(str::to_string)));
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().expect("lock").clone()
        }
    }

    impl HttpFetch for FakeFetch {
        fn get_text(&self, url: &str) -> Result<String, ResolveError> {
            self.requests.lock().expect("lock").push(url.to_string());
            self.routes
                .iter()
                .find(|(prefix, _)| url.starts_with(prefix.as_str()))
                .map(|(_, body)| body.clone().map_err(ResolveError::Status))
                .unwrap_or(Err(ResolveError::Status(404)))
        }

        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
            self.get_text(url).map(String::into_bytes)
        }
    }

    const TRACK: &str = "https://soundcloud.com/artist/track";

    fn config(tokens: &[&str]) -> EngineConfig {
        EngineConfig {
            resolve_endpoint: "https://api.example/resolve.json".to_string(),
            credential_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            widget_embed_base: "https://widget.example/player/".to_string(),
            proxy_template: "https://proxy.example/?{url_encoded}".to_string(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn first_working_token_wins() {
        let fetch = FakeFetch::default()
            .route(
                "https://api.example/resolve.json?url=https%3A%2F%2Fsoundcloud.com%2Fartist%2Ftrack&client_id=bad",
                Err(401),
            )
            .route(
                "https://api.example/resolve.json?url=https%3A%2F%2Fsoundcloud.com%2Fartist%2Ftrack&client_id=good",
                Ok(r#"{ "stream_url": "https://api.example/tracks/1/stream" }"#),
            );
        let resolver = StreamResolver::new(fetch, &config(&["bad", "good", "unused"]));
        let resolution = resolver.resolve_detailed(&TrackReference::new(TRACK));
        assert_eq!(
            resolution.handle,
            StreamHandle::Direct("https://api.example/tracks/1/stream?client_id=good".to_string())
        );
        assert_eq!(resolution.strategy, Some(ResolveStrategy::ResolveEndpoint));
        assert!(resolver
            .fetch
            .requests()
            .iter()
            .all(|url| !url.contains("client_id=unused")));
    }

    #[test]
    fn progressive_transcoding_is_accepted() {
        let fetch = FakeFetch::default().route(
            "https://api.example/resolve.json",
            Ok(r#"{ "stream_url": null, "media": { "transcodings": [
                { "url": "https://api.example/hls", "format": { "protocol": "hls" } },
                { "url": "https://api.example/progressive", "format": { "protocol": "progressive" } }
            ] } }"#),
        );
        let resolver = StreamResolver::new(fetch, &config(&["token"]));
        assert_eq!(
            resolver.resolve(&TrackReference::new(TRACK)),
            StreamHandle::Direct("https://api.example/progressive?client_id=token".to_string())
        );
    }

    #[test]
    fn falls_back_to_widget_markup() {
        let fetch = FakeFetch::default().route(
            "https://widget.example/player/",
            Ok(r#"<div><audio preload="none" src="https://cdn.example/a.mp3?sig=1"></audio></div>"#),
        );
        let resolver = StreamResolver::new(fetch, &config(&[]));
        let resolution = resolver.resolve_detailed(&TrackReference::new(TRACK));
        assert_eq!(
            resolution.handle,
            StreamHandle::Direct("https://cdn.example/a.mp3?sig=1".to_string())
        );
        assert_eq!(resolution.strategy, Some(ResolveStrategy::WidgetEmbed));
    }

    #[test]
    fn falls_back_to_proxied_page() {
        let fetch = FakeFetch::default()
            .route("https://widget.example/player/", Ok("<html>no media here</html>"))
            .route(
                "https://proxy.example/?https%3A%2F%2Fsoundcloud.com",
                Ok(r#"<script>{"url":"https:\/\/cf-media.example\/abc.mp3?Policy=x&Key=y"}</script>"#),
            );
        let resolver = StreamResolver::new(fetch, &config(&[]));
        let resolution = resolver.resolve_detailed(&TrackReference::new(TRACK));
        assert_eq!(
            resolution.handle,
            StreamHandle::Direct("https://cf-media.example/abc.mp3?Policy=x&Key=y".to_string())
        );
        assert_eq!(resolution.strategy, Some(ResolveStrategy::PageProxy));
    }

    #[test]
    fn exhaustion_yields_sentinel() {
        let fetch = FakeFetch::default()
            .route("https://api.example/", Err(500))
            .route("https://widget.example/", Ok("<html></html>"))
            .route("https://proxy.example/", Err(403));
        let resolver = StreamResolver::new(fetch, &config(&["a", "b"]));
        let resolution = resolver.resolve_detailed(&TrackReference::new(TRACK));
        assert_eq!(resolution.handle, StreamHandle::WidgetOnly);
        assert_eq!(resolution.strategy, None);

        let hits: HashMap<&str, usize> = resolver.fetch.requests().iter().fold(
            HashMap::new(),
            |mut acc, url| {
                let host = if url.starts_with("https://api.example/") {
                    "api"
                } else if url.starts_with("https://widget.example/") {
                    "widget"
                } else {
                    "proxy"
                };
                *acc.entry(host).or_default() += 1;
                acc
            },
        );
        assert_eq!(hits.get("api"), Some(&2));
        assert_eq!(hits.get("widget"), Some(&1));
        assert_eq!(hits.get("proxy"), Some(&1));
    }

    #[test]
    fn pre_resolved_direct_handle_skips_network() {
        let resolver = StreamResolver::new(FakeFetch::default(), &config(&["a"]));
        let track = TrackReference::new(TRACK)
            .with_handle(StreamHandle::Direct("https://cdn.example/b.mp3".to_string()));
        assert_eq!(
            resolver.resolve(&track),
            StreamHandle::Direct("https://cdn.example/b.mp3".to_string())
        );
        assert!(resolver.fetch.requests().is_empty());
    }

    #[test]
    fn cancelled_chain_stops_before_fetching() {
        let resolver = StreamResolver::new(FakeFetch::default(), &config(&["a", "b"]));
        let cancelled = AtomicBool::new(true);
        assert!(resolver
            .resolve_cancellable(&TrackReference::new(TRACK), &cancelled)
            .is_none());
        assert!(resolver.fetch.requests().is_empty());
    }

    #[test]
    fn extraction_ignores_non_http_sources() {
        assert_eq!(
            extract_stream_url(r#"<audio src="blob:https://x/1"></audio>"#),
            None
        );
        assert_eq!(
            extract_stream_url(r#"<source type="audio/mpeg" src='http://cdn.example/x.ogg'>"#),
            Some("http://cdn.example/x.ogg".to_string())
        );
    }

    #[test]
    fn proxy_template_supports_raw_and_encoded_forms() {
        assert_eq!(proxied_url("{url}", TRACK), TRACK);
        assert_eq!(
            proxied_url("https://p.example/raw?{url_encoded}", TRACK),
            "https://p.example/raw?https%3A%2F%2Fsoundcloud.com%2Fartist%2Ftrack"
        );
    }
}
