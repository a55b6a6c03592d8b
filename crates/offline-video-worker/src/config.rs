//! Worker and service configuration

use crate::error::{Result, WorkerError};
use cache_storage::RequestKey;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CACHE_VERSION: &str = "pwa-video-cache-v5";
pub const DEFAULT_PRECACHE: &[&str] = &["./", "./index.html", "./manifest.json", "./video.mp4"];
pub const DEFAULT_VIDEO_PATH: &str = "./video.mp4";
pub const DEFAULT_ENTRY_PATH: &str = "./index.html";

/// Immutable worker configuration. Relative asset paths are resolved
/// against the site origin once, at construction.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Version-tagged bucket name; bumping it invalidates every cached entry
    pub cache_name: String,
    pub origin: Url,
    pub precache: Vec<Url>,
    pub video_url: Url,
    /// Markup entry point served to offline navigations
    pub entry_url: Url,
}

impl WorkerConfig {
    pub fn new<S: AsRef<str>>(
        origin: Url,
        cache_name: impl Into<String>,
        precache: &[S],
        video_path: &str,
        entry_path: &str,
    ) -> Result<Self> {
        let cache_name = cache_name.into();
        if cache_name.trim().is_empty() {
            return Err(WorkerError::Config("cache name must not be empty".to_string()));
        }

        let origin = with_trailing_slash(origin);
        let precache = precache
            .iter()
            .map(|path| origin.join(path.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let video_url = origin.join(video_path)?;
        let entry_url = origin.join(entry_path)?;

        Ok(Self {
            cache_name,
            origin,
            precache,
            video_url,
            entry_url,
        })
    }

    /// Whether `url` names the video asset (query and fragment ignored)
    pub fn is_video(&self, url: &Url) -> bool {
        url.origin() == self.video_url.origin() && url.path() == self.video_url.path()
    }

    pub fn video_key(&self) -> RequestKey {
        RequestKey::get(self.video_url.as_str())
    }

    pub fn entry_key(&self) -> RequestKey {
        RequestKey::get(self.entry_url.as_str())
    }

    pub fn precache_keys(&self) -> Vec<RequestKey> {
        self.precache
            .iter()
            .map(|url| RequestKey::get(url.as_str()))
            .collect()
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cache_dir: PathBuf,
    pub network_timeout: Option<Duration>,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = lookup("PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(3002);

        let cache_dir = lookup("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./cache/offline"));

        let network_timeout = lookup("NETWORK_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        let origin = lookup("ORIGIN_URL").unwrap_or_else(|| "http://localhost:8080/".to_string());
        let origin = Url::parse(&origin)
            .map_err(|e| WorkerError::Config(format!("ORIGIN_URL {:?}: {}", origin, e)))?;

        let cache_name =
            lookup("CACHE_VERSION").unwrap_or_else(|| DEFAULT_CACHE_VERSION.to_string());

        let precache: Vec<String> = match lookup("PRECACHE") {
            Some(list) => list
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            None => DEFAULT_PRECACHE.iter().map(|p| p.to_string()).collect(),
        };

        let video_path = lookup("VIDEO_PATH").unwrap_or_else(|| DEFAULT_VIDEO_PATH.to_string());
        let entry_path = lookup("ENTRY_PATH").unwrap_or_else(|| DEFAULT_ENTRY_PATH.to_string());

        let worker = WorkerConfig::new(
            origin,
            cache_name,
            precache.as_slice(),
            &video_path,
            &entry_path,
        )?;

        Ok(Self {
            port,
            cache_dir,
            network_timeout,
            worker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 3002);
        assert_eq!(config.cache_dir, PathBuf::from("./cache/offline"));
        assert_eq!(config.network_timeout, None);
        assert_eq!(config.worker.cache_name, "pwa-video-cache-v5");
        assert_eq!(
            config.worker.video_url.as_str(),
            "http://localhost:8080/video.mp4"
        );
        assert_eq!(
            config.worker.entry_url.as_str(),
            "http://localhost:8080/index.html"
        );

        let precache: Vec<&str> = config.worker.precache.iter().map(|u| u.as_str()).collect();
        assert_eq!(
            precache,
            vec![
                "http://localhost:8080/",
                "http://localhost:8080/index.html",
                "http://localhost:8080/manifest.json",
                "http://localhost:8080/video.mp4",
            ]
        );
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "9000"),
            ("CACHE_VERSION", "pwa-video-cache-v6"),
            ("ORIGIN_URL", "https://example.github.io/demo"),
            ("PRECACHE", "./, ./index.html, ./style.css,"),
            ("NETWORK_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.worker.cache_name, "pwa-video-cache-v6");
        assert_eq!(config.network_timeout, Some(Duration::from_secs(30)));
        // Origin path gains a trailing slash so relative paths stay inside it
        assert_eq!(
            config.worker.origin.as_str(),
            "https://example.github.io/demo/"
        );
        assert_eq!(config.worker.precache.len(), 3);
        assert_eq!(
            config.worker.precache[2].as_str(),
            "https://example.github.io/demo/style.css"
        );
        assert_eq!(
            config.worker.video_url.as_str(),
            "https://example.github.io/demo/video.mp4"
        );
    }

    #[test]
    fn test_invalid_origin() {
        let err = Config::from_lookup(lookup_from(&[("ORIGIN_URL", "not a url")])).unwrap_err();
        assert!(format!("{}", err).contains("ORIGIN_URL"));
    }

    #[test]
    fn test_empty_cache_name_rejected() {
        let origin = Url::parse("http://localhost:8080/").unwrap();
        let result = WorkerConfig::new(origin, " ", DEFAULT_PRECACHE, "./video.mp4", "./index.html");
        assert!(result.is_err());
    }

    #[test]
    fn test_is_video_ignores_query() {
        let origin = Url::parse("http://localhost:8080/").unwrap();
        let config =
            WorkerConfig::new(origin, "v1", DEFAULT_PRECACHE, "./video.mp4", "./index.html")
                .unwrap();

        let with_query = Url::parse("http://localhost:8080/video.mp4?t=10").unwrap();
        let other = Url::parse("http://localhost:8080/other.mp4").unwrap();
        let cross_origin = Url::parse("http://cdn.example.com/video.mp4").unwrap();

        assert!(config.is_video(&with_query));
        assert!(!config.is_video(&other));
        assert!(!config.is_video(&cross_origin));
    }
}
