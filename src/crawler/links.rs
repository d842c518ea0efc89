//! Link extraction and resolution
//!
//! Anchors are found with a regex over the saved page. Each `href` is
//! resolved against the page it came from:
//! - `http://host[:port]/path` is local when it names the target server,
//!   foreign otherwise
//! - `/path` is already root-relative
//! - `../site2/page.html` drops the leading `..`
//! - `page.html` is relative to the page's directory
//!
//! Fragments and query strings are dropped. Other schemes, bare fragments
//! and hosts that fail to resolve are skipped.

use regex::Regex;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::LazyLock;
use tracing::debug;

static HREF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*["']([^"']*)["']"#)
        .expect("Invalid href regex")
});

static ABSOLUTE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:http)://([^/:]+)(?::(\d+))?(/.*)?$").expect("Invalid URL regex")
});

/// A resolved link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Root-relative path on the target server
    Local(String),
    /// Full URL on some other server
    Foreign(String),
}

impl Link {
    pub fn into_string(self) -> String {
        match self {
            Link::Local(s) | Link::Foreign(s) => s,
        }
    }
}

/// The server being crawled
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub addrs: Vec<SocketAddr>,
}

impl Target {
    /// Resolve `host:port` once up front
    pub fn resolve(host: &str, port: u16) -> std::io::Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        Ok(Self {
            host: host.to_string(),
            port,
            addrs,
        })
    }

    /// Whether `host:port` names this server
    ///
    /// Returns `None` when `host` cannot be resolved.
    pub fn matches(&self, host: &str, port: u16) -> Option<bool> {
        if port != self.port {
            return Some(false);
        }
        if host.eq_ignore_ascii_case(&self.host) {
            return Some(true);
        }
        let resolved = (host, port).to_socket_addrs().ok()?;
        Some(resolved.into_iter().any(|a| self.addrs.contains(&a)))
    }

    pub fn display(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Drop `#fragment` and `?query`
fn strip_suffixes(path: &str) -> &str {
    let end = path.find(['#', '?']).unwrap_or(path.len());
    &path[..end]
}

/// Directory part of a root-relative path, with trailing slash
fn directory_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    }
}

/// Resolve a raw `href` value found on `page_path`
pub fn resolve(raw: &str, page_path: &str, target: &Target) -> Option<Link> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }

    if let Some(caps) = ABSOLUTE_URL_REGEX.captures(raw) {
        let host = caps.get(1)?.as_str();
        let port = match caps.get(2) {
            Some(p) => p.as_str().parse::<u16>().ok()?,
            None => 80,
        };
        let path = caps.get(3).map_or("/", |m| strip_suffixes(m.as_str()));
        return match target.matches(host, port) {
            Some(true) => Some(Link::Local(path.to_string())),
            Some(false) => Some(Link::Foreign(format!("http://{}:{}{}", host, port, path))),
            None => {
                debug!(host, "Cannot resolve link host, skipping");
                None
            }
        };
    }

    // some other scheme (mailto:, ftp:, javascript:)
    if raw.contains("://") || raw.split('/').next().is_some_and(|s| s.contains(':')) {
        return None;
    }

    let raw = strip_suffixes(raw);
    let path = if raw.starts_with('/') {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("..") {
        if rest.starts_with('/') {
            rest.to_string()
        } else {
            return None;
        }
    } else {
        format!("{}{}", directory_of(page_path), raw.trim_start_matches("./"))
    };

    if path.is_empty() || path.ends_with('/') {
        return None;
    }
    Some(Link::Local(path))
}

/// Extract and resolve every anchor target in `html`
pub fn extract_links(html: &str, page_path: &str, target: &Target) -> Vec<Link> {
    HREF_REGEX
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| resolve(m.as_str(), page_path, target))
        .collect()
}

/// Split a URL popped from the frontier into a root-relative path
///
/// Foreign URLs come back as `Err` with the URL itself.
pub fn classify(url: &str, target: &Target) -> Result<String, String> {
    if url.starts_with('/') {
        return Ok(url.to_string());
    }
    match resolve(url, "/", target) {
        Some(Link::Local(path)) => Ok(path),
        _ => Err(url.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target {
            host: "localhost".into(),
            port: 8080,
            addrs: vec!["127.0.0.1:8080".parse().unwrap()],
        }
    }

    #[test]
    fn test_root_relative_and_parent_links() {
        let t = target();
        assert_eq!(
            resolve("/site1/a.html", "/site1/index.html", &t),
            Some(Link::Local("/site1/a.html".into()))
        );
        assert_eq!(
            resolve("../site2/p.html", "/site1/index.html", &t),
            Some(Link::Local("/site2/p.html".into()))
        );
        assert_eq!(
            resolve("b.html#top", "/site1/index.html", &t),
            Some(Link::Local("/site1/b.html".into()))
        );
    }

    #[test]
    fn test_absolute_links() {
        let t = target();
        assert_eq!(
            resolve("http://localhost:8080/site3/x.html", "/site1/index.html", &t),
            Some(Link::Local("/site3/x.html".into()))
        );
        assert_eq!(
            resolve("http://127.0.0.1:8080/site3/y.html", "/", &t),
            Some(Link::Local("/site3/y.html".into()))
        );
        assert_eq!(
            resolve("http://localhost:9090/site3/x.html", "/", &t),
            Some(Link::Foreign("http://localhost:9090/site3/x.html".into()))
        );
    }

    #[test]
    fn test_skipped_links() {
        let t = target();
        assert_eq!(resolve("mailto:someone@example.com", "/", &t), None);
        assert_eq!(resolve("#section", "/", &t), None);
        assert_eq!(resolve("", "/", &t), None);
        assert_eq!(resolve("..", "/site1/index.html", &t), None);
    }

    #[test]
    fn test_extract_links_from_page() {
        let html = r#"<html><body>
            <a href="/site1/page1.html">one</a>
            <A class="x" HREF='../site2/page2.html'>two</A>
            <a href="http://localhost:9999/site9/far.html">far</a>
            <img src="/site1/pic.png">
        </body></html>"#;

        let links = extract_links(html, "/site1/index.html", &target());
        assert_eq!(
            links,
            vec![
                Link::Local("/site1/page1.html".into()),
                Link::Local("/site2/page2.html".into()),
                Link::Foreign("http://localhost:9999/site9/far.html".into()),
            ]
        );
    }

    #[test]
    fn test_classify() {
        let t = target();
        assert_eq!(classify("/site1/a.html", &t), Ok("/site1/a.html".into()));
        assert_eq!(
            classify("http://localhost:8080/site1/a.html", &t),
            Ok("/site1/a.html".into())
        );
        assert!(classify("http://localhost:1/site1/a.html", &t).is_err());
    }
}
