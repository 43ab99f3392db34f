use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use url::Url;

/// How a piece of sitemap content is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Xml,
    Html,
}

impl ContentFormat {
    /// Classifies fetched content by looking for an `<html` root marker,
    /// ignoring case. Anything without one is treated as XML.
    ///
    /// Content-Type headers are deliberately not consulted: sitemap hosts
    /// regularly serve XML as `text/html` and the other way around.
    pub fn sniff(raw: &str) -> Self {
        const MARKER: &[u8] = b"<html";
        let found = raw
            .as_bytes()
            .windows(MARKER.len())
            .any(|window| window.eq_ignore_ascii_case(MARKER));

        if found {
            ContentFormat::Html
        } else {
            ContentFormat::Xml
        }
    }

    /// Format of a file on disk: `.xml` is XML, everything else HTML.
    pub fn from_path(path: &Path) -> Self {
        if path.to_string_lossy().ends_with(".xml") {
            ContentFormat::Xml
        } else {
            ContentFormat::Html
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFormat::Xml => "xml",
            ContentFormat::Html => "html",
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw sitemap content together with where it came from.
#[derive(Debug, Clone)]
pub struct SitemapContent {
    format: ContentFormat,
    raw: String,
    origin: Url,
}

impl SitemapContent {
    pub fn new(format: ContentFormat, raw: String, origin: Url) -> Self {
        Self {
            format,
            raw,
            origin,
        }
    }

    /// Builds content from a fetched page, classifying it with [`ContentFormat::sniff`].
    pub fn sniffed(raw: String, origin: Url) -> Self {
        let format = ContentFormat::sniff(&raw);
        Self::new(format, raw, origin)
    }

    pub fn format(&self) -> ContentFormat {
        self.format
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }
}

/// Ordered list of extracted links. Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkSet(Vec<String>);

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, link: impl Into<String>) {
        self.0.push(link.into());
    }

    /// Appends every link of `other`, keeping its order.
    pub fn append(&mut self, mut other: LinkSet) {
        self.0.append(&mut other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for LinkSet {
    fn from(links: Vec<String>) -> Self {
        Self(links)
    }
}

impl FromIterator<String> for LinkSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for LinkSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a LinkSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The `[user[:password]@]host[:port]` part of a URL.
///
/// Default ports are dropped by `url` during parsing, so `https://a:443/`
/// and `https://a/` share a network location.
pub fn network_location(url: &Url) -> String {
    let mut netloc = String::new();

    if !url.username().is_empty() {
        netloc.push_str(url.username());
        if let Some(password) = url.password() {
            netloc.push(':');
            netloc.push_str(password);
        }
        netloc.push('@');
    }
    if let Some(host) = url.host_str() {
        netloc.push_str(host);
    }
    if let Some(port) = url.port() {
        netloc.push(':');
        netloc.push_str(&port.to_string());
    }

    netloc
}
