use crate::output::{LinkSink, OutputError, OutputFormat};
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use sitemapper_scanner::{
    ContentFormat, FetchFailure, Fetcher, LinkSet, PageSource, SitemapContent, extract_links,
    network_location,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Callback for reporting traversal progress
pub type TraversalProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Error, Debug)]
pub enum TraversalError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type Result<T> = std::result::Result<T, TraversalError>;

/// How results of a multi-sitemap traversal are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// One output file per fetched sitemap
    Separate,
    /// Every sitemap's links concatenated into one file
    Accumulate,
}

/// Options shared by every traversal strategy
#[derive(Clone)]
pub struct TraversalOptions {
    pub output_root: PathBuf,
    pub format: OutputFormat,
    pub mode: AggregationMode,
    /// Fetches in flight at once for range and index traversals
    pub workers: usize,
    pub cancel: CancellationToken,
    pub progress: Option<TraversalProgressCallback>,
}

impl TraversalOptions {
    pub fn new(output_root: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            output_root: output_root.into(),
            format,
            mode: AggregationMode::Accumulate,
            workers: 1,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_mode(mut self, mode: AggregationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: TraversalProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report_progress(&self, message: String) {
        if let Some(ref callback) = self.progress {
            callback(message);
        }
    }
}

/// One file written by a traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub links: usize,
}

/// What a traversal did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraversalReport {
    pub artifacts: Vec<Artifact>,
    pub links_extracted: usize,
    /// Sources that produced no content
    pub failed: Vec<String>,
    pub cancelled: bool,
}

impl TraversalReport {
    fn record_failure(&mut self, failure: &FetchFailure) {
        if failure.is_cancelled() {
            self.cancelled = true;
        } else {
            self.failed.push(failure.url().to_string());
        }
    }
}

/// A URL template with a single `{}` placeholder for the sitemap number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTemplate {
    template: String,
}

impl RangeTemplate {
    pub const PLACEHOLDER: &'static str = "{}";

    pub fn parse(template: &str) -> Result<Self> {
        let template = template.trim();
        let placeholders = template.matches(Self::PLACEHOLDER).count();
        if placeholders != 1 {
            return Err(TraversalError::InvalidInput(format!(
                "URL template must contain exactly one '{}' placeholder, found {}",
                Self::PLACEHOLDER,
                placeholders
            )));
        }

        let parsed = Self {
            template: template.to_string(),
        };
        let sample = parsed.url(1)?;
        if sample.host_str().is_none() {
            return Err(TraversalError::InvalidInput(format!(
                "URL template has no host: {}",
                template
            )));
        }

        Ok(parsed)
    }

    pub fn instantiate(&self, index: i64) -> String {
        self.template
            .replacen(Self::PLACEHOLDER, &index.to_string(), 1)
    }

    pub fn url(&self, index: i64) -> Result<Url> {
        let instantiated = self.instantiate(index);
        Url::parse(&instantiated)
            .map_err(|e| TraversalError::InvalidInput(format!("{}: {}", instantiated, e)))
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// File name stem of a local sitemap: the name without its last extension.
pub fn local_file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sitemap".to_string())
}

/// Output name of a child sitemap: the last path segment up to its first `.`.
///
/// `https://site.example/post-sitemap.xml.gz` is named `post-sitemap`.
pub fn child_base_name(url: &Url) -> Option<String> {
    let segment = url.path().rsplit('/').next().unwrap_or_default();
    let name = segment.split('.').next().unwrap_or_default();
    (!name.is_empty()).then(|| name.to_string())
}

/// Extracts and saves the links of one sitemap file on disk.
///
/// HTML links are resolved against `base_url` when given, otherwise against
/// the file's own `file://` URL.
pub fn extract_local_file(
    path: &Path,
    base_url: Option<&Url>,
    sink: &impl LinkSink,
    options: &TraversalOptions,
) -> Result<TraversalReport> {
    let content = read_local_sitemap(path, base_url)?;
    let links = extract_links(&content);

    let mut report = TraversalReport {
        links_extracted: links.len(),
        ..TraversalReport::default()
    };
    persist(
        sink,
        &links,
        &options.output_root,
        &local_file_stem(path),
        options,
        &mut report,
    )?;
    Ok(report)
}

/// Extracts every `.xml` and `.html` sitemap in `dir`, one output file each.
///
/// Files are visited in name order. Unreadable files are skipped.
pub fn extract_folder(
    dir: &Path,
    base_url: Option<&Url>,
    sink: &impl LinkSink,
    options: &TraversalOptions,
) -> Result<TraversalReport> {
    let read_error = |source| TraversalError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if path.is_file() && (name.ends_with(".xml") || name.ends_with(".html")) {
            files.push((name, path));
        }
    }
    files.sort();
    info!("Found {} sitemap files in {}", files.len(), dir.display());

    let mut report = TraversalReport::default();
    for (name, path) in files {
        if options.cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        options.report_progress(format!("Extracting {}", path.display()));

        let content = match read_local_sitemap(&path, base_url) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                report.failed.push(path.display().to_string());
                continue;
            }
        };
        let links = extract_links(&content);
        report.links_extracted += links.len();
        let stem = name.split('.').next().unwrap_or_default();
        persist(sink, &links, &options.output_root, stem, options, &mut report)?;
    }

    Ok(report)
}

/// Extracts the links of one remote sitemap into `<netloc>/sitemap`.
pub async fn extract_sitemap_url<S: PageSource>(
    fetcher: &Fetcher<S>,
    url: &Url,
    sink: &impl LinkSink,
    options: &TraversalOptions,
) -> Result<TraversalReport> {
    let dir = options.output_root.join(network_location(url));
    let mut report = TraversalReport::default();

    options.report_progress(format!("[FETCHING] {}", url));
    match fetcher.fetch(url).await {
        Ok(content) => {
            let links = extract_links(&content);
            report.links_extracted = links.len();
            persist(sink, &links, &dir, "sitemap", options, &mut report)?;
        }
        Err(failure) => report.record_failure(&failure),
    }

    Ok(report)
}

/// Extracts the sitemaps `template(start)..=template(end)`, in index order.
pub async fn extract_range<S: PageSource>(
    fetcher: &Fetcher<S>,
    template: &RangeTemplate,
    start: i64,
    end: i64,
    sink: &impl LinkSink,
    options: &TraversalOptions,
) -> Result<TraversalReport> {
    if start > end {
        return Err(TraversalError::InvalidInput(format!(
            "range start {} is greater than range end {}",
            start, end
        )));
    }

    let domain = network_location(&template.url(start)?);
    let dir = options.output_root.join(&domain);

    // Built one at a time as the traversal reaches them; ranges can be huge.
    let nodes = (start..=end).map(|i| Node {
        label: format!("Sitemap {}", i),
        target: template.url(i).map_err(|e| e.to_string()),
        name: format!("sitemap-{}", i),
    });

    let mut report = TraversalReport::default();
    let aggregate = traverse_nodes(fetcher, nodes, &dir, sink, options, &mut report).await?;

    if let Some(links) = aggregate {
        persist(
            sink,
            &links,
            &dir,
            &format!("{}_range", domain),
            options,
            &mut report,
        )?;
    }

    Ok(report)
}

/// Extracts an index sitemap's children, each child being one sitemap.
pub async fn extract_index<S: PageSource>(
    fetcher: &Fetcher<S>,
    url: &Url,
    sink: &impl LinkSink,
    options: &TraversalOptions,
) -> Result<TraversalReport> {
    let domain = network_location(url);
    let dir = options.output_root.join(&domain);
    let mut report = TraversalReport::default();

    options.report_progress(format!("[FETCHING] Index sitemap: {}", url));
    let children = match fetcher.fetch(url).await {
        Ok(content) => extract_links(&content),
        Err(failure) => {
            report.record_failure(&failure);
            return Ok(report);
        }
    };
    info!("Index sitemap {} lists {} child sitemaps", url, children.len());

    let nodes = children.into_iter().zip(1..).map(|(child, i)| {
        let target = Url::parse(&child).map_err(|e| format!("{}: {}", child, e));
        let name = target
            .as_ref()
            .ok()
            .and_then(child_base_name)
            .unwrap_or_else(|| format!("sitemap-{}", i));
        Node {
            label: format!("Child Sitemap {}", i),
            target,
            name,
        }
    });

    let aggregate = traverse_nodes(fetcher, nodes, &dir, sink, options, &mut report).await?;

    if let Some(links) = aggregate {
        persist(
            sink,
            &links,
            &dir,
            &format!("{}_all_links", domain),
            options,
            &mut report,
        )?;
    }

    Ok(report)
}

/// One sitemap of a multi-sitemap traversal.
struct Node {
    label: String,
    target: std::result::Result<Url, String>,
    name: String,
}

enum NodeOutcome {
    Fetched(SitemapContent),
    Failed(FetchFailure),
    Invalid(String),
    Cancelled,
}

/// Fetches and extracts `nodes` in order.
///
/// In separate mode every node is persisted as it completes and `None` is
/// returned. In accumulate mode the concatenated links are returned, or
/// `None` when the run was cancelled before every node was seen.
async fn traverse_nodes<S: PageSource>(
    fetcher: &Fetcher<S>,
    nodes: impl Iterator<Item = Node>,
    dir: &Path,
    sink: &impl LinkSink,
    options: &TraversalOptions,
    report: &mut TraversalReport,
) -> Result<Option<LinkSet>> {
    let mut aggregate = LinkSet::new();

    let mut outcomes = stream::iter(nodes)
        .map(|node| async move {
            if options.cancel.is_cancelled() {
                return (node, NodeOutcome::Cancelled);
            }
            let outcome = match &node.target {
                Ok(url) => {
                    options.report_progress(format!("[FETCHING] {}: {}", node.label, url));
                    match fetcher.fetch(url).await {
                        Ok(content) => NodeOutcome::Fetched(content),
                        Err(failure) if failure.is_cancelled() => NodeOutcome::Cancelled,
                        Err(failure) => NodeOutcome::Failed(failure),
                    }
                }
                Err(reason) => NodeOutcome::Invalid(reason.clone()),
            };
            (node, outcome)
        })
        .buffered(options.workers.max(1));

    while let Some((node, outcome)) = outcomes.next().await {
        match outcome {
            NodeOutcome::Cancelled => {
                info!("Traversal cancelled before {}", node.label);
                report.cancelled = true;
                break;
            }
            NodeOutcome::Invalid(reason) => {
                warn!("Skipping {}: invalid URL {}", node.label, reason);
                report.failed.push(reason);
            }
            NodeOutcome::Failed(failure) => {
                debug!("{} contributed nothing: {}", node.label, failure);
                report.record_failure(&failure);
            }
            NodeOutcome::Fetched(content) => {
                let links = extract_links(&content);
                report.links_extracted += links.len();
                match options.mode {
                    AggregationMode::Separate => {
                        persist(sink, &links, dir, &node.name, options, report)?;
                    }
                    AggregationMode::Accumulate => aggregate.append(links),
                }
            }
        }
    }

    if report.cancelled || options.mode == AggregationMode::Separate {
        return Ok(None);
    }
    Ok(Some(aggregate))
}

fn read_local_sitemap(path: &Path, base_url: Option<&Url>) -> Result<SitemapContent> {
    let raw = fs::read_to_string(path).map_err(|source| TraversalError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let origin = match base_url {
        Some(url) => url.clone(),
        None => file_url(path)?,
    };

    Ok(SitemapContent::new(ContentFormat::from_path(path), raw, origin))
}

fn file_url(path: &Path) -> Result<Url> {
    let absolute = std::path::absolute(path).map_err(|source| TraversalError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Url::from_file_path(&absolute).map_err(|_| {
        TraversalError::InvalidInput(format!("cannot express {} as a URL", absolute.display()))
    })
}

/// Hands `links` to the sink and records the artifact.
fn persist(
    sink: &impl LinkSink,
    links: &LinkSet,
    dir: &Path,
    name: &str,
    options: &TraversalOptions,
    report: &mut TraversalReport,
) -> Result<()> {
    let path = sink.persist(links, dir, name, options.format)?;
    report.artifacts.push(Artifact {
        path,
        links: links.len(),
    });
    Ok(())
}
