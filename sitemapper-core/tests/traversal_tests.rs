// Tests for the traversal strategies

use sitemapper_core::traverse::{
    extract_folder, extract_index, extract_local_file, extract_range, extract_sitemap_url,
};
use sitemapper_core::{
    AggregationMode, FileSink, OutputFormat, RangeTemplate, TraversalError, TraversalOptions,
    TraversalReport,
};
use sitemapper_scanner::error::Result as ScanResult;
use sitemapper_scanner::{FetchConfig, Fetcher, PageSource, ScanError};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;

// ============================================================================
// Scripted page source
// ============================================================================

/// Serves canned pages and records every request.
#[derive(Default)]
struct ScriptedSource {
    pages: HashMap<String, String>,
    /// Cancel this token once the given URL has been served.
    cancel_after: Option<(String, CancellationToken)>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn page(mut self, url: &str, body: String) -> Self {
        self.pages.insert(url.to_string(), body);
        self
    }

    fn cancel_after(mut self, url: &str, token: CancellationToken) -> Self {
        self.cancel_after = Some((url.to_string(), token));
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl PageSource for ScriptedSource {
    async fn fetch_page(&self, url: &Url, _timeout: Duration) -> ScanResult<String> {
        self.requests.lock().unwrap().push(url.to_string());

        let page = self
            .pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| ScanError::Other(format!("navigation failed for {}", url)));

        if let Some((ref trigger, ref token)) = self.cancel_after {
            if trigger == url.as_str() {
                token.cancel();
            }
        }

        page
    }
}

fn urlset(locs: &[&str]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for loc in locs {
        xml.push_str(&format!("\n  <url><loc> {} </loc></url>", loc));
    }
    xml.push_str("\n</urlset>");
    xml
}

fn sitemap_index(locs: &[&str]) -> String {
    let mut xml = String::from(
        r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for loc in locs {
        xml.push_str(&format!("<sitemap><loc>{}</loc></sitemap>", loc));
    }
    xml.push_str("</sitemapindex>");
    xml
}

fn fetcher(source: ScriptedSource, cancel: &CancellationToken) -> Fetcher<ScriptedSource> {
    let config = FetchConfig {
        max_retries: 2,
        ..FetchConfig::default()
    };
    Fetcher::with_config(source, config, cancel.clone())
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn range_source() -> ScriptedSource {
    (1..=5).fold(ScriptedSource::default(), |source, i| {
        source.page(
            &format!("https://site.example/sitemap-{}.xml", i),
            urlset(&[
                &format!("https://site.example/{}/a", i),
                &format!("https://site.example/{}/b", i),
            ]),
        )
    })
}

fn template() -> RangeTemplate {
    RangeTemplate::parse("https://site.example/sitemap-{}.xml").unwrap()
}

// ============================================================================
// Local strategies
// ============================================================================

#[test]
fn test_local_xml_file() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let file = input.path().join("products.xml");
    fs::write(&file, urlset(&["https://shop.example/p/1", "https://shop.example/p/2"])).unwrap();

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt);
    let report = extract_local_file(&file, None, &FileSink, &options).unwrap();

    let written = output.path().join("products.txt");
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].path, written);
    assert_eq!(report.links_extracted, 2);
    assert_eq!(
        read_lines(&written),
        ["https://shop.example/p/1", "https://shop.example/p/2"]
    );
}

#[test]
fn test_local_html_file_with_base_url() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let file = input.path().join("sitemap.html");
    fs::write(
        &file,
        r#"<html><body>
            <a href="/about">About</a>
            <a href="https://elsewhere.example/">Elsewhere</a>
            <a href="blog/">Blog</a>
        </body></html>"#,
    )
    .unwrap();

    let base = Url::parse("https://site.example/").unwrap();
    let options = TraversalOptions::new(output.path(), OutputFormat::Txt);
    extract_local_file(&file, Some(&base), &FileSink, &options).unwrap();

    assert_eq!(
        read_lines(&output.path().join("sitemap.txt")),
        ["https://site.example/about", "https://site.example/blog/"]
    );
}

#[test]
fn test_local_html_file_without_base_url_keeps_relative_links_only() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let file = input.path().join("sitemap.html");
    fs::write(
        &file,
        r#"<html><a href="https://site.example/x">x</a><a href="/y">y</a></html>"#,
    )
    .unwrap();

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt);
    let report = extract_local_file(&file, None, &FileSink, &options).unwrap();

    let lines = read_lines(&output.path().join("sitemap.txt"));
    assert_eq!(report.links_extracted, 1);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("file://"));
    assert!(lines[0].ends_with("/y"));
}

#[test]
fn test_local_file_is_idempotent() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let file = input.path().join("sitemap.xml");
    fs::write(
        &file,
        urlset(&["https://site.example/b", "https://site.example/a", "https://site.example/b"]),
    )
    .unwrap();

    for format in [OutputFormat::Txt, OutputFormat::Csv] {
        let options = TraversalOptions::new(output.path(), format);
        let first = extract_local_file(&file, None, &FileSink, &options).unwrap();
        let first_bytes = fs::read(&first.artifacts[0].path).unwrap();
        let second = extract_local_file(&file, None, &FileSink, &options).unwrap();
        let second_bytes = fs::read(&second.artifacts[0].path).unwrap();

        assert_eq!(first.artifacts, second.artifacts);
        assert_eq!(first_bytes, second_bytes);
    }
}

#[test]
fn test_missing_local_file_is_an_error() {
    let output = TempDir::new().unwrap();
    let options = TraversalOptions::new(output.path(), OutputFormat::Txt);

    let result = extract_local_file(Path::new("/does/not/exist.xml"), None, &FileSink, &options);

    assert!(matches!(result, Err(TraversalError::Read { .. })));
}

#[test]
fn test_folder_extracts_each_sitemap_separately() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fs::write(input.path().join("b.xml"), urlset(&["https://site.example/b"])).unwrap();
    fs::write(
        input.path().join("a.html"),
        r#"<html><a href="/a">a</a></html>"#,
    )
    .unwrap();
    fs::write(input.path().join("notes.txt"), "not a sitemap").unwrap();
    fs::create_dir(input.path().join("nested.xml")).unwrap();

    let base = Url::parse("https://site.example/").unwrap();
    let options = TraversalOptions::new(output.path(), OutputFormat::Csv);
    let report = extract_folder(input.path(), Some(&base), &FileSink, &options).unwrap();

    let names: Vec<_> = report
        .artifacts
        .iter()
        .map(|a| a.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["a.csv", "b.csv"]);
    assert_eq!(
        fs::read_to_string(output.path().join("a.csv")).unwrap(),
        "Links\nhttps://site.example/a\n"
    );
    assert_eq!(
        fs::read_to_string(output.path().join("b.csv")).unwrap(),
        "Links\nhttps://site.example/b\n"
    );
}

#[test]
fn test_folder_names_output_before_first_dot() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fs::write(input.path().join("site.map.xml"), urlset(&["https://site.example/"])).unwrap();

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt);
    extract_folder(input.path(), None, &FileSink, &options).unwrap();

    assert!(output.path().join("site.txt").exists());
}

#[test]
fn test_folder_stops_when_cancelled() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fs::write(input.path().join("a.xml"), urlset(&["https://site.example/a"])).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let options = TraversalOptions::new(output.path(), OutputFormat::Txt).with_cancel(cancel);
    let report = extract_folder(input.path(), None, &FileSink, &options).unwrap();

    assert!(report.cancelled);
    assert!(report.artifacts.is_empty());
}

// ============================================================================
// Remote strategies
// ============================================================================

#[tokio::test]
async fn test_single_url_is_saved_under_its_host() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::default().page(
        "https://site.example/sitemap.xml",
        urlset(&["https://site.example/a", "https://site.example/b"]),
    );
    let fetcher = fetcher(source, &cancel);
    let url = Url::parse("https://site.example/sitemap.xml").unwrap();

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt).with_cancel(cancel);
    let report = extract_sitemap_url(&fetcher, &url, &FileSink, &options)
        .await
        .unwrap();

    let written = output.path().join("site.example").join("sitemap.txt");
    assert_eq!(report.artifacts[0].path, written);
    assert_eq!(
        read_lines(&written),
        ["https://site.example/a", "https://site.example/b"]
    );
}

#[tokio::test]
async fn test_single_url_failure_persists_nothing() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let fetcher = fetcher(ScriptedSource::default(), &cancel);
    let url = Url::parse("https://site.example/sitemap.xml").unwrap();

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt).with_cancel(cancel);
    let report = extract_sitemap_url(&fetcher, &url, &FileSink, &options)
        .await
        .unwrap();

    assert!(report.artifacts.is_empty());
    assert_eq!(report.failed, ["https://site.example/sitemap.xml"]);
    assert_eq!(fetcher.source().requests().len(), 2);
    assert!(!output.path().join("site.example").exists());
}

#[tokio::test]
async fn test_range_separate_mode_writes_one_file_per_index() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let fetcher = fetcher(range_source(), &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt)
        .with_mode(AggregationMode::Separate)
        .with_cancel(cancel);
    let report = extract_range(&fetcher, &template(), 1, 3, &FileSink, &options)
        .await
        .unwrap();

    let dir = output.path().join("site.example");
    assert_eq!(report.artifacts.len(), 3);
    for i in 1..=3 {
        assert_eq!(
            read_lines(&dir.join(format!("sitemap-{}.txt", i))),
            [
                format!("https://site.example/{}/a", i),
                format!("https://site.example/{}/b", i)
            ]
        );
    }
    assert!(!dir.join("site.example_range.txt").exists());
}

#[tokio::test]
async fn test_range_accumulate_mode_concatenates_in_index_order() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let fetcher = fetcher(range_source(), &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt)
        .with_mode(AggregationMode::Accumulate)
        .with_cancel(cancel);
    let report = extract_range(&fetcher, &template(), 1, 3, &FileSink, &options)
        .await
        .unwrap();

    let dir = output.path().join("site.example");
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.links_extracted, 6);
    assert_eq!(
        read_lines(&dir.join("site.example_range.txt")),
        [
            "https://site.example/1/a",
            "https://site.example/1/b",
            "https://site.example/2/a",
            "https://site.example/2/b",
            "https://site.example/3/a",
            "https://site.example/3/b",
        ]
    );
    assert!(!dir.join("sitemap-1.txt").exists());
}

#[tokio::test]
async fn test_range_with_workers_keeps_index_order() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let fetcher = fetcher(range_source(), &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt)
        .with_workers(4)
        .with_cancel(cancel);
    extract_range(&fetcher, &template(), 1, 5, &FileSink, &options)
        .await
        .unwrap();

    let lines = read_lines(&output.path().join("site.example").join("site.example_range.txt"));
    let expected: Vec<String> = (1..=5)
        .flat_map(|i| {
            [
                format!("https://site.example/{}/a", i),
                format!("https://site.example/{}/b", i),
            ]
        })
        .collect();
    assert_eq!(lines, expected);
}

#[tokio::test]
async fn test_range_skips_failed_indices() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::default()
        .page(
            "https://site.example/sitemap-1.xml",
            urlset(&["https://site.example/1"]),
        )
        .page(
            "https://site.example/sitemap-3.xml",
            urlset(&["https://site.example/3"]),
        );
    let fetcher = fetcher(source, &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt).with_cancel(cancel);
    let report = extract_range(&fetcher, &template(), 1, 3, &FileSink, &options)
        .await
        .unwrap();

    assert_eq!(report.failed, ["https://site.example/sitemap-2.xml"]);
    assert_eq!(
        read_lines(&output.path().join("site.example").join("site.example_range.txt")),
        ["https://site.example/1", "https://site.example/3"]
    );
}

#[tokio::test]
async fn test_range_cancelled_after_index_two_in_separate_mode() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let source = range_source().cancel_after("https://site.example/sitemap-2.xml", cancel.clone());
    let fetcher = fetcher(source, &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt)
        .with_mode(AggregationMode::Separate)
        .with_cancel(cancel);
    let report = extract_range(&fetcher, &template(), 1, 5, &FileSink, &options)
        .await
        .unwrap();

    let dir = output.path().join("site.example");
    assert!(report.cancelled);
    assert!(dir.join("sitemap-1.txt").exists());
    assert!(dir.join("sitemap-2.txt").exists());
    for i in 3..=5 {
        assert!(!dir.join(format!("sitemap-{}.txt", i)).exists());
    }
    assert_eq!(fetcher.source().requests().len(), 2);
}

#[tokio::test]
async fn test_range_cancelled_in_accumulate_mode_writes_nothing() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let source = range_source().cancel_after("https://site.example/sitemap-2.xml", cancel.clone());
    let fetcher = fetcher(source, &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt)
        .with_mode(AggregationMode::Accumulate)
        .with_cancel(cancel);
    let report = extract_range(&fetcher, &template(), 1, 5, &FileSink, &options)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.artifacts.is_empty());
    assert!(!output.path().join("site.example").exists());
}

#[tokio::test]
async fn test_range_rejects_reversed_bounds() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let fetcher = fetcher(range_source(), &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt);
    let result = extract_range(&fetcher, &template(), 5, 1, &FileSink, &options).await;

    assert!(matches!(result, Err(TraversalError::InvalidInput(_))));
    assert!(fetcher.source().requests().is_empty());
}

#[tokio::test]
async fn test_range_up_to_i64_max_stops_when_cancelled() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let fetcher = fetcher(range_source(), &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt)
        .with_mode(AggregationMode::Separate)
        .with_workers(4)
        .with_cancel(cancel);
    let report = extract_range(&fetcher, &template(), 1, i64::MAX, &FileSink, &options)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.artifacts.is_empty());
    assert!(fetcher.source().requests().is_empty());
}

#[tokio::test]
async fn test_range_up_to_i64_max_fetches_lazily() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let source = range_source().cancel_after("https://site.example/sitemap-3.xml", cancel.clone());
    let fetcher = fetcher(source, &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt)
        .with_mode(AggregationMode::Separate)
        .with_cancel(cancel);
    let report = extract_range(&fetcher, &template(), 1, i64::MAX, &FileSink, &options)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.artifacts.len(), 3);
    assert_eq!(fetcher.source().requests().len(), 3);
}

// ============================================================================
// Index sitemaps
// ============================================================================

fn index_source() -> ScriptedSource {
    ScriptedSource::default()
        .page(
            "https://site.example/sitemap_index.xml",
            sitemap_index(&[
                "https://site.example/post-sitemap.xml",
                "https://site.example/page-sitemap.xml",
            ]),
        )
        .page(
            "https://site.example/post-sitemap.xml",
            urlset(&["https://site.example/p1", "https://site.example/p2"]),
        )
        .page(
            "https://site.example/page-sitemap.xml",
            urlset(&[
                "https://site.example/about",
                "https://site.example/contact",
                "https://site.example/",
            ]),
        )
}

fn index_url() -> Url {
    Url::parse("https://site.example/sitemap_index.xml").unwrap()
}

#[tokio::test]
async fn test_index_accumulate_end_to_end() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let fetcher = fetcher(index_source(), &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt)
        .with_mode(AggregationMode::Accumulate)
        .with_cancel(cancel);
    let report = extract_index(&fetcher, &index_url(), &FileSink, &options)
        .await
        .unwrap();

    let written = output
        .path()
        .join("site.example")
        .join("site.example_all_links.txt");
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].links, 5);
    assert_eq!(
        read_lines(&written),
        [
            "https://site.example/p1",
            "https://site.example/p2",
            "https://site.example/about",
            "https://site.example/contact",
            "https://site.example/",
        ]
    );
    assert_eq!(
        fetcher.source().requests(),
        [
            "https://site.example/sitemap_index.xml",
            "https://site.example/post-sitemap.xml",
            "https://site.example/page-sitemap.xml",
        ]
    );
}

#[tokio::test]
async fn test_index_separate_mode_names_files_after_children() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let fetcher = fetcher(index_source(), &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Csv)
        .with_mode(AggregationMode::Separate)
        .with_cancel(cancel);
    extract_index(&fetcher, &index_url(), &FileSink, &options)
        .await
        .unwrap();

    let dir = output.path().join("site.example");
    assert_eq!(
        fs::read_to_string(dir.join("post-sitemap.csv")).unwrap(),
        "Links\nhttps://site.example/p1\nhttps://site.example/p2\n"
    );
    assert!(dir.join("page-sitemap.csv").exists());
    assert!(!dir.join("site.example_all_links.csv").exists());
}

#[tokio::test]
async fn test_index_skips_failed_and_invalid_children() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::default()
        .page(
            "https://site.example/sitemap_index.xml",
            sitemap_index(&[
                "https://site.example/gone.xml",
                "not a url",
                "https://site.example/live.xml",
            ]),
        )
        .page(
            "https://site.example/live.xml",
            urlset(&["https://site.example/live"]),
        );
    let fetcher = fetcher(source, &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt).with_cancel(cancel);
    let report = extract_index(&fetcher, &index_url(), &FileSink, &options)
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0], "https://site.example/gone.xml");
    assert_eq!(
        read_lines(
            &output
                .path()
                .join("site.example")
                .join("site.example_all_links.txt")
        ),
        ["https://site.example/live"]
    );
}

#[tokio::test]
async fn test_index_fetch_failure_persists_nothing() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let fetcher = fetcher(ScriptedSource::default(), &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt).with_cancel(cancel);
    let report = extract_index(&fetcher, &index_url(), &FileSink, &options)
        .await
        .unwrap();

    assert!(report.artifacts.is_empty());
    assert_eq!(report.failed, ["https://site.example/sitemap_index.xml"]);
}

#[tokio::test]
async fn test_index_cancelled_after_first_child() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let source =
        index_source().cancel_after("https://site.example/post-sitemap.xml", cancel.clone());
    let fetcher = fetcher(source, &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Txt)
        .with_mode(AggregationMode::Separate)
        .with_cancel(cancel);
    let report = extract_index(&fetcher, &index_url(), &FileSink, &options)
        .await
        .unwrap();

    let dir = output.path().join("site.example");
    assert!(report.cancelled);
    assert!(dir.join("post-sitemap.txt").exists());
    assert!(!dir.join("page-sitemap.txt").exists());
}

// ============================================================================
// Run reports
// ============================================================================

#[tokio::test]
async fn test_report_round_trips_through_json() {
    let output = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::default().page(
        "https://site.example/sitemap-1.xml",
        urlset(&["https://site.example/1"]),
    );
    let fetcher = fetcher(source, &cancel);

    let options = TraversalOptions::new(output.path(), OutputFormat::Csv)
        .with_mode(AggregationMode::Separate)
        .with_cancel(cancel);
    let report = extract_range(&fetcher, &template(), 1, 2, &FileSink, &options)
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["links_extracted"], 1);
    assert_eq!(json["cancelled"], false);
    assert_eq!(json["failed"][0], "https://site.example/sitemap-2.xml");
    assert_eq!(json["artifacts"][0]["links"], 1);

    let decoded: TraversalReport = serde_json::from_value(json).unwrap();
    assert_eq!(decoded.artifacts, report.artifacts);
    assert_eq!(decoded.links_extracted, report.links_extracted);
    assert_eq!(decoded.failed, report.failed);
    assert_eq!(decoded.cancelled, report.cancelled);
}
