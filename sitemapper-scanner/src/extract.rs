use crate::content::{ContentFormat, LinkSet, SitemapContent, network_location};
use crate::error::{Result, ScanError};
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

/// Extracts every location entry from `content`.
///
/// Parse failures are logged and produce an empty set; they never stop a
/// traversal.
pub fn extract_links(content: &SitemapContent) -> LinkSet {
    let extracted = match content.format() {
        ContentFormat::Xml => extract_xml_links(content.raw()),
        ContentFormat::Html => extract_html_links(content.raw(), content.origin()),
    };

    match extracted {
        Ok(links) => {
            info!(
                "Extracted {} links from {} sitemap {}",
                links.len(),
                content.format(),
                content.origin()
            );
            links
        }
        Err(e) => {
            warn!("[ERROR] {} sitemap {}: {}", content.format(), content.origin(), e);
            LinkSet::new()
        }
    }
}

/// Collects the trimmed text of every `loc` element in the root element's
/// namespace, in document order.
pub fn extract_xml_links(raw: &str) -> Result<LinkSet> {
    let raw = raw.trim_start_matches('\u{feff}');
    let mut reader = NsReader::from_str(raw);
    reader.config_mut().trim_text(true);

    // Namespace of the root element; `Some(None)` is a root without one.
    let mut root_namespace: Option<Option<Vec<u8>>> = None;
    // One slot per open element, holding the index of its entry when it is a `loc`.
    let mut open: Vec<Option<usize>> = Vec::new();
    let mut entries: Vec<String> = Vec::new();

    loop {
        let (resolved, event) = match reader.read_resolved_event() {
            Ok(pair) => pair,
            Err(e) => {
                return Err(ScanError::ParseError(format!(
                    "{} at byte {}",
                    e,
                    reader.error_position()
                )));
            }
        };
        let namespace = namespace_of(resolved)?;

        match event {
            Event::Start(ref element) | Event::Empty(ref element) => {
                let slot = if open.is_empty() {
                    if root_namespace.is_some() {
                        return Err(ScanError::ParseError(
                            "junk after document element".to_string(),
                        ));
                    }
                    root_namespace = Some(namespace);
                    None
                } else if element.local_name().as_ref() == b"loc"
                    && root_namespace.as_ref() == Some(&namespace)
                {
                    entries.push(String::new());
                    Some(entries.len() - 1)
                } else {
                    None
                };

                if matches!(event, Event::Start(_)) {
                    open.push(slot);
                }
            }
            Event::End(_) => {
                open.pop();
            }
            Event::Text(text) => {
                if open.is_empty() {
                    return Err(ScanError::ParseError(
                        "text outside the document element".to_string(),
                    ));
                }
                if let Some(Some(index)) = open.last() {
                    let text = text
                        .unescape()
                        .map_err(|e| ScanError::ParseError(e.to_string()))?;
                    entries[*index].push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(Some(index)) = open.last() {
                    entries[*index].push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if root_namespace.is_none() {
        return Err(ScanError::ParseError("no element found".to_string()));
    }
    if !open.is_empty() {
        return Err(ScanError::ParseError(format!(
            "{} unclosed element(s) at end of document",
            open.len()
        )));
    }

    Ok(entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .collect())
}

fn namespace_of(resolved: ResolveResult<'_>) -> Result<Option<Vec<u8>>> {
    match resolved {
        ResolveResult::Bound(namespace) => Ok(Some(namespace.into_inner().to_vec())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(ScanError::ParseError(format!(
            "unbound prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

/// Collects the anchors of an HTML page that stay on the page's own
/// network location, resolved against `origin`.
pub fn extract_html_links(raw: &str, origin: &Url) -> Result<LinkSet> {
    let document = Html::parse_document(raw);
    let anchors =
        Selector::parse("a[href]").map_err(|e| ScanError::ParseError(e.to_string()))?;
    let origin_netloc = network_location(origin);

    let mut links = LinkSet::new();
    for element in document.select(&anchors) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = origin.join(href) else {
            debug!("Unresolvable href {:?} on {}", href, origin);
            continue;
        };

        if network_location(&resolved) == origin_netloc {
            links.push(resolved.to_string());
        } else {
            debug!("Skipping third-party link {}", resolved);
        }
    }

    Ok(links)
}
