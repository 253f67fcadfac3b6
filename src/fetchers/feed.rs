//! Podcast RSS / Atom feed fetcher.
//!
//! The feed is downloaded in one request and walked element by element with
//! `quick-xml`. Namespace prefixes are dropped from tag names, so
//! `itunes:duration` is looked up as `duration` and `yt:videoId` as
//! `videoId`.
//!
//! Per item:
//! - `pubDate` (RSS) or `published`/`updated` (Atom) gives the publish date
//! - `title` gives the title, cut at the first `|`
//! - `duration` is zero-padded to `H:M:S`; items without one get `0:0:0`

use super::{FetchError, HttpClient, Scan, ScanPolicy, SourceFetcher, Step};
use crate::models::{DateWindow, Episode, Source};
use crate::normalize::{normalize_duration, normalize_title, parse_pub_date};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

const ITEM_TAGS: [&str; 2] = ["item", "entry"];
const DATE_TAGS: [&str; 3] = ["pubDate", "published", "updated"];

/// One `item`/`entry` element: local tag name to trimmed text.
///
/// When a tag appears more than once inside an item, the first wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedItem {
    fields: HashMap<String, String>,
}

impl FeedItem {
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.fields.get(tag).map(String::as_str)
    }

    fn first_of(&self, tags: &[&str]) -> Option<&str> {
        tags.iter().find_map(|t| self.get(t))
    }
}

/// Drop the namespace prefix from a raw tag name.
pub fn strip_prefix(raw: &[u8]) -> String {
    let local = match raw.iter().position(|&b| b == b':') {
        Some(i) => &raw[i + 1..],
        None => raw,
    };
    String::from_utf8_lossy(local).into_owned()
}

/// Parse every `item`/`entry` element of a feed, in document order.
pub fn parse_feed_items(xml: &str) -> Result<Vec<FeedItem>, FetchError> {
    let mut reader = Reader::from_str(xml);
    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    // Open elements inside the current item, with their accumulated text.
    let mut open: Vec<(String, String)> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            FetchError::parse("feed xml", format!("at byte {}: {e}", reader.error_position()))
        })?;

        match event {
            Event::Start(e) => {
                let name = strip_prefix(e.name().as_ref());
                if current.is_none() {
                    if ITEM_TAGS.contains(&name.as_str()) {
                        current = Some(FeedItem::default());
                    }
                } else {
                    open.push((name, String::new()));
                }
            }
            Event::End(e) => {
                let Some(item) = current.as_mut() else {
                    continue;
                };
                match open.pop() {
                    Some((name, text)) => {
                        item.fields
                            .entry(name)
                            .or_insert_with(|| text.trim().to_string());
                    }
                    None => {
                        let name = strip_prefix(e.name().as_ref());
                        if ITEM_TAGS.contains(&name.as_str()) {
                            items.extend(current.take());
                        }
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, text)) = open.last_mut() {
                    text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::CData(t) => {
                if let Some((_, text)) = open.last_mut() {
                    text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::GeneralRef(r) => {
                if let Some((_, text)) = open.last_mut() {
                    let name = r.decode().map_err(|e| FetchError::parse("feed xml", e))?;
                    match r.resolve_char_ref() {
                        Ok(Some(ch)) => text.push(ch),
                        _ => match resolve_predefined_entity(&name) {
                            Some(resolved) => text.push_str(resolved),
                            // Unknown entities (HTML ones like `&nbsp;`) are kept verbatim.
                            None => text.push_str(&format!("&{name};")),
                        },
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

/// Turn a feed document into the episodes that fall inside `window`.
pub fn episodes_from_feed(
    source: &str,
    xml: &str,
    window: DateWindow,
    policy: ScanPolicy,
) -> Result<Vec<Episode>, FetchError> {
    let items = parse_feed_items(xml)?;
    debug!(source, count = items.len(), "Parsed feed items");

    let mut scan = Scan::new(source, window, policy);
    let mut episodes = Vec::new();
    for item in &items {
        let raw_date = item
            .first_of(&DATE_TAGS)
            .ok_or_else(|| FetchError::parse("feed item", "missing pubDate"))?;
        let published = parse_pub_date(raw_date)?;

        match scan.step(published) {
            Step::Keep => {}
            Step::Skip => continue,
            Step::Stop => break,
        }

        let duration = match item.get("duration") {
            Some(raw) if !raw.is_empty() => normalize_duration(raw)?,
            _ => normalize_duration("0")?,
        };
        episodes.push(Episode {
            source: source.to_string(),
            title: normalize_title(item.get("title").unwrap_or_default()),
            published,
            duration,
        });
    }

    if scan.out_of_order() > 0 {
        warn!(source, out_of_order = scan.out_of_order(), "Feed is not sorted newest-first");
    }
    Ok(episodes)
}

/// Fetcher for podcast RSS / Atom feeds.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    http: HttpClient,
}

impl FeedFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl SourceFetcher for FeedFetcher {
    #[instrument(level = "info", skip_all, fields(source = %source.name, url = %source.url))]
    async fn fetch(
        &self,
        source: &Source,
        window: DateWindow,
        policy: ScanPolicy,
    ) -> Result<Vec<Episode>, FetchError> {
        let xml = self.http.get_text(&source.url).await?;
        let episodes = episodes_from_feed(&source.name, &xml, window, policy)?;
        info!(count = episodes.len(), "Collected feed episodes");
        Ok(episodes)
    }
}
