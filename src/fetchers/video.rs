//! YouTube channel fetcher.
//!
//! Two collaborators, kept behind traits so the scan logic can be exercised
//! without the network:
//!
//! - [`ChannelLister`] enumerates a channel's video ids, newest first
//! - [`VideoInfoSource`] looks up one video's publish date, title and length
//!
//! The YouTube implementations resolve the channel id from the source URL
//! (fetching the channel page when the URL is a handle or custom URL), list
//! videos through the channel's Atom feed and read metadata from each watch
//! page. The channel feed only carries the most recent uploads, so a run
//! after a long gap can only see that many videos per channel.

use super::feed::parse_feed_items;
use super::{FetchError, HttpClient, Scan, ScanPolicy, SourceFetcher, Step};
use crate::models::{DateWindow, Episode, Source};
use crate::normalize::{iso8601_duration_secs, normalize_duration, normalize_title, parse_pub_date};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

const WATCH_URL: &str = "https://www.youtube.com/watch";
const CHANNEL_FEED_URL: &str = "https://www.youtube.com/feeds/videos.xml";

static CHANNEL_ID_IN_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:channel_id=|/channel/)(UC[\w-]{22})").unwrap());
static CHANNEL_ID_IN_PAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(?:externalId|channelId)":"(UC[\w-]{22})""#).unwrap());
static LENGTH_SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""lengthSeconds":"(\d+)""#).unwrap());
static PUBLISH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(?:publishDate|uploadDate)":"([^"]+)""#).unwrap());

static CANONICAL: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"link[rel="canonical"]"#).unwrap());
static META_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="title"], meta[property="og:title"]"#).unwrap());
static META_PUBLISHED: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[itemprop="datePublished"], meta[itemprop="uploadDate"]"#).unwrap()
});
static META_DURATION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[itemprop="duration"]"#).unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

/// Metadata for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub title: String,
    pub published: NaiveDate,
    pub length_secs: u64,
}

/// Enumerates a channel's videos, newest first.
pub trait ChannelLister {
    async fn list_videos(&self, channel_url: &str) -> Result<Vec<String>, FetchError>;
}

/// Looks up the metadata of a single video.
pub trait VideoInfoSource {
    async fn video_info(&self, video_id: &str) -> Result<VideoInfo, FetchError>;
}

/// Fetcher for channels: list, then look up each video until the scan stops.
#[derive(Debug)]
pub struct VideoFetcher<L, I> {
    lister: L,
    info: I,
}

impl<L, I> VideoFetcher<L, I>
where
    L: ChannelLister,
    I: VideoInfoSource,
{
    pub fn new(lister: L, info: I) -> Self {
        Self { lister, info }
    }
}

impl<L, I> SourceFetcher for VideoFetcher<L, I>
where
    L: ChannelLister,
    I: VideoInfoSource,
{
    #[instrument(level = "info", skip_all, fields(source = %source.name, url = %source.url))]
    async fn fetch(
        &self,
        source: &Source,
        window: DateWindow,
        policy: ScanPolicy,
    ) -> Result<Vec<Episode>, FetchError> {
        let ids = self.lister.list_videos(&source.url).await?;
        debug!(count = ids.len(), "Listed channel videos");

        let mut scan = Scan::new(&source.name, window, policy);
        let mut episodes = Vec::new();
        for id in &ids {
            let info = self.info.video_info(id).await?;
            match scan.step(info.published) {
                Step::Keep => {}
                Step::Skip => continue,
                Step::Stop => break,
            }
            episodes.push(Episode {
                source: source.name.clone(),
                title: normalize_title(&info.title),
                published: info.published,
                duration: normalize_duration(&info.length_secs.to_string())?,
            });
        }

        if scan.out_of_order() > 0 {
            warn!(out_of_order = scan.out_of_order(), "Channel listing is not sorted newest-first");
        }
        info!(count = episodes.len(), "Collected channel videos");
        Ok(episodes)
    }
}

/// Channel id (`UC...`) embedded in a channel or feed URL, if any.
pub fn channel_id_from_url(url: &str) -> Option<String> {
    CHANNEL_ID_IN_URL
        .captures(url)
        .map(|c| c[1].to_string())
}

/// Channel id from a channel page's canonical link or embedded data.
pub fn channel_id_from_page(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&CANONICAL)
        .filter_map(|el| el.value().attr("href"))
        .find_map(channel_id_from_url)
        .or_else(|| CHANNEL_ID_IN_PAGE.captures(html).map(|c| c[1].to_string()))
}

fn feed_url(channel_id: &str) -> Result<Url, FetchError> {
    Url::parse_with_params(CHANNEL_FEED_URL, &[("channel_id", channel_id)])
        .map_err(|e| FetchError::parse("feed url", e))
}

fn watch_url(video_id: &str) -> Result<Url, FetchError> {
    Url::parse_with_params(WATCH_URL, &[("v", video_id)]).map_err(|e| FetchError::parse("watch url", e))
}

/// Lists videos through `feeds/videos.xml?channel_id=...`.
#[derive(Debug, Clone)]
pub struct YoutubeChannelLister {
    http: HttpClient,
}

impl YoutubeChannelLister {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    async fn resolve_channel_id(&self, channel_url: &str) -> Result<String, FetchError> {
        if let Some(id) = channel_id_from_url(channel_url) {
            return Ok(id);
        }
        let url = Url::parse(channel_url).map_err(|e| FetchError::parse("channel url", e))?;
        let html = self.http.get_text(url.as_str()).await?;
        channel_id_from_page(&html)
            .ok_or_else(|| FetchError::parse("channel page", format!("no channel id at {channel_url}")))
    }
}

impl ChannelLister for YoutubeChannelLister {
    #[instrument(level = "debug", skip(self))]
    async fn list_videos(&self, channel_url: &str) -> Result<Vec<String>, FetchError> {
        let channel_id = self.resolve_channel_id(channel_url).await?;
        let xml = self.http.get_text(feed_url(&channel_id)?.as_str()).await?;

        Ok(parse_feed_items(&xml)?
            .iter()
            .filter_map(|entry| entry.get("videoId"))
            .map(str::to_string)
            .collect())
    }
}

/// Reads video metadata from the public watch page.
#[derive(Debug, Clone)]
pub struct YoutubeVideoInfo {
    http: HttpClient,
}

impl YoutubeVideoInfo {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl VideoInfoSource for YoutubeVideoInfo {
    #[instrument(level = "debug", skip(self))]
    async fn video_info(&self, video_id: &str) -> Result<VideoInfo, FetchError> {
        let html = self.http.get_text(watch_url(video_id)?.as_str()).await?;
        parse_watch_page(&html)
    }
}

fn meta_content<'a>(document: &'a Html, selector: &Selector) -> Option<&'a str> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
}

/// Extract title, publish date and length from a watch page.
pub fn parse_watch_page(html: &str) -> Result<VideoInfo, FetchError> {
    let document = Html::parse_document(html);

    let title = meta_content(&document, &META_TITLE)
        .map(str::to_string)
        .or_else(|| {
            document.select(&TITLE).next().map(|el| {
                let text = el.text().collect::<String>();
                text.trim().trim_end_matches("- YouTube").trim().to_string()
            })
        })
        .ok_or_else(|| FetchError::parse("watch page", "missing title"))?;

    let raw_date = meta_content(&document, &META_PUBLISHED)
        .map(str::to_string)
        .or_else(|| PUBLISH_DATE.captures(html).map(|c| c[1].to_string()))
        .ok_or_else(|| FetchError::parse("watch page", "missing publish date"))?;
    let published = parse_pub_date(&raw_date)?;

    let length_secs = match meta_content(&document, &META_DURATION) {
        Some(raw) => iso8601_duration_secs(raw)?,
        None => LENGTH_SECONDS
            .captures(html)
            .and_then(|c| c[1].parse::<u64>().ok())
            .ok_or_else(|| FetchError::parse("watch page", "missing video length"))?,
    };

    Ok(VideoInfo {
        title,
        published,
        length_secs,
    })
}
