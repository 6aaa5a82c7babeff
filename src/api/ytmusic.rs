use super::TargetCatalog;
use crate::db;
use crate::models::{Rating, SearchKind, SearchResult};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE, ORIGIN, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

pub const ORIGIN_URL: &str = "https://music.youtube.com";
/// Search `params` restricting results to songs.
const SONGS_FILTER: &str = "EgWKAQIIAWoMEA4QChADEAQQCRAF";
/// Browse id of the "Liked music" playlist.
const LIKED_BROWSE_ID: &str = "VLLM";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
/// Headers copied from the browser that are forwarded on every request.
const FORWARDED: [&str; 5] = [
    "cookie",
    "x-goog-authuser",
    "x-goog-visitor-id",
    "user-agent",
    "accept-language",
];

/// Request headers of a logged-in music.youtube.com browser session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserHeaders(BTreeMap<String, String>);

impl BrowserHeaders {
    /// Accepts either a JSON object of headers or raw `name: value` lines as
    /// copied from the browser's network tab. Only forwarded headers are kept.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let mut map = BTreeMap::new();
        if input.starts_with('{') {
            let obj: BTreeMap<String, Value> =
                serde_json::from_str(input).context("parsing headers JSON")?;
            for (k, v) in obj {
                if let Some(s) = v.as_str() {
                    map.insert(k.to_ascii_lowercase(), s.to_string());
                }
            }
        } else {
            for line in input.lines() {
                let line = line.trim();
                // HTTP/2 pseudo headers start with ':'; request lines have no "name: value" shape
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                if let Some((name, value)) = line.split_once(':') {
                    let name = name.trim();
                    if name.is_empty() || name.contains(' ') {
                        continue;
                    }
                    map.insert(name.to_ascii_lowercase(), value.trim().to_string());
                }
            }
        }
        map.retain(|k, _| FORWARDED.contains(&k.as_str()));
        let headers = Self(map);
        if headers.get("cookie").is_none() {
            return Err(anyhow!("headers contain no cookie"));
        }
        if headers.sapisid().is_none() {
            return Err(anyhow!("cookie has no SAPISID; copy headers from a logged-in session"));
        }
        Ok(headers)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    /// SAPISID cookie value (falls back to __Secure-3PAPISID).
    pub fn sapisid(&self) -> Option<String> {
        let cookie = self.get("cookie")?;
        let mut fallback = None;
        for part in cookie.split(';') {
            let Some((k, v)) = part.trim().split_once('=') else { continue };
            match k {
                "SAPISID" => return Some(v.to_string()),
                "__Secure-3PAPISID" => fallback = Some(v.to_string()),
                _ => {}
            }
        }
        fallback
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

/// `SAPISIDHASH {ts}_{sha1("{ts} {sapisid} {origin}")}`
pub fn sapisid_hash(sapisid: &str, origin: &str, timestamp: i64) -> String {
    let digest = sha1_smol::Sha1::from(format!("{} {} {}", timestamp, sapisid, origin)).digest();
    format!("SAPISIDHASH {}_{}", timestamp, digest)
}

/// Extract song results from a search response, in response order.
pub fn parse_search_results(j: &Value) -> Vec<SearchResult> {
    let sections = j
        .pointer("/contents/tabbedSearchResultsRenderer/tabs/0/tabRenderer/content/sectionListRenderer/contents")
        .or_else(|| j.pointer("/contents/sectionListRenderer/contents"))
        .and_then(|v| v.as_array());
    let Some(sections) = sections else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for section in sections {
        let Some(items) = section.pointer("/musicShelfRenderer/contents").and_then(|v| v.as_array()) else {
            continue;
        };
        for item in items {
            let r = &item["musicResponsiveListItemRenderer"];
            if r.is_null() {
                continue;
            }
            let id = r
                .pointer("/playlistItemData/videoId")
                .or_else(|| {
                    r.pointer("/overlay/musicItemThumbnailOverlayRenderer/content/musicPlayButtonRenderer/playNavigationEndpoint/watchEndpoint/videoId")
                })
                .and_then(|v| v.as_str())
                .map(String::from);
            let title = r
                .pointer("/flexColumns/0/musicResponsiveListItemFlexColumnRenderer/text/runs/0/text")
                .and_then(|v| v.as_str())
                .map(String::from);
            out.push(SearchResult { id, title });
        }
    }
    out
}

/// Parse "1,234 songs" style header text. Text without digits ("No songs") is zero.
pub fn parse_track_count(text: &str) -> u64 {
    let digits: String = text
        .split_whitespace()
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Track count of a playlist browse response, across the header layouts in use.
pub fn liked_count_from_browse(j: &Value) -> Option<u64> {
    const PATHS: [&str; 4] = [
        "/contents/twoColumnBrowseResultsRenderer/tabs/0/tabRenderer/content/sectionListRenderer/contents/0/musicResponsiveHeaderRenderer/secondSubtitle/runs/0/text",
        "/contents/twoColumnBrowseResultsRenderer/tabs/0/tabRenderer/content/sectionListRenderer/contents/0/musicEditablePlaylistDetailHeaderRenderer/header/musicResponsiveHeaderRenderer/secondSubtitle/runs/0/text",
        "/header/musicDetailHeaderRenderer/secondSubtitle/runs/0/text",
        "/header/musicEditablePlaylistDetailHeaderRenderer/header/musicDetailHeaderRenderer/secondSubtitle/runs/0/text",
    ];
    PATHS
        .iter()
        .find_map(|p| j.pointer(p).and_then(|v| v.as_str()))
        .map(parse_track_count)
}

/// YouTube Music target catalog, authenticated with browser headers.
/// The API base may be overridden by the YTMUSIC_API_BASE env var or `with_api_base`.
pub struct YtMusicTarget {
    client: Client,
    headers: BrowserHeaders,
    api_base: Option<String>,
}

impl YtMusicTarget {
    pub fn new(headers: BrowserHeaders) -> Self {
        Self {
            client: Client::new(),
            headers,
            api_base: None,
        }
    }

    /// Build from the headers stored by `auth ytmusic`.
    pub async fn load(db_path: &std::path::Path) -> Result<Self> {
        let (json, _, _) = db::load_credential_async(db_path, "ytmusic")
            .await?
            .ok_or_else(|| anyhow!("no YouTube Music headers stored; run `auth ytmusic` first"))?;
        Ok(Self::new(BrowserHeaders::parse(&json)?))
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        match Client::builder().timeout(timeout).build() {
            Ok(c) => self.client = c,
            Err(e) => warn!("keeping default http client: {}", e),
        }
        self
    }

    fn api_base(&self) -> String {
        self.api_base.clone().unwrap_or_else(|| {
            env::var("YTMUSIC_API_BASE").unwrap_or_else(|_| format!("{}/youtubei/v1", ORIGIN_URL))
        })
    }

    fn context() -> Value {
        json!({
            "client": {
                "clientName": "WEB_REMIX",
                "clientVersion": format!("1.{}.01.00", Utc::now().format("%Y%m%d")),
                "hl": "en"
            },
            "user": {}
        })
    }

    async fn post(&self, endpoint: &str, mut body: Value) -> Result<Value> {
        body["context"] = Self::context();
        let url = format!("{}/{}?alt=json&prettyPrint=false", self.api_base(), endpoint);
        let sapisid = self
            .headers
            .sapisid()
            .ok_or_else(|| anyhow!("no SAPISID cookie"))?;
        let auth = sapisid_hash(&sapisid, ORIGIN_URL, Utc::now().timestamp());
        let mut req = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "*/*")
            .header(ORIGIN, ORIGIN_URL)
            .header("x-origin", ORIGIN_URL)
            .header(AUTHORIZATION, auth)
            .header(USER_AGENT, self.headers.get("user-agent").unwrap_or(DEFAULT_USER_AGENT))
            .header("x-goog-authuser", self.headers.get("x-goog-authuser").unwrap_or("0"));
        if let Some(c) = self.headers.get("cookie") {
            req = req.header(COOKIE, c);
        }
        for name in ["x-goog-visitor-id", "accept-language"] {
            if let Some(v) = self.headers.get(name) {
                req = req.header(name, v);
            }
        }
        let resp = req.json(&body).send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(anyhow!("rate_limited: retry_after={:?}", retry_after));
        }
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(anyhow!("{} failed: {} => {}", endpoint, status, txt));
        }
        let j: Value = resp.json().await.with_context(|| format!("{} returned malformed JSON", endpoint))?;
        if let Some(msg) = j.pointer("/error/message").and_then(|v| v.as_str()) {
            return Err(anyhow!("{} failed: {}", endpoint, msg));
        }
        Ok(j)
    }
}

#[async_trait]
impl TargetCatalog for YtMusicTarget {
    fn name(&self) -> &str {
        "ytmusic"
    }
    fn is_authenticated(&self) -> bool {
        self.headers.sapisid().is_some()
    }

    async fn search(&self, query: &str, kind: SearchKind) -> Result<Vec<SearchResult>> {
        let params = match kind {
            SearchKind::Songs => SONGS_FILTER,
        };
        let j = self
            .post("search", json!({ "query": query, "params": params }))
            .await?;
        let results = parse_search_results(&j);
        debug!("search {:?}: {} results", query, results.len());
        Ok(results)
    }

    async fn create_playlist(&self, title: &str, description: &str, ids: &[String]) -> Result<String> {
        let mut body = json!({
            "title": title,
            "description": description,
            "privacyStatus": "PRIVATE",
        });
        if !ids.is_empty() {
            body["videoIds"] = json!(ids);
        }
        let j = self.post("playlist/create", body).await?;
        j["playlistId"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow!("create playlist returned no playlistId"))
    }

    async fn rate(&self, id: &str, rating: Rating) -> Result<()> {
        let endpoint = match rating {
            Rating::Like => "like/like",
        };
        self.post(endpoint, json!({ "target": { "videoId": id } })).await?;
        Ok(())
    }

    /// Only the first page of the liked playlist is fetched; `limit` never
    /// changes the reported total, which comes from the playlist header.
    async fn liked_count(&self, limit: usize) -> Result<u64> {
        let j = self.post("browse", json!({ "browseId": LIKED_BROWSE_ID })).await?;
        let count = liked_count_from_browse(&j)
            .ok_or_else(|| anyhow!("liked songs response has no track count"))?;
        debug!("liked count {} (limit {})", count, limit);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOKIE_LINE: &str = "cookie: VISITOR_INFO1_LIVE=x; SAPISID=abc/def; __Secure-3PAPISID=zzz";

    #[test]
    fn parses_raw_header_lines() {
        let raw = format!(
            "POST /youtubei/v1/browse?prettyPrint=false HTTP/2\n:authority: music.youtube.com\nUser-Agent: UA/1.0\n{}\nX-Goog-AuthUser: 1\nContent-Length: 12\n",
            COOKIE_LINE
        );
        let h = BrowserHeaders::parse(&raw).unwrap();
        assert_eq!(h.get("user-agent"), Some("UA/1.0"));
        assert_eq!(h.get("x-goog-authuser"), Some("1"));
        assert_eq!(h.get("content-length"), None);
        assert_eq!(h.sapisid().as_deref(), Some("abc/def"));
    }

    #[test]
    fn parses_json_headers_and_round_trips() {
        let h = BrowserHeaders::parse(r#"{"Cookie": "__Secure-3PAPISID=zzz", "Accept": "*/*"}"#).unwrap();
        assert_eq!(h.sapisid().as_deref(), Some("zzz"));
        assert_eq!(BrowserHeaders::parse(&h.to_json().unwrap()).unwrap(), h);
    }

    #[test]
    fn rejects_headers_without_sapisid() {
        assert!(BrowserHeaders::parse("cookie: PREF=1").is_err());
        assert!(BrowserHeaders::parse("user-agent: x").is_err());
    }

    #[test]
    fn sapisid_hash_format() {
        let h = sapisid_hash("abc", ORIGIN_URL, 1700000000);
        let expected = sha1_smol::Sha1::from("1700000000 abc https://music.youtube.com").digest();
        assert_eq!(h, format!("SAPISIDHASH 1700000000_{}", expected));
        assert_eq!(h.len(), "SAPISIDHASH 1700000000_".len() + 40);
    }

    #[test]
    fn search_results_keep_order_and_missing_ids() {
        let j = json!({"contents": {"tabbedSearchResultsRenderer": {"tabs": [{"tabRenderer": {"content": {"sectionListRenderer": {"contents": [
            {"itemSectionRenderer": {}},
            {"musicShelfRenderer": {"contents": [
                {"musicResponsiveListItemRenderer": {"flexColumns": [{"musicResponsiveListItemFlexColumnRenderer": {"text": {"runs": [{"text": "Unavailable"}]}}}]}},
                {"musicResponsiveListItemRenderer": {"playlistItemData": {"videoId": "vid1"}}},
                {"musicResponsiveListItemRenderer": {"overlay": {"musicItemThumbnailOverlayRenderer": {"content": {"musicPlayButtonRenderer": {"playNavigationEndpoint": {"watchEndpoint": {"videoId": "vid2"}}}}}}}}
            ]}}
        ]}}}}]}}});
        let r = parse_search_results(&j);
        assert_eq!(r.len(), 3);
        assert_eq!(r[0].id, None);
        assert_eq!(r[0].title.as_deref(), Some("Unavailable"));
        assert_eq!(r[1].id.as_deref(), Some("vid1"));
        assert_eq!(r[2].id.as_deref(), Some("vid2"));
    }

    #[test]
    fn empty_search_response_has_no_results() {
        assert!(parse_search_results(&json!({})).is_empty());
    }

    #[test]
    fn track_count_text() {
        assert_eq!(parse_track_count("1,234 songs"), 1234);
        assert_eq!(parse_track_count("7 songs"), 7);
        assert_eq!(parse_track_count("No songs"), 0);
    }

    #[test]
    fn track_count_from_either_header_layout() {
        let legacy = json!({"header": {"musicDetailHeaderRenderer": {"secondSubtitle": {"runs": [{"text": "42 songs"}, {"text": " • "}]}}}});
        assert_eq!(liked_count_from_browse(&legacy), Some(42));
        let current = json!({"contents": {"twoColumnBrowseResultsRenderer": {"tabs": [{"tabRenderer": {"content": {"sectionListRenderer": {"contents": [
            {"musicResponsiveHeaderRenderer": {"secondSubtitle": {"runs": [{"text": "3,001 songs"}]}}}
        ]}}}}]}}});
        assert_eq!(liked_count_from_browse(&current), Some(3001));
        assert_eq!(liked_count_from_browse(&json!({})), None);
    }
}
