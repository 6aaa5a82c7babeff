use super::SourceCatalog;
use crate::db;
use crate::models::{Page, PlaylistRef, Track};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: i64, // epoch seconds
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Spotify source catalog backed by the Spotify Web API.
/// Token management reads token JSON from DB and persists refreshed tokens.
/// Endpoints may be overridden by SPOTIFY_AUTH_BASE and SPOTIFY_API_BASE env vars,
/// or per instance with `with_api_base` / `with_auth_base`.
pub struct SpotifySource {
    client: Client,
    client_id: String,
    client_secret: String,
    db_path: std::path::PathBuf,
    api_base: Option<String>,
    auth_base: Option<String>,
    token: tokio::sync::Mutex<Option<StoredToken>>,
}

/// Build a Track from a Spotify track object. The first listed artist is used.
pub fn track_from_json(t: &serde_json::Value) -> Option<Track> {
    let title = t["name"].as_str()?;
    let artist = t["artists"]
        .as_array()
        .and_then(|a| a.first())
        .and_then(|a| a["name"].as_str())
        .unwrap_or("");
    let album = t["album"]["name"].as_str().unwrap_or("");
    Some(Track::new(title, artist, album))
}

impl SpotifySource {
    pub fn new(client_id: String, client_secret: String, db_path: std::path::PathBuf) -> Self {
        // If client_id is empty, try to load client credentials from DB
        let (client_id, client_secret) = if client_id.is_empty() {
            match rusqlite::Connection::open(&db_path)
                .ok()
                .and_then(|conn| db::load_credential_with_client(&conn, "spotify").ok().flatten())
            {
                Some((_token_json, db_client_id, db_client_secret)) => (
                    db_client_id.unwrap_or(client_id),
                    db_client_secret.unwrap_or(client_secret),
                ),
                None => (client_id, client_secret),
            }
        } else {
            (client_id, client_secret)
        };
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            db_path,
            api_base: None,
            auth_base: None,
            token: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    pub fn with_auth_base(mut self, base: impl Into<String>) -> Self {
        self.auth_base = Some(base.into());
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        match Client::builder().timeout(timeout).build() {
            Ok(c) => self.client = c,
            Err(e) => warn!("keeping default http client: {}", e),
        }
        self
    }

    fn is_authenticated(&self) -> bool {
        !self.client_id.is_empty()
    }
    fn name(&self) -> &str {
        "spotify"
    }

    fn auth_base(&self) -> String {
        self.auth_base.clone().unwrap_or_else(|| {
            env::var("SPOTIFY_AUTH_BASE").unwrap_or_else(|_| "https://accounts.spotify.com".into())
        })
    }
    fn api_base(&self) -> String {
        // include v1 path by default
        self.api_base.clone().unwrap_or_else(|| {
            env::var("SPOTIFY_API_BASE").unwrap_or_else(|_| "https://api.spotify.com/v1".into())
        })
    }

    async fn load_token_from_db(&self) -> Result<Option<StoredToken>> {
        match db::load_credential_async(&self.db_path, "spotify").await? {
            Some((s, _, _)) => {
                let st: StoredToken =
                    serde_json::from_str(&s).map_err(|e| anyhow!("parse token json: {}", e))?;
                Ok(Some(st))
            }
            None => Ok(None),
        }
    }

    async fn persist_token_to_db(&self, st: &StoredToken) -> Result<()> {
        let db_path = self.db_path.clone();
        let s = serde_json::to_string(&st)?;
        tokio::task::spawn_blocking(move || -> Result<(), anyhow::Error> {
            let conn = db::open_or_create(&db_path)?;
            db::update_token_json(&conn, "spotify", &s)?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    /// Load the token if needed and refresh it when it expires within 30s
    /// (or unconditionally when `force` is set).
    async fn ensure_token(&self, force: bool) -> Result<()> {
        let mut lock = self.token.lock().await;
        if lock.is_none() {
            if let Some(st) = self.load_token_from_db().await? {
                *lock = Some(st);
            }
        }
        if let Some(st) = &*lock {
            let now = Utc::now().timestamp();
            if force || now + 30 >= st.expires_at {
                debug!("Spotify token is near expiry or rejected, refreshing");
                let mut cur = st.clone();
                self.refresh_token_internal(&mut cur).await?;
                *lock = Some(cur);
            }
        }
        Ok(())
    }

    async fn refresh_token_internal(&self, cur: &mut StoredToken) -> Result<()> {
        let refresh_token = cur
            .refresh_token
            .clone()
            .ok_or_else(|| anyhow!("no refresh token"))?;
        let url = format!("{}/api/token", self.auth_base());
        let req = if self.client_secret.is_empty() {
            // PKCE clients refresh with their client_id and no secret
            let params = [
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
            ];
            self.client.post(&url).form(&params)
        } else {
            let params = [
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ];
            let auth_header = format!(
                "Basic {}",
                general_purpose::STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
            );
            self.client.post(&url).header(AUTHORIZATION, auth_header).form(&params)
        };
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to refresh token: {} - {}", status, body));
        }
        let j: serde_json::Value = resp.json().await?;
        let access_token = j["access_token"]
            .as_str()
            .ok_or_else(|| anyhow!("no access_token"))?
            .to_string();
        let expires_in = j["expires_in"].as_i64().unwrap_or(3600);
        cur.access_token = access_token;
        cur.token_type = "Bearer".into();
        cur.expires_at = Utc::now().timestamp() + expires_in;
        if let Some(s) = j["scope"].as_str() {
            cur.scope = Some(s.to_string());
        }
        // Spotify may rotate the refresh token
        if let Some(rt) = j["refresh_token"].as_str() {
            cur.refresh_token = Some(rt.to_string());
        }
        self.persist_token_to_db(cur).await?;
        Ok(())
    }

    pub async fn get_bearer(&self) -> Result<String> {
        self.ensure_token(false).await?;
        let lock = self.token.lock().await;
        let st = lock
            .as_ref()
            .ok_or_else(|| anyhow!("no spotify token stored; run `auth spotify` first"))?;
        Ok(format!("Bearer {}", st.access_token))
    }

    /// GET a JSON document. A 401 triggers one forced refresh; a 429 is
    /// waited out (retry-after + 1s) up to 3 times.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let mut refreshed = false;
        let mut rate_limited = 0u32;
        loop {
            let bearer = self.get_bearer().await?;
            let resp = self
                .client
                .get(url)
                .header(AUTHORIZATION, &bearer)
                .header(ACCEPT, "application/json")
                .send()
                .await?;
            let status = resp.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                warn!("Got 401 from {}; attempting token refresh", url);
                self.ensure_token(true).await?;
                refreshed = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS && rate_limited < 3 {
                rate_limited += 1;
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(2);
                warn!("Spotify rate limited; sleeping {}s", retry_after + 1);
                tokio::time::sleep(Duration::from_secs(retry_after + 1)).await;
                continue;
            }

            if !status.is_success() {
                let txt = resp.text().await.unwrap_or_default();
                return Err(anyhow!("GET {} failed: {} => {}", url, status, txt));
            }
            return Ok(resp.json().await?);
        }
    }
}

#[async_trait]
impl SourceCatalog for SpotifySource {
    fn name(&self) -> &str {
        SpotifySource::name(self)
    }
    fn is_authenticated(&self) -> bool {
        SpotifySource::is_authenticated(self)
    }

    async fn list_saved_tracks(&self, limit: usize, offset: usize) -> Result<Page<Track>> {
        let url = format!("{}/me/tracks?limit={}&offset={}", self.api_base(), limit, offset);
        let j = self.get_json(&url).await?;
        let raw = j["items"].as_array().map(Vec::as_slice).unwrap_or_default();
        // local files and removed tracks come back with a null track
        let items: Vec<Track> = raw.iter().filter_map(|it| track_from_json(&it["track"])).collect();
        if items.len() < raw.len() {
            debug!("skipped {} unusable saved items at offset {}", raw.len() - items.len(), offset);
        }
        Ok(Page::filtered(items, j["next"].is_string(), raw.len()))
    }

    async fn list_playlists(&self, limit: usize, offset: usize) -> Result<Page<PlaylistRef>> {
        let url = format!("{}/me/playlists?limit={}&offset={}", self.api_base(), limit, offset);
        let j = self.get_json(&url).await?;
        let raw = j["items"].as_array().map(Vec::as_slice).unwrap_or_default();
        let mut playlists = Vec::new();
        for pl in raw {
            let id = pl["id"].as_str().unwrap_or("");
            if id.is_empty() {
                continue;
            }
            let name = pl["name"].as_str().unwrap_or("").to_string();
            playlists.push(PlaylistRef { id: id.to_string(), name });
        }
        Ok(Page::filtered(playlists, j["next"].is_string(), raw.len()))
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut next: Option<String> = Some(format!(
            "{}/playlists/{}/tracks?fields={}&limit=100",
            self.api_base(),
            urlencoding::encode(playlist_id),
            urlencoding::encode("items(track(name,artists(name),album(name))),next")
        ));
        while let Some(url) = next {
            let j = self.get_json(&url).await?;
            if let Some(items) = j["items"].as_array() {
                // local files and removed tracks come back with a null track
                tracks.extend(items.iter().filter_map(|it| track_from_json(&it["track"])));
            }
            next = j["next"].as_str().map(|s| s.to_string());
        }
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn track_uses_first_artist() {
        let t = track_from_json(&json!({
            "name": "Song",
            "artists": [{"name": "Main"}, {"name": "Feat"}],
            "album": {"name": "Record"}
        }))
        .unwrap();
        assert_eq!(t, Track::new("Song", "Main", "Record"));
    }

    #[test]
    fn null_track_is_skipped() {
        assert!(track_from_json(&serde_json::Value::Null).is_none());
    }
}
