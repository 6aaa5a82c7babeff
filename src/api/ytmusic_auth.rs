use super::ytmusic::BrowserHeaders;
use crate::config::Config;
use crate::db;
use anyhow::{anyhow, Result};
use std::io::BufRead;
use tracing::info;

/// Store YouTube Music browser headers in the DB.
/// The user pastes the request headers of any authenticated POST to
/// music.youtube.com (raw lines or a JSON object), ended by an empty line.
pub async fn run_ytmusic_auth(cfg: &Config) -> Result<()> {
    println!("Open https://music.youtube.com logged in, open the network tab and copy the request headers of a POST to /youtubei/v1/browse.");
    println!("Paste them below and finish with an empty line:");
    let mut input = String::new();
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            if input.is_empty() {
                continue;
            }
            break;
        }
        input.push_str(&line);
        input.push('\n');
    }
    if input.trim().is_empty() {
        return Err(anyhow!("no input provided"));
    }
    let headers = BrowserHeaders::parse(&input)?;
    save_headers(cfg, &headers).await?;

    info!("YouTube Music headers saved to DB provider 'ytmusic'");
    println!("Saved YouTube Music headers to DB.");
    Ok(())
}

pub async fn save_headers(cfg: &Config, headers: &BrowserHeaders) -> Result<()> {
    let db_path = cfg.db_path.clone();
    let json = headers.to_json()?;
    tokio::task::spawn_blocking(move || -> Result<(), anyhow::Error> {
        let conn = db::open_or_create(&db_path)?;
        db::save_credential_raw(&conn, "ytmusic", &json, None, None)?;
        Ok(())
    })
    .await??;
    Ok(())
}
