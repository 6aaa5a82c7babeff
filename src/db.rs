use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS credentials (
    provider TEXT PRIMARY KEY,
    token_json TEXT NOT NULL,
    client_id TEXT,
    client_secret TEXT,
    last_refreshed INTEGER
);
";

pub fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    run_migrations(&conn)?;
    Ok(conn)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Save raw credential JSON for a provider ("spotify" or "ytmusic"),
/// with optional client_id/client_secret
pub fn save_credential_raw(
    conn: &Connection,
    provider: &str,
    json_blob: &str,
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO credentials (provider, token_json, client_id, client_secret, last_refreshed) VALUES (?1, ?2, ?3, ?4, strftime('%s','now')) ON CONFLICT(provider) DO UPDATE SET token_json = excluded.token_json, client_id = excluded.client_id, client_secret = excluded.client_secret, last_refreshed = strftime('%s','now')",
        params![provider, json_blob, client_id, client_secret],
    )?;
    Ok(())
}

/// Replace only the token JSON, keeping the stored client_id/client_secret.
pub fn update_token_json(conn: &Connection, provider: &str, json_blob: &str) -> Result<()> {
    conn.execute(
        "UPDATE credentials SET token_json = ?2, last_refreshed = strftime('%s','now') WHERE provider = ?1",
        params![provider, json_blob],
    )?;
    Ok(())
}

/// Load raw credential JSON and client_id/client_secret for a provider
pub fn load_credential_with_client(conn: &Connection, provider: &str) -> Result<Option<(String, Option<String>, Option<String>)>> {
    let mut stmt = conn.prepare("SELECT token_json, client_id, client_secret FROM credentials WHERE provider = ?1 LIMIT 1")?;
    let row = stmt
        .query_row(params![provider], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?, r.get::<_, Option<String>>(2)?))
        })
        .optional()?;
    Ok(row)
}

/// Load credentials on the blocking pool. A missing database file yields None.
pub async fn load_credential_async(db_path: &Path, provider: &str) -> Result<Option<(String, Option<String>, Option<String>)>> {
    let db_path = db_path.to_path_buf();
    let provider = provider.to_string();
    tokio::task::spawn_blocking(move || -> Result<_, anyhow::Error> {
        if !db_path.exists() {
            return Ok(None);
        }
        let conn = open_or_create(&db_path)?;
        load_credential_with_client(&conn, &provider)
    })
    .await?
}
