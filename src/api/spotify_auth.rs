use crate::config::Config;
use crate::db;
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use url::Url;

/// Read-only scopes needed to list saved tracks and playlists.
pub const SCOPES: [&str; 2] = ["playlist-read-private", "user-library-read"];
const VERIFIER_LEN: usize = 64;

/// Manual OAuth helper:
/// 1. Build the Spotify authorization URL and print it.
/// 2. User opens it in a browser, approves and gets redirected to the redirect URI (which may fail if it's a dummy).
/// 3. User copies the full redirect URL and pastes it into this CLI.
/// 4. The CLI extracts the `code` param and exchanges it for an access_token + refresh_token.
/// 5. The tokens are stored in the DB credentials table as JSON.
///
/// With an empty client_secret the PKCE variant of the flow is used.
#[derive(Serialize, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

fn prompt(text: &str) -> Result<String> {
    println!("{}", text);
    let mut s = String::new();
    std::io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

/// PKCE code verifier (RFC 7636 allows 43..=128 unreserved characters).
pub fn code_verifier() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFIER_LEN)
        .map(char::from)
        .collect()
}

/// S256 challenge for `verifier`.
pub fn code_challenge(verifier: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub fn authorize_url(client_id: &str, redirect_uri: &str, code_challenge: Option<&str>) -> Result<Url> {
    let mut url = Url::parse("https://accounts.spotify.com/authorize")?;
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("show_dialog", "true");
        if let Some(ch) = code_challenge {
            q.append_pair("code_challenge_method", "S256")
                .append_pair("code_challenge", ch);
        }
    }
    Ok(url)
}

/// Extract the `code` query parameter from the pasted redirect URL.
pub fn code_from_redirect(input: &str) -> Result<String> {
    let parsed = Url::parse(input.trim()).map_err(|e| anyhow!("invalid url pasted: {}", e))?;
    if let Some((_, err)) = parsed.query_pairs().find(|(k, _)| k == "error") {
        return Err(anyhow!("authorization denied: {}", err));
    }
    let code = parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .ok_or_else(|| anyhow!("no code in redirect URL"))?
        .1
        .into_owned();
    Ok(code)
}

pub async fn run_spotify_auth(cfg: &Config) -> Result<()> {
    let client_id = prompt("Enter your Spotify client_id:")?;
    if client_id.is_empty() {
        return Err(anyhow!("no client_id provided"));
    }
    let client_secret = prompt("Enter your Spotify client_secret (leave blank to use PKCE):")?;

    let redirect_uri = prompt("Enter your Spotify redirect URI (leave blank for http://127.0.0.1:8888/):")?;
    let redirect_uri = if redirect_uri.is_empty() {
        "http://127.0.0.1:8888/".to_string()
    } else {
        redirect_uri
    };

    let verifier = if client_secret.is_empty() {
        Some(code_verifier())
    } else {
        None
    };
    let challenge = verifier.as_deref().map(code_challenge);
    let url = authorize_url(&client_id, &redirect_uri, challenge.as_deref())?;

    println!(
        "Open this URL in your browser and authorize the application:\n\n{}\n",
        url
    );
    println!("After authorizing, you'll be redirected to your redirect URI. Copy the full redirect URL and paste it here.");
    let code = code_from_redirect(&prompt("Paste redirect URL:")?)?;

    // Exchange code for tokens
    let client = Client::new();
    let mut params = vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code),
        ("redirect_uri", redirect_uri.clone()),
    ];
    let mut req = client.post("https://accounts.spotify.com/api/token");
    match &verifier {
        Some(v) => {
            params.push(("client_id", client_id.clone()));
            params.push(("code_verifier", v.clone()));
        }
        None => {
            let auth_header = format!(
                "Basic {}",
                general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret))
            );
            req = req.header("Authorization", auth_header);
        }
    }
    let resp = req.form(&params).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let txt = resp.text().await.unwrap_or_default();
        return Err(anyhow!("token exchange failed: {} => {}", status, txt));
    }

    let tr: TokenResponse = resp.json().await?;
    let expires_at = chrono::Utc::now().timestamp() + tr.expires_in;
    let stored_token = crate::api::spotify::StoredToken {
        access_token: tr.access_token,
        token_type: tr.token_type,
        expires_at,
        refresh_token: tr.refresh_token,
        scope: tr.scope,
    };
    let token_json = serde_json::to_string(&stored_token)?;
    let db_path = cfg.db_path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), anyhow::Error> {
        let conn = db::open_or_create(&db_path)?;
        let secret = if client_secret.is_empty() { None } else { Some(client_secret.as_str()) };
        db::save_credential_raw(&conn, "spotify", &token_json, Some(&client_id), secret)?;
        Ok(())
    })
    .await??;

    info!("Spotify tokens saved to DB for provider 'spotify'");
    println!("Saved tokens to DB. You can now run the export commands.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_scopes_and_challenge() {
        let url = authorize_url("cid", "http://127.0.0.1:8888/", Some("chal")).unwrap();
        let pairs: std::collections::HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "cid");
        assert_eq!(pairs["scope"], "playlist-read-private user-library-read");
        assert_eq!(pairs["code_challenge"], "chal");
        assert_eq!(pairs["code_challenge_method"], "S256");
    }

    #[test]
    fn verifier_is_unreserved_and_sized() {
        let v = code_verifier();
        assert_eq!(v.len(), VERIFIER_LEN);
        assert!(v.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn challenge_matches_rfc7636_example() {
        let v = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(code_challenge(v), "E9Melhoa2OwvFrEMTJguCHaoeK1zXLgvw4K3n7w5MNE");
    }

    #[test]
    fn code_is_read_from_redirect() {
        assert_eq!(code_from_redirect("http://127.0.0.1:8888/?code=abc&state=x").unwrap(), "abc");
        assert!(code_from_redirect("http://127.0.0.1:8888/?error=access_denied").is_err());
        assert!(code_from_redirect("not a url").is_err());
    }
}
