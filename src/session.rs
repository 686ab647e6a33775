use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use log::info;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

/// Boot端点返回的会话负载
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootPayload {
    stitcher_url: String,
    session_token: String,
    /// Seconds until the token must be refreshed.
    refresh_after: u64,
}

/// 已授权的拉流会话
#[derive(Debug, Clone)]
pub struct Session {
    pub stitcher_url: Url,
    pub token: String,
    pub refresh_deadline: Instant,
}

impl Session {
    /// 带token的完整manifest地址；core不负责刷新授权
    pub fn manifest_url(&self) -> Url {
        let mut url = self.stitcher_url.clone();
        url.query_pairs_mut()
            .append_pair("sessionToken", &self.token);
        url
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.refresh_deadline
    }
}

/// 会话引导：一次请求换取stitcher地址、token和刷新期限
pub async fn bootstrap(client: &Client, boot_url: &Url) -> Result<Session> {
    info!("Bootstrapping session from {}", boot_url);

    let payload: BootPayload = client
        .get(boot_url.clone())
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let stitcher_url = Url::parse(&payload.stitcher_url)
        .map_err(|e| anyhow!("boot returned invalid stitcher URL {}: {}", payload.stitcher_url, e))?;
    let session = Session {
        stitcher_url,
        token: payload.session_token,
        refresh_deadline: Instant::now() + Duration::from_secs(payload.refresh_after),
    };
    info!(
        "Session established, refresh due in {}s",
        payload.refresh_after
    );

    Ok(session)
}
