pub mod cli;
pub mod config;
pub mod crypto;
pub mod decryptor;
pub mod error;
pub mod http;
pub mod manifest;
pub mod scheduler;
pub mod session;

use anyhow::{anyhow, Result};
use log::{error, info};
use reqwest::Client;
use std::sync::Arc;
use url::Url;

use crate::cli::Args;
use crate::decryptor::SegmentDecryptor;
use crate::http::build_http_client;
use crate::session::Session;

/// 运行归档器的主要逻辑
pub async fn run(args: Args) -> Result<()> {
    let client = Arc::new(build_http_client(&args.headers)?);

    if args.interval == 0 {
        let mut session = None;
        run_once(&client, &args, &mut session).await
    } else {
        scheduler::run_polling(client, args).await
    }
}

/// 单次完整管道：解析manifest地址 → 选流 → 解密落盘
pub async fn run_once(
    client: &Arc<Client>,
    args: &Args,
    session_slot: &mut Option<Session>,
) -> Result<()> {
    let manifest_url = resolve_manifest_url(client, args, session_slot).await?;
    let text = http::fetch_text(client, &manifest_url).await?;

    let (media_text, base_url) = if manifest::is_master(&text) {
        let master = manifest::parse_master(&text);
        info!("Master manifest with {} variants.", master.variants.len());
        let variant = manifest::select_variant(&master.variants)
            .ok_or_else(|| anyhow!("No variants found in master manifest"))?;
        info!("Selected variant with bandwidth: {}", variant.bandwidth);

        let media_url = manifest_url.join(&variant.uri)?;
        let media_text = http::fetch_text(client, &media_url).await?;
        (media_text, media_url)
    } else {
        info!("Media manifest received directly.");
        (text, manifest_url)
    };

    let decryptor = SegmentDecryptor::new(
        client.clone(),
        args.output_dir.clone(),
        Some(base_url),
        args.conventions(),
    );
    let summary = decryptor.process(&media_text, &args.show).await?;

    if summary.failed() > 0 {
        error!(
            "Failed to materialize {} out of {} segments.",
            summary.failed(),
            summary.total()
        );
        for (url, e) in &summary.failures {
            error!(" - {}: {}", url, e);
        }
        anyhow::bail!("Processing failed for some segments.");
    }

    info!(
        "{} segments written, {} already present.",
        summary.written, summary.skipped
    );
    Ok(())
}

/// 确定本次manifest地址：直连URL或经会话引导
async fn resolve_manifest_url(
    client: &Client,
    args: &Args,
    session_slot: &mut Option<Session>,
) -> Result<Url> {
    match (&args.url, &args.boot_url) {
        (Some(raw), _) => Ok(Url::parse(raw)?),
        (None, Some(boot)) => {
            let session = match session_slot.take().filter(|s| !s.is_expired()) {
                Some(session) => session,
                None => session::bootstrap(client, &Url::parse(boot)?).await?,
            };
            let manifest_url = session.manifest_url();
            *session_slot = Some(session);
            Ok(manifest_url)
        }
        (None, None) => anyhow::bail!("either --url or --boot-url is required"),
    }
}
