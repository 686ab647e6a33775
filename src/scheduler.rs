use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info};
use reqwest::Client;
use tokio::time::{self, MissedTickBehavior};

use crate::cli::Args;
use crate::session::Session;

/// 固定间隔轮询管道
///
/// Each tick runs one full pipeline invocation and is awaited to completion
/// before the next, so invocations never overlap. A failed tick is only
/// logged; the next tick is the retry mechanism.
pub async fn run_polling(client: Arc<Client>, args: Args) -> Result<()> {
    let period = Duration::from_secs(args.interval);
    info!("Polling every {}s. Ctrl-C to stop.", args.interval);

    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut session: Option<Session> = None;

    loop {
        ticker.tick().await;
        if let Err(e) = crate::run_once(&client, &args, &mut session).await {
            error!("Pipeline tick failed: {}", e);
        }
    }
}
