use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use clean_urls::config::Config;
use clean_urls::db::Db;
use clean_urls::hooks::{Message, MessagePipeline};
use clean_urls::logging;
use clean_urls::plugin::CleanUrlsPlugin;
use clean_urls::record::CleanedUrls;
use clean_urls::sanitizer::RuleEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    config.validate()?;
    logging::init_logging(config.log_format()?)?;
    let event = config.event()?;

    let db = Db::new(&config.database_url).await?;
    let record = db.load_cleaned_urls().await?;
    info!(entries = record.len(), "Loaded cleaned URL record");

    let pipeline = MessagePipeline::new();
    let mut plugin = CleanUrlsPlugin::new(RuleEngine::with_default_rules(), record);
    plugin.on_load(&pipeline);
    let record = plugin.record();

    // One message per line on stdin, rewritten message per line on stdout.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };

                let mut message = Message::new(line);
                pipeline.dispatch(event, &mut message);

                stdout.write_all(message.content.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;

                // Delivery never waits on the audit trail succeeding.
                if let Err(e) = flush_record(&db, &record).await {
                    error!("Failed to persist cleaned URLs: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    plugin.on_unload();
    flush_record(&db, &record).await?;
    info!(total = db.count().await?, "Shutting down");

    Ok(())
}

async fn flush_record(db: &Db, record: &Mutex<CleanedUrls>) -> Result<()> {
    let pending = record
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take_pending();
    if pending.is_empty() {
        return Ok(());
    }
    db.upsert_cleaned_urls(&pending).await
}
