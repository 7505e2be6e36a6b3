use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tgfwd_core::{
    checkpoint::CheckpointStore,
    config::Config,
    history::ExportHistorySource,
    run::{run, RunContext},
};
use tgfwd_telegram::TelegramForwarder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tgfwd_core::logging::init("tgfwd")?;

    let path = Config::resolve_path(std::env::args().nth(1));
    let cfg = Config::load(&path)?;

    let forwarder = TelegramForwarder::from_token(cfg.bot_token.clone());
    forwarder
        .verify_chats(cfg.chat_id, cfg.forward_to_id)
        .await
        .context("telegram preflight failed")?;
    let history = ExportHistorySource::new(&cfg.history_export);

    let mut store =
        CheckpointStore::new(cfg.checkpoint.clone(), Box::new(cfg.checkpoint_sink()));

    // First Ctrl-C takes effect during a flood-control delay, after the last
    // window has been checkpointed. A second one exits immediately.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if cancel.is_cancelled() {
                    warn!("second interrupt, exiting without waiting for the delay");
                    std::process::exit(130);
                }
                warn!("interrupt received, stopping at the next delay; Ctrl-C again exits now");
                cancel.cancel();
            }
        });
    }

    let ctx = RunContext {
        history: &history,
        forwarder: &forwarder,
        rate_limiter: cfg.rate_limiter(),
        source: cfg.chat_id,
        destination: cfg.forward_to_id,
    };
    let outcome = run(&ctx, &mut store, cfg.pagination_limit, &cancel).await;
    let result = outcome.with_context(|| {
        format!(
            "forwarding aborted; resume point is {} in {}",
            store.current().last_read_message_id,
            path.display()
        )
    })?;

    let checkpoint = store.merge(&result)?;
    info!(
        state = ?result.state,
        windows = result.windows_forwarded,
        forwarded = result.downloaded_ids.len(),
        last_read_message_id = checkpoint.last_read_message_id.0,
        retry = checkpoint.ids_to_retry.len(),
        "run finished"
    );

    Ok(())
}
