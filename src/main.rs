use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use inbox_autoreply::config::{CheckpointBackend, PollerConfig};
use inbox_autoreply::llm::create_provider;
use inbox_autoreply::mail::{GmailClient, MailProvider};
use inbox_autoreply::pipeline::{
    LabelService, MessageClassifier, PollCycle, PollerDeps, ReplyComposer,
};
use inbox_autoreply::store::{CheckpointStore, FileCheckpointStore, LibSqlCheckpointStore};
use inbox_autoreply::worker::{self, Poller};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PollerConfig::from_env().context("invalid configuration")?;

    // Keep the guard alive so buffered file logs flush on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("📬 inbox-autoreply v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Mail auth: {}", config.mail_auth.describe());
    eprintln!("   Query: {} (page {})", config.cycle.query, config.cycle.page_size);
    eprintln!(
        "   Checkpoint: {:?} at {}",
        config.checkpoint_backend,
        config.checkpoint_path.display()
    );
    if !config.cycle.ignore_senders.is_empty() {
        eprintln!("   Ignoring: {}", config.cycle.ignore_senders.join(", "));
    }

    // ── Collaborators ───────────────────────────────────────────────────
    let llm = create_provider(&config.llm).context("failed to create LLM provider")?;
    let mail: Arc<dyn MailProvider> = Arc::new(GmailClient::new(config.mail_auth.token_source()));

    let checkpoints: Arc<dyn CheckpointStore> = match config.checkpoint_backend {
        CheckpointBackend::LibSql => Arc::new(
            LibSqlCheckpointStore::new_local(&config.checkpoint_path)
                .await
                .with_context(|| {
                    format!(
                        "failed to open checkpoint database at {}",
                        config.checkpoint_path.display()
                    )
                })?,
        ),
        CheckpointBackend::File => {
            if let Some(parent) = config.checkpoint_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create checkpoint directory {}", parent.display())
                })?;
            }
            Arc::new(FileCheckpointStore::new(&config.checkpoint_path))
        }
    };

    let deps = PollerDeps {
        mail: Arc::clone(&mail),
        classifier: Arc::new(MessageClassifier::new(llm)),
        labels: Arc::new(LabelService::new(Arc::clone(&mail))),
        replies: Arc::new(ReplyComposer::new(mail, config.from_address.clone())),
        checkpoints,
    };
    let poller = Arc::new(Poller::new(PollCycle::new(deps, config.cycle.clone())));

    // ── Run ─────────────────────────────────────────────────────────────
    if config.run_once {
        eprintln!("   Mode: single tick\n");
        return match poller.run_now().await {
            Some(Err(e)) => Err(anyhow::Error::new(e).context("tick failed")),
            _ => Ok(()),
        };
    }

    eprintln!("   Schedule: {}\n", config.schedule);
    let (handle, shutdown) = worker::spawn_poller(Arc::clone(&poller), config.schedule.clone());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, waiting for in-flight tick");
    worker::shutdown(&poller, handle, &shutdown).await;

    Ok(())
}

fn init_tracing(config: &PollerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-autoreply.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
