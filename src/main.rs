use std::sync::Arc;

use anyhow::Context;

use mail_rules::config::Config;
use mail_rules::mailbox::Mailbox;
use mail_rules::provider::{GmailClient, MailProvider};
use mail_rules::rules::RuleRunner;
use mail_rules::store::{LibSqlBackend, MessageStore};
use mail_rules::sync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %config.db_path.display(),
        rules = %config.rules_path.display(),
        strategy = ?config.strategy,
        "Starting mail-rules"
    );

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn MessageStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Provider ─────────────────────────────────────────────────────────
    let provider: Arc<dyn MailProvider> = Arc::new(GmailClient::new(
        config.gmail_api_base.clone(),
        config.gmail_token.clone(),
    ));
    let mailbox = Arc::new(Mailbox::new(provider.clone(), store.clone()));

    mailbox
        .refresh_labels()
        .await
        .context("Failed to refresh label mapping")?;

    let inserted = sync::sync_recent(provider.as_ref(), store.as_ref(), config.sync_window())
        .await
        .context("Failed to sync recent messages")?;
    tracing::info!(inserted, "Recent messages synced");

    // ── Rules ────────────────────────────────────────────────────────────
    let mut runner = RuleRunner::new(store, mailbox, config.strategy);
    let summary = runner
        .run(&config.rules_path)
        .await
        .context("Rule run failed")?;

    for tally in &summary.matched_per_group {
        tracing::info!(group = %tally.name, matched = tally.matched, "Group summary");
    }
    tracing::info!(
        processed = summary.processed,
        actions_attempted = summary.actions_attempted,
        actions_failed = summary.actions_failed,
        "Done"
    );

    Ok(())
}
