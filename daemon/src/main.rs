//! Groupware sync daemon
//!
//! Periodically reconciles each configured account's local contact, calendar and task
//! collections with their remote counterparts.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use groupware_sync_daemon::app_state::{app_state_factory, AppState};
use groupware_sync_daemon::log_appender::setup_logging;
use groupware_sync_daemon::scheduler::SimpleTaskManager;
use groupware_sync_lib::ProjectConfig;
use log::{error, info, warn, LevelFilter};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("groupware-sync-daemon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Keep local contacts, calendars and task lists in step with a groupware server")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Log per-item decisions"),
        )
        .subcommand(Command::new("run").about("Reconcile every account periodically until interrupted (default)"))
        .subcommand(Command::new("once").about("Run a single pass for every account and exit"))
        .subcommand(Command::new("pairings").about("List persisted collection pairings"))
        .get_matches();

    let project_config = ProjectConfig::new().await?;

    let level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    setup_logging(project_config.project_dirs.data_dir(), level)
        .context("Failed to setup logging")?;

    let app_state = Arc::new(
        app_state_factory(project_config)
            .await
            .context("Failed to initialize application state")?,
    );
    info!(
        "Database location: {}",
        app_state.persistency_manager.db_path().display()
    );

    match matches.subcommand_name() {
        Some("once") => run_once(&app_state).await,
        Some("pairings") => list_pairings(&app_state).await,
        _ => run_daemon(app_state).await,
    }
}

async fn run_daemon(app_state: Arc<AppState>) -> Result<()> {
    let settings = &app_state.project_config.settings;
    if settings.accounts.is_empty() {
        warn!(
            "No accounts configured, add them to {}",
            app_state.project_config.project_dirs.config_dir().display()
        );
    }

    let mut task_manager = SimpleTaskManager::new();
    for account in &settings.accounts {
        task_manager.start_account_task(
            app_state.clone(),
            account.clone(),
            settings.sync_config.sync_interval,
            settings.sync_config.disconnect_after_failures,
        )?;
    }

    info!("🚀 Daemon running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    task_manager.shutdown().await;
    Ok(())
}

async fn run_once(app_state: &AppState) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut failed = 0;

    for account in &app_state.project_config.settings.accounts {
        match app_state.run_account_pass(account, &cancel).await {
            Ok(stats) => println!("{}: {}", account.user_id, stats),
            Err(e) => {
                error!("❌ Pass for {} failed: {:#}", account.user_id, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} account pass(es) failed", failed);
    }
    Ok(())
}

async fn list_pairings(app_state: &AppState) -> Result<()> {
    let store = app_state.correlation_store();

    for account in &app_state.project_config.settings.accounts {
        let collections = store
            .collection_correlations_for_user(&account.user_id)
            .await
            .with_context(|| format!("Failed to list pairings for {}", account.user_id))?;

        println!("{}", account.user_id);
        if collections.is_empty() {
            println!("  (no pairings)");
        }
        for c in collections {
            println!(
                "  #{} {:<8} {} <-> {}  cursors: {} / {}",
                c.affiliation_id,
                c.entity_type.as_str(),
                c.local_collection_id,
                c.remote_collection_id,
                c.local_cursor.as_deref().unwrap_or("-"),
                c.remote_cursor.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}
