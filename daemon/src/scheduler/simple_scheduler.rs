//! Periodic per-account reconciliation
//!
//! Every account gets its own ticking task, so accounts reconcile in parallel. A pass
//! that is still running when its account's next tick fires makes that tick a no-op.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use groupware_sync_lib::{AccountSettings, AccountStatus};
use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::sync::{is_cancellation, AccountHealth};

pub struct SimpleTaskManager {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl SimpleTaskManager {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start the periodic task for one account
    pub fn start_account_task(
        &mut self,
        app_state: Arc<AppState>,
        account: AccountSettings,
        every: Duration,
        disconnect_after_failures: u32,
    ) -> Result<()> {
        if every.is_zero() {
            bail!("Sync interval for {} must be greater than zero", account.user_id);
        }
        let cancel = self.cancel.child_token();
        let user_id = account.user_id.clone();

        let handle = tokio::spawn(async move {
            let account = Arc::new(account);
            let pass_running = Arc::new(Mutex::new(()));
            let health = Arc::new(Mutex::new(AccountHealth::new(disconnect_after_failures)));
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // The guard moves into the pass, so the lock is held exactly as long as it runs
                let Ok(guard) = pass_running.clone().try_lock_owned() else {
                    warn!("⏭️ Pass for {} still running, skipping this tick", account.user_id);
                    continue;
                };

                let app_state = app_state.clone();
                let account = account.clone();
                let health = health.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    run_pass(&app_state, &account, &health, &cancel).await;
                });
            }

            // Let an in-flight pass observe the cancellation before the task ends
            let _ = pass_running.lock().await;
            info!("🛑 Sync task for {} stopped", account.user_id);
        });

        self.handles.push(handle);
        info!("✅ Sync task started for {} (every {:?})", user_id, every);
        Ok(())
    }

    /// Cancel in-flight passes and wait for every account task to wind down
    pub async fn shutdown(self) {
        info!("🛑 Shutting down task manager...");
        self.cancel.cancel();

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("❌ Sync task ended abnormally: {}", e);
            }
        }

        info!("✅ Task manager shutdown complete");
    }
}

impl Default for SimpleTaskManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_pass(
    app_state: &AppState,
    account: &AccountSettings,
    health: &Mutex<AccountHealth>,
    cancel: &CancellationToken,
) {
    info!("🔄 Starting pass for {}", account.user_id);

    let result = app_state.run_account_pass(account, cancel).await;
    let mut health = health.lock().await;
    match result {
        Ok(stats) => {
            info!("✅ Pass for {} completed: {}", account.user_id, stats);
            if let Some(status) = health.record_success() {
                info!("🟢 {} is {}", account.user_id, status);
            }
        }
        Err(e) if is_cancellation(&e) => {
            info!("🛑 Pass for {} cancelled", account.user_id);
        }
        Err(e) => {
            error!("❌ Pass for {} failed: {:#}", account.user_id, e);
            if let Some(status @ AccountStatus::Disconnected(_)) = health.record_failure(&format!("{:#}", e)) {
                warn!(
                    "🔴 {} is {} after {} failed passes",
                    account.user_id,
                    status,
                    health.consecutive_failures()
                );
            }
        }
    }
}
