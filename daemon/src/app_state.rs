use std::sync::Arc;

use anyhow::{Context, Result};
use groupware_sync_lib::{AccountSettings, EntityType, ProjectConfig, Side, Statistics};
use tokio_util::sync::CancellationToken;

use crate::adapters::directory_store::DirectoryStore;
use crate::adapters::EntityAdapter;
use crate::persistency::correlation_repository::CorrelationStore;
use crate::persistency::PersistencyManager;
use crate::sync::{AccountSession, CollectionSupervisor};

#[derive(Clone)]
pub struct AppState {
    pub project_config: Arc<ProjectConfig>,
    pub persistency_manager: Arc<PersistencyManager>,
}

impl AppState {
    pub fn correlation_store(&self) -> Arc<dyn CorrelationStore> {
        Arc::new(self.persistency_manager.correlation_repository())
    }

    /// One supervisor pass for an account: materialize its pairings, then reconcile them
    pub async fn run_account_pass(
        &self,
        account: &AccountSettings,
        cancel: &CancellationToken,
    ) -> Result<Statistics> {
        let supervisor = CollectionSupervisor::new(self.correlation_store());
        let session = account_session(account);

        supervisor
            .ensure_pairings(&session, &account.pairings)
            .await
            .with_context(|| format!("Failed to prepare pairings for {}", account.user_id))?;

        supervisor.run_pass(&session, account.prevalence, cancel).await
    }
}

pub async fn app_state_factory(project_config: ProjectConfig) -> Result<AppState> {
    let persistency_manager =
        PersistencyManager::new(project_config.project_dirs.data_dir().to_path_buf())
            .await
            .context("Failed to initialize persistency manager")?;
    persistency_manager
        .init_database()
        .await
        .context("Failed to initialize database schema")?;

    Ok(AppState {
        project_config: Arc::new(project_config),
        persistency_manager: Arc::new(persistency_manager),
    })
}

/// Directory-backed adapters for every entity type of an account
pub fn account_session(account: &AccountSettings) -> AccountSession {
    EntityType::ALL
        .into_iter()
        .fold(AccountSession::new(&account.user_id), |session, entity_type| {
            let local: Arc<dyn EntityAdapter> =
                Arc::new(DirectoryStore::new(account.store_root(Side::Local, entity_type)));
            let remote: Arc<dyn EntityAdapter> =
                Arc::new(DirectoryStore::new(account.store_root(Side::Remote, entity_type)));
            session.with_adapters(entity_type, local, remote)
        })
}
