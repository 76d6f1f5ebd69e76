pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use tokio::sync::Notify;

use crate::config::Config;
use crate::middleware::auth::AuthKeys;
use crate::services::{
    attempt_service::AttemptService, draft::AutosavePolicy, entry_service::EntryService,
    grading_worker::GradingWorker, monitor_service::MonitorService, sweep_service::SweepService,
};
use crate::store::AttemptStore;
use crate::utils::client_ip::ClientIpResolver;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AttemptStore>,
    pub attempt_service: AttemptService,
    pub entry_service: EntryService,
    pub monitor_service: MonitorService,
    pub auth: AuthKeys,
    pub client_ips: ClientIpResolver,
    pub grading_signal: Arc<Notify>,
}

impl AppState {
    pub fn new(store: Arc<dyn AttemptStore>, config: &Config) -> Self {
        let grading_signal = Arc::new(Notify::new());
        let autosave = AutosavePolicy::new(config.save_interval(), config.save_debounce());

        let attempt_service = AttemptService::new(store.clone(), autosave, grading_signal.clone());
        let entry_service = EntryService::new(store.clone());
        let monitor_service = MonitorService::new(store.clone());

        Self {
            store,
            attempt_service,
            entry_service,
            monitor_service,
            auth: AuthKeys::from_secret(&config.jwt_secret),
            client_ips: ClientIpResolver::new(config.trusted_proxies.clone()),
            grading_signal,
        }
    }

    /// Worker sharing this state's wake-up signal, so submits start grading promptly.
    pub fn grading_worker(&self, config: &Config) -> GradingWorker {
        GradingWorker::new(
            self.store.clone(),
            self.grading_signal.clone(),
            config.grading_max_attempts,
        )
    }

    pub fn sweep_service(&self, config: &Config) -> SweepService {
        SweepService::new(
            self.store.clone(),
            chrono::Duration::minutes(config.abandon_after_minutes),
        )
    }
}
