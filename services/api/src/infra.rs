use chrono::NaiveDate;
use homefax::config::{AppConfig, RootAdminConfig};
use homefax::error::AppError;
use homefax::workflows::domain::PropertyDraft;
use homefax::workflows::{read_roll_file, HomefaxPlatform, InMemoryStore, SystemClock};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ServicePlatform = HomefaxPlatform<InMemoryStore>;

/// Wire the platform against the in-memory store, then apply the configured
/// root administrator and county roll.
pub(crate) fn build_platform(config: &AppConfig) -> Result<Arc<ServicePlatform>, AppError> {
    let platform = Arc::new(HomefaxPlatform::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(SystemClock),
        config.auth.platform_settings(),
    ));

    match &config.auth.root_admin {
        Some(root) => seed_root_admin(&platform, root)?,
        None => warn!("no root administrator configured; admin keys cannot be issued"),
    }

    if let Some(path) = &config.roll.path {
        let drafts = load_roll(path)?;
        let loaded = platform.properties().load_roll(drafts)?;
        info!(path = %path.display(), properties = loaded.len(), "county roll loaded");
    }

    Ok(platform)
}

fn seed_root_admin(platform: &ServicePlatform, root: &RootAdminConfig) -> Result<(), AppError> {
    let actor = platform
        .registration()
        .bootstrap_root_admin(&root.name, &root.email, &root.password)?;
    info!(actor = %actor.id, email = %actor.email, "root administrator available");
    Ok(())
}

pub(crate) fn load_roll(path: &Path) -> Result<Vec<PropertyDraft>, AppError> {
    Ok(read_roll_file(path)?)
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| format!("invalid date '{value}': {err}"))
}
