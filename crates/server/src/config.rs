use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use listing::{controller::DEFAULT_PAGINATION_OPTIONS, StaticPolicy};
use serde::Deserialize;
use tracing::warn;

const CONFIG_FILE: &str = "server.toml";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub pagination_options: Vec<u32>,
    /// Role name to granted permission names. `*` grants everything.
    pub roles: BTreeMap<String, Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/backoffice.db".into(),
            upload_dir: PathBuf::from("./data/uploads"),
            pagination_options: DEFAULT_PAGINATION_OPTIONS.to_vec(),
            roles: default_roles(),
        }
    }
}

/// Shape of `server.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind_addr: Option<String>,
    database_url: Option<String>,
    upload_dir: Option<String>,
    pagination_options: Option<Vec<u32>>,
    roles: Option<BTreeMap<String, Vec<String>>>,
}

fn default_roles() -> BTreeMap<String, Vec<String>> {
    let cashier = [
        "access_products",
        "show_products",
        "export_products",
        "access_quotations",
        "access_sales",
        "access_sale_payments",
    ];
    BTreeMap::from([
        ("admin".to_string(), vec!["*".to_string()]),
        (
            "cashier".to_string(),
            cashier.iter().map(|g| g.to_string()).collect(),
        ),
    ])
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(CONFIG_FILE) {
        apply_file_config(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<FileConfig>(raw) {
        Ok(cfg) => cfg,
        Err(error) => {
            warn!(%error, file = CONFIG_FILE, "ignoring unreadable config file");
            return;
        }
    };

    if let Some(v) = file_cfg.bind_addr {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.upload_dir {
        settings.upload_dir = PathBuf::from(v);
    }
    if let Some(v) = file_cfg.pagination_options.filter(|opts| valid_options(opts)) {
        settings.pagination_options = v;
    }
    if let Some(roles) = file_cfg.roles {
        settings.roles.extend(roles);
    }
}

fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = var("APP__UPLOAD_DIR") {
        settings.upload_dir = PathBuf::from(v);
    }

    if let Some(v) = var("APP__PAGINATION_OPTIONS") {
        let parsed: Result<Vec<u32>, _> = v.split(',').map(|n| n.trim().parse()).collect();
        match parsed {
            Ok(options) if valid_options(&options) => settings.pagination_options = options,
            _ => warn!(value = %v, "ignoring invalid APP__PAGINATION_OPTIONS"),
        }
    }
}

fn valid_options(options: &[u32]) -> bool {
    !options.is_empty() && options.iter().all(|n| *n > 0)
}

pub fn build_policy(roles: &BTreeMap<String, Vec<String>>) -> StaticPolicy {
    roles
        .iter()
        .fold(StaticPolicy::new(), |policy, (role, grants)| {
            policy.grant(role.clone(), grants.iter().cloned())
        })
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
