use crate::db;
use crate::error::{persistence, PortalError};
use crate::provision::SeedPolicy;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const CONFIG_KEY: &str = "portal.config";
pub const ADMIN_PASSWORD_ENV: &str = "RESULTSD_ADMIN_PASSWORD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalConfig {
    pub admin_user: String,
    pub admin_password: String,
    pub seed_policy: SeedPolicy,
    /// Set from the environment at load; never persisted.
    #[serde(skip)]
    pub admin_password_override: Option<String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            admin_user: "admin".to_string(),
            admin_password: "admin123".to_string(),
            seed_policy: SeedPolicy::Present,
            admin_password_override: None,
        }
    }
}

impl PortalConfig {
    pub fn redacted_json(&self) -> serde_json::Value {
        json!({
            "adminUser": self.admin_user,
            "adminPasswordSet": !self.admin_password.is_empty(),
            "adminPasswordFromEnv": self.admin_password_override.is_some(),
            "seedPolicy": self.seed_policy,
        })
    }

    /// Applies a partial update. Unknown keys are rejected so typos do not silently no-op.
    pub fn patched(&self, patch: &serde_json::Value) -> Result<PortalConfig, PortalError> {
        let Some(obj) = patch.as_object() else {
            return Err(PortalError::bad_params("patch must be an object"));
        };
        let mut next = self.clone();
        for (key, value) in obj {
            match key.as_str() {
                "adminUser" => {
                    let v = non_empty_str(value, "adminUser")?;
                    next.admin_user = v;
                }
                "adminPassword" => {
                    let v = non_empty_str(value, "adminPassword")?;
                    next.admin_password = v;
                }
                "seedPolicy" => {
                    let raw = value.as_str().unwrap_or("");
                    next.seed_policy = SeedPolicy::parse(raw).ok_or_else(|| {
                        PortalError::bad_params("seedPolicy must be one of: present, absent")
                    })?;
                }
                other => {
                    return Err(PortalError::bad_params(format!(
                        "unknown config key: {}",
                        other
                    )))
                }
            }
        }
        Ok(next)
    }

    /// The password admin sign-in is checked against.
    pub fn effective_admin_password(&self) -> &str {
        self.admin_password_override
            .as_deref()
            .unwrap_or(&self.admin_password)
    }

    fn with_admin_password_override(mut self, pw: Option<String>) -> Self {
        self.admin_password_override = pw.filter(|p| !p.is_empty());
        self
    }

    fn with_env_overrides(self) -> Self {
        let pw = std::env::var(ADMIN_PASSWORD_ENV).ok();
        if pw.as_deref().map(|p| !p.is_empty()).unwrap_or(false) {
            log::info!("admin password taken from {}", ADMIN_PASSWORD_ENV);
        }
        self.with_admin_password_override(pw)
    }
}

fn non_empty_str(value: &serde_json::Value, key: &str) -> Result<String, PortalError> {
    match value.as_str().map(|s| s.trim()) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(PortalError::bad_params(format!(
            "{} must be a non-empty string",
            key
        ))),
    }
}

/// Stored config with defaults for anything missing, then environment overrides.
pub fn load(conn: &Connection) -> Result<PortalConfig, PortalError> {
    let stored = db::settings_get_json(conn, CONFIG_KEY)
        .map_err(persistence("db_query_failed", "settings"))?;
    let cfg = match stored {
        None => PortalConfig::default(),
        Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
            log::warn!("ignoring malformed {}: {}", CONFIG_KEY, e);
            PortalConfig::default()
        }),
    };
    Ok(cfg.with_env_overrides())
}

pub fn save(conn: &Connection, cfg: &PortalConfig) -> Result<(), PortalError> {
    let value = serde_json::to_value(cfg)
        .map_err(|e| PortalError::bad_params(format!("config not serializable: {}", e)))?;
    db::settings_set_json(conn, CONFIG_KEY, &value)
        .map_err(persistence("db_update_failed", "settings"))
}
