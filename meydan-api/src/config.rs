use meydan_common::{snowflake::WorkerId, util::PositiveDuration};
use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};
use time::Duration;

/// Process configuration, read from the environment.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct Config {
    pub server_address: IpAddr,
    pub server_port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_worker_id")]
    pub worker_id: WorkerId,
    /// Zero disables expiry.
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    #[serde(default = "default_admin_contact")]
    pub admin_contact: String,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
    /// Bootstraps an admin account when set and none exists yet.
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl Config {
    #[must_use]
    pub fn session_ttl(&self) -> Option<PositiveDuration> {
        let seconds = i64::try_from(self.session_ttl_seconds).unwrap_or(i64::MAX);
        PositiveDuration::new(Duration::seconds(seconds))
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("db.json")
}

fn default_worker_id() -> WorkerId {
    WorkerId::default()
}

fn default_session_ttl_seconds() -> u64 {
    24 * 60 * 60
}

fn default_admin_contact() -> String {
    "admin".to_owned()
}

fn default_admin_name() -> String {
    "Yönetici".to_owned()
}
