//! Once-a-day check for a newer release on crates.io.
//!
//! Every failure path means "no update": the check must never break a command.

use std::{
    fs,
    future::Future,
    path::{Component, Path},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

pub const CRATE_NAME: &str = "tgcli";
const CRATES_IO_URL: &str = "https://crates.io/api/v1/crates/tgcli";
const COOLDOWN_SECS: i64 = 24 * 60 * 60;
const TIMEOUT: Duration = Duration::from_secs(3);

/// Cached result of the last check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateState {
    /// Unix seconds.
    #[serde(default)]
    pub last_check: i64,
    #[serde(default)]
    pub latest_version: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallMethod {
    Homebrew,
    Cargo,
    Unknown,
}

/// Missing or corrupt state reads as "never checked".
pub fn load_state(path: &Path) -> UpdateState {
    fs::read_to_string(path)
        .ok()
        .and_then(|txt| serde_json::from_str(&txt).ok())
        .unwrap_or_default()
}

pub fn save_state(path: &Path, state: &UpdateState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string(state)?)?;
    Ok(())
}

/// Remove cached state (e.g. right after an upgrade).
pub fn clear_update_state(path: &Path) {
    let _ = fs::remove_file(path);
}

/// Numeric comparison per dot-separated component; anything unparsable is never newer.
pub fn is_newer(latest: &str, current: &str) -> bool {
    fn parse(v: &str) -> Option<Vec<u64>> {
        v.trim().split('.').map(|p| p.parse().ok()).collect()
    }
    match (parse(latest), parse(current)) {
        (Some(l), Some(c)) => l > c,
        _ => false,
    }
}

#[derive(Deserialize)]
struct CrateResponse {
    #[serde(rename = "crate")]
    krate: CrateInfo,
}

#[derive(Deserialize)]
struct CrateInfo {
    max_stable_version: Option<String>,
    max_version: Option<String>,
}

/// Latest published version, or `None` on any failure.
pub async fn fetch_latest_version() -> Option<String> {
    let http = reqwest::Client::builder()
        .timeout(TIMEOUT)
        .user_agent(concat!("tgcli/", env!("CARGO_PKG_VERSION")))
        .build()
        .ok()?;
    let resp = match http.get(CRATES_IO_URL).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            debug!(status = %r.status(), "update check: unexpected status");
            return None;
        }
        Err(e) => {
            debug!(error = %e, "update check failed");
            return None;
        }
    };
    let body: CrateResponse = resp.json().await.ok()?;
    body.krate.max_stable_version.or(body.krate.max_version)
}

/// Returns the newer version if there is one. Hits the network at most once
/// per 24 hours.
pub async fn check_for_update(state_path: &Path, current: &str) -> Option<String> {
    check_with(state_path, current, Utc::now(), fetch_latest_version).await
}

pub async fn check_with<F, Fut>(
    state_path: &Path,
    current: &str,
    now: DateTime<Utc>,
    fetch: F,
) -> Option<String>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<String>>,
{
    let state = load_state(state_path);
    let now = now.timestamp();

    let latest = if now - state.last_check < COOLDOWN_SECS {
        state.latest_version?
    } else {
        let latest = fetch().await?;
        let fresh = UpdateState {
            last_check: now,
            latest_version: Some(latest.clone()),
        };
        if let Err(e) = save_state(state_path, &fresh) {
            debug!(error = %e, "could not save update state");
        }
        latest
    };

    is_newer(&latest, current).then_some(latest)
}

pub fn detect_install_method() -> InstallMethod {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.canonicalize().ok())
        .map(|p| install_method_for(&p))
        .unwrap_or(InstallMethod::Unknown)
}

pub fn install_method_for(exe: &Path) -> InstallMethod {
    let has = |name: &str| {
        exe.components()
            .any(|c| matches!(c, Component::Normal(s) if s == name))
    };
    if has("Cellar") || has("homebrew") {
        InstallMethod::Homebrew
    } else if has(".cargo") {
        InstallMethod::Cargo
    } else {
        InstallMethod::Unknown
    }
}

pub fn upgrade_hint(method: InstallMethod) -> String {
    match method {
        InstallMethod::Homebrew => format!("Run `brew upgrade {CRATE_NAME}` to upgrade."),
        InstallMethod::Cargo => format!("Run `cargo install {CRATE_NAME} --force` to upgrade."),
        InstallMethod::Unknown => format!("See https://crates.io/crates/{CRATE_NAME} to upgrade."),
    }
}

pub fn format_update_notice(current: &str, latest: &str, method: InstallMethod) -> String {
    format!(
        "Update available: {current} -> {latest}. {}",
        upgrade_hint(method)
    )
}
