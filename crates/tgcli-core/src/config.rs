use std::{
    env, fs,
    path::{Path, PathBuf},
    process::Command,
};

use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

pub const CONFIG_PATH_ENV: &str = "TGCLI_CONFIG";
pub const API_ID_ENV: &str = "TELEGRAM_API_ID";
pub const API_HASH_ENV: &str = "TELEGRAM_API_HASH";

pub const SESSION_FILE: &str = "session";
pub const UPDATE_STATE_FILE: &str = "update_check.json";

/// Telegram API credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub api_id: i32,
    pub api_hash: String,
}

/// `api_id` may be written as a number or as a (possibly `op://`) string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Int(i64),
    Str(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    api_id: Option<RawValue>,
    api_hash: Option<RawValue>,
}

#[derive(Serialize)]
struct ConfigFile<'a, I: Serialize> {
    api_id: I,
    api_hash: &'a str,
}

impl Config {
    /// Load credentials.
    ///
    /// Resolution order: config TOML (`op://` references resolved with the 1Password
    /// CLI), then `TELEGRAM_API_ID` / `TELEGRAM_API_HASH`.
    pub fn load() -> Result<Self> {
        let path = default_config_path()?;
        Self::load_with(&path, env_str)
    }

    pub fn load_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = if path.exists() {
            let txt = fs::read_to_string(path)?;
            toml::from_str::<RawConfig>(&txt)?
        } else {
            RawConfig::default()
        };

        let api_id = match raw.api_id {
            Some(v) => Some(resolve_value(v)?),
            None => env(API_ID_ENV).and_then(non_empty),
        };
        let api_hash = match raw.api_hash {
            Some(v) => Some(resolve_value(v)?),
            None => env(API_HASH_ENV).and_then(non_empty),
        };

        let (Some(api_id), Some(api_hash)) = (api_id, api_hash) else {
            return Err(Error::Config(format!(
                "Telegram API credentials not found. Set them in {} or via {API_ID_ENV} / {API_HASH_ENV}",
                path.display()
            )));
        };
        let api_id = api_id
            .trim()
            .parse::<i32>()
            .map_err(|_| Error::Config(format!("api_id must be an integer, got {api_id:?}")))?;

        Ok(Self {
            api_id,
            api_hash: api_hash.trim().to_string(),
        })
    }
}

/// `$TGCLI_CONFIG`, else `$XDG_CONFIG_HOME/tgcli/config.toml`, else
/// `~/.config/tgcli/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(p) = env::var_os(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("config.toml"))
}

/// Directory holding config and local state.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join("tgcli"));
    }
    let home = home_dir().ok_or_else(|| Error::Config("HOME is not set".to_string()))?;
    Ok(home.join(".config").join("tgcli"))
}

/// Local state (session, update cache) lives next to the config file.
pub fn data_dir() -> Result<PathBuf> {
    Ok(data_dir_for(&default_config_path()?))
}

pub fn session_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(SESSION_FILE))
}

pub fn update_state_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(UPDATE_STATE_FILE))
}

pub fn data_dir_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Write plain credentials; creates parent directories. Returns the path written.
pub fn write_config(api_id: i32, api_hash: &str, path: &Path) -> Result<PathBuf> {
    write_toml(path, &ConfigFile { api_id, api_hash })
}

/// Store credentials in 1Password and write `op://` references to the config.
pub fn write_config_op(
    api_id: i32,
    api_hash: &str,
    vault: &str,
    item_title: &str,
    path: &Path,
) -> Result<PathBuf> {
    let out = Command::new("op")
        .args(["item", "create", "--category", "login"])
        .args(["--title", item_title, "--vault", vault])
        .arg(format!("api_id[text]={api_id}"))
        .arg(format!("api_hash[text]={api_hash}"))
        .output()
        .map_err(|e| Error::Config(format!("failed to run `op`: {e}")))?;
    if !out.status.success() {
        return Err(Error::Config(format!(
            "`op item create` failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let id_ref = op_reference(vault, item_title, "api_id");
    let hash_ref = op_reference(vault, item_title, "api_hash");
    write_toml(
        path,
        &ConfigFile {
            api_id: id_ref.as_str(),
            api_hash: &hash_ref,
        },
    )
}

pub fn op_reference(vault: &str, item_title: &str, field: &str) -> String {
    format!("op://{vault}/{item_title}/{field}")
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let txt = toml::to_string(value).map_err(|e| Error::Config(format!("toml encode: {e}")))?;
    fs::write(path, txt)?;
    Ok(path.to_path_buf())
}

fn resolve_value(v: RawValue) -> Result<String> {
    match v {
        RawValue::Int(i) => Ok(i.to_string()),
        RawValue::Str(s) if s.starts_with("op://") => resolve_op(&s),
        RawValue::Str(s) => Ok(s),
    }
}

/// Resolve a 1Password reference with `op read`.
fn resolve_op(reference: &str) -> Result<String> {
    let out = Command::new("op")
        .args(["read", reference])
        .output()
        .map_err(|e| Error::Config(format!("failed to run `op read {reference}`: {e}")))?;
    if !out.status.success() {
        return Err(Error::Config(format!(
            "`op read {reference}` failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        env::temp_dir().join(format!("{prefix}-{}-{ts}", std::process::id()))
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn loads_numeric_and_string_ids_from_toml() {
        let dir = tmp_dir("tgcli-cfg");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        fs::write(&path, "api_id = 123\napi_hash = \"abc\"\n").unwrap();
        let cfg = Config::load_with(&path, no_env).unwrap();
        assert_eq!(cfg.api_id, 123);
        assert_eq!(cfg.api_hash, "abc");
        assert_eq!(data_dir_for(&path), dir);

        fs::write(&path, "api_id = \"456\"\napi_hash = \"def\"\n").unwrap();
        assert_eq!(Config::load_with(&path, no_env).unwrap().api_id, 456);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn env_fills_in_missing_values_but_file_wins() {
        let dir = tmp_dir("tgcli-cfg-env");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(&path, "api_hash = \"from-file\"\n").unwrap();

        let vars: HashMap<&str, &str> = [(API_ID_ENV, "777"), (API_HASH_ENV, "from-env")].into();
        let cfg = Config::load_with(&path, |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.api_id, 777);
        assert_eq!(cfg.api_hash, "from-file");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_credentials_is_config_error() {
        let path = tmp_dir("tgcli-cfg-missing").join("config.toml");
        let err = Config::load_with(&path, no_env).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains(API_ID_ENV)));
    }

    #[test]
    fn non_numeric_api_id_is_rejected() {
        let path = tmp_dir("tgcli-cfg-bad").join("config.toml");
        let vars = |k: &str| match k {
            API_ID_ENV => Some("abc".to_string()),
            API_HASH_ENV => Some("h".to_string()),
            _ => None,
        };
        assert!(matches!(
            Config::load_with(&path, vars),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn write_config_creates_parents_and_is_loadable() {
        let dir = tmp_dir("tgcli-cfg-write");
        let path = dir.join("a").join("config.toml");
        write_config(42, "h\"ash", &path).unwrap();
        let cfg = Config::load_with(&path, no_env).unwrap();
        assert_eq!(cfg.api_id, 42);
        assert_eq!(cfg.api_hash, "h\"ash");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn bare_file_name_keeps_state_in_cwd() {
        assert_eq!(data_dir_for(Path::new("config.toml")), PathBuf::from("."));
        assert_eq!(
            data_dir_for(Path::new("/etc/tgcli/config.toml")),
            PathBuf::from("/etc/tgcli")
        );
    }

    #[test]
    fn op_reference_format() {
        assert_eq!(
            op_reference("Personal", "Telegram API", "api_hash"),
            "op://Personal/Telegram API/api_hash"
        );
    }
}
