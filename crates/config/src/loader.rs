use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    env::apply_env_overrides,
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::RelayConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "taskrelay.toml",
    "taskrelay.yaml",
    "taskrelay.yml",
    "taskrelay.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load config from `explicit` or the standard locations, then apply
/// environment overrides.
///
/// Search order when no path is given:
/// 1. `./taskrelay.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/taskrelay/taskrelay.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `RelayConfig::default()` if no file is found; the
/// environment alone can then supply everything required. Returns the path
/// that was loaded, if any.
pub fn discover_and_load(explicit: Option<&Path>) -> Result<(RelayConfig, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    let mut config = match &path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(path)?
        },
        None => {
            debug!("no config file found, using defaults");
            RelayConfig::default()
        },
    };

    apply_env_overrides(&mut config)?;
    Ok((config, path))
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/taskrelay/
    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/taskrelay/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "taskrelay").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<RelayConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let ctx = || format!("failed to parse {}", path.display());

    match ext {
        "toml" => toml::from_str(raw).with_context(ctx),
        "yaml" | "yml" => serde_yaml::from_str(raw).with_context(ctx),
        "json" => serde_json::from_str(raw).with_context(ctx),
        _ => Err(Error::Message {
            message: format!("unsupported config format: .{ext}"),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "taskrelay.toml",
            r#"
            [chat]
            token = "xoxb-1"

            [bus]
            host = "127.0.0.1"
            port = 6379
            password = "pw"
            channel = "incoming"
            "#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.chat.token.unwrap().expose_secret(), "xoxb-1");
        assert_eq!(cfg.bus.channel.as_deref(), Some("incoming"));
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "taskrelay.yaml",
            "bus:\n  host: redis\n  port: 6379\nrelay:\n  notify_on_failure: true\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.bus.host.as_deref(), Some("redis"));
        assert!(cfg.relay.notify_on_failure);
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "taskrelay.json",
            r#"{"bus": {"channel": "incoming", "keepalive_secs": 0}}"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.bus.channel.as_deref(), Some("incoming"));
        assert_eq!(cfg.bus.keepalive_secs, 0);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "taskrelay.ini", "[bus]\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "taskrelay.toml", "[bus\nhost = ");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("taskrelay.toml"));
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_and_load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
