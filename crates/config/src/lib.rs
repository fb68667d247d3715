//! Configuration loading, environment overrides, and startup validation.
//!
//! Config files: `taskrelay.toml`, `taskrelay.yaml`, or `taskrelay.json`
//! Searched in `./` then `~/.config/taskrelay/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values, and the
//! `TASKRELAY_*` environment variables override whatever the file says.

pub mod env;
pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    env::{apply_env_overrides, apply_env_overrides_with},
    error::{Error as ConfigError, Result},
    loader::{config_dir, discover_and_load, load_config},
    schema::{
        BusConfig, ChatConfig, CommandConfig, DispatchConfig, RelayConfig, SlackConfig,
        WireFormat,
    },
    validate::{
        Diagnostic, ResolvedConfig, Severity, ValidationResult, ensure_startup,
        require_parameters, validate,
    },
};
