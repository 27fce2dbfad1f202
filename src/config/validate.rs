// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile, ScriptConfig};
use crate::errors::{JobkeeperError, Result};

const BLAKE3_HEX_LEN: usize = 64;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::JobkeeperError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Validate a raw config without consuming it.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_host(cfg)?;
    validate_scripts_section(cfg)?;
    for (idx, script) in cfg.script.iter().enumerate() {
        validate_script(idx, script)?;
    }
    Ok(())
}

fn validate_host(cfg: &RawConfigFile) -> Result<()> {
    if cfg.host.dispatch_interval.get().is_zero() {
        return Err(JobkeeperError::ConfigError(
            "[host].dispatch_interval must be greater than zero".to_string(),
        ));
    }
    if cfg.host.grace_period.get().is_zero() {
        return Err(JobkeeperError::ConfigError(
            "[host].grace_period must be greater than zero".to_string(),
        ));
    }
    if cfg.host.kill_attempts == 0 {
        return Err(JobkeeperError::ConfigError(
            "[host].kill_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_scripts_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg
        .scripts
        .interpreter
        .as_deref()
        .is_some_and(|bin| bin.trim().is_empty())
    {
        return Err(JobkeeperError::ConfigError(
            "[scripts].interpreter must not be empty when set".to_string(),
        ));
    }
    if cfg.scripts.interpreter.is_none() && !cfg.scripts.interpreter_args.is_empty() {
        return Err(JobkeeperError::ConfigError(
            "[scripts].interpreter_args requires [scripts].interpreter".to_string(),
        ));
    }
    Ok(())
}

fn validate_script(idx: usize, script: &ScriptConfig) -> Result<()> {
    let Some(digest) = &script.blake3 else {
        return Ok(());
    };
    let digest = digest.trim();
    if digest.len() != BLAKE3_HEX_LEN || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(JobkeeperError::ConfigError(format!(
            "script #{} ('{}'): blake3 must be {} hex characters",
            idx + 1,
            script.path,
            BLAKE3_HEX_LEN
        )));
    }
    Ok(())
}
