//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use rr_core::Config;

use crate::output::{Output, OutputFormat};

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "work_dir": config.work_dir,
                    "log_level": config.log_level,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.work_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  work_dir:  {}", config.work_dir.display());
            println!("  log_level: {}", config.log_level);
            println!(
                "  log_file:  {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(stderr)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "work_dir" => {
            if value.is_empty() {
                bail!("work_dir cannot be empty");
            }
            config.work_dir = value.into();
        }
        "log_level" => {
            let level = value.to_ascii_lowercase();
            if !LOG_LEVELS.contains(&level.as_str()) {
                bail!(
                    "Invalid value for log_level: '{}'. Use one of: {}",
                    value,
                    LOG_LEVELS.join(", ")
                );
            }
            config.log_level = level;
        }
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: work_dir, log_level, log_file",
                key
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_keys() {
        let mut config = Config::default();

        apply(&mut config, "work_dir", "/srv/rr").unwrap();
        apply(&mut config, "log_level", "INFO").unwrap();
        apply(&mut config, "log_file", "/var/log/rr.log").unwrap();

        assert_eq!(config.work_dir, PathBuf::from("/srv/rr"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_file, Some(PathBuf::from("/var/log/rr.log")));

        apply(&mut config, "log_file", "none").unwrap();
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();

        assert!(apply(&mut config, "log_level", "loud").is_err());
        assert!(apply(&mut config, "work_dir", "").is_err());
        assert!(apply(&mut config, "sync_url", "ws://x").is_err());
    }

    #[test]
    fn test_set_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        set(
            "log_level".to_string(),
            "debug".to_string(),
            Some(&path),
            &output,
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("log_level = \"debug\""));
    }
}
