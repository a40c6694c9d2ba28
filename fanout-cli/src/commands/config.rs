use anyhow::{anyhow, bail, Context, Result};
use fanout_cluster::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Node configuration: shard-level settings at the top level, fan-out
/// settings under `[coordinator]`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub core: fanout::Config,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl CliConfig {
    /// Load from `path`, falling back to defaults when the file is missing
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.core.validate()?;
        self.coordinator
            .validate()
            .map_err(|e| anyhow!("coordinator: {}", e))?;
        Ok(())
    }
}

/// Write a default configuration file
pub fn run_init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            output.display()
        );
    }
    let content = toml::to_string_pretty(&CliConfig::default())?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, content).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote default configuration to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_then_load() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("fanout.toml");
        run_init_config(&path, false).unwrap();
        assert!(run_init_config(&path, false).is_err());

        let config = CliConfig::load_or_default(&path).unwrap();
        assert_eq!(config.coordinator.max_shards_per_request, 1000);
        assert_eq!(config.core.search.track_total_hits_up_to, 10_000);
        config.validate().unwrap();
    }

    #[test]
    fn test_coordinator_section() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("fanout.toml");
        fs::write(
            &path,
            r#"
[search]
track_total_hits_up_to = 100

[coordinator]
max_concurrent_shard_requests = 2

[[coordinator.remote_clusters]]
alias = "eu"
skip_unavailable = true
"#,
        )
        .unwrap();

        let config = CliConfig::load_or_default(&path).unwrap();
        assert_eq!(config.core.search.track_total_hits_up_to, 100);
        assert_eq!(config.coordinator.max_concurrent_shard_requests, 2);
        assert!(config.coordinator.remote("eu").unwrap().skip_unavailable);
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = tempdir().unwrap();
        let config = CliConfig::load_or_default(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.coordinator.default_pit_keep_alive_ms, 300_000);
    }
}
