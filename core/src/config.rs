use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_INPUT: &str = "Python/bytecodes.json";
pub const DEFAULT_OUTPUT: &str = "Python/generated_cases.c.h";

/// Everything one generator run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub input_paths: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub emit_positions: bool,
    pub jobs: usize,
    pub strict_families: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            input_paths: vec![PathBuf::from(DEFAULT_INPUT)],
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            emit_positions: false,
            jobs: 1,
            strict_families: false,
        }
    }
}

/// Contents of a `casegen.toml`. Every key is optional; missing keys keep
/// whatever the config already holds.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub input_paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub emit_positions: Option<bool>,
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub strict_families: Option<bool>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Relative paths in the file are taken relative to `base`.
    pub fn apply(self, config: &mut GeneratorConfig, base: Option<&Path>) {
        let rebase = |path: PathBuf| match base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        };
        if let Some(inputs) = self.input_paths.filter(|v| !v.is_empty()) {
            config.input_paths = inputs.into_iter().map(rebase).collect();
        }
        if let Some(output) = self.output_path {
            config.output_path = rebase(output);
        }
        if let Some(v) = self.emit_positions {
            config.emit_positions = v;
        }
        if let Some(v) = self.jobs.filter(|v| *v > 0) {
            config.jobs = v;
        }
        if let Some(v) = self.strict_families {
            config.strict_families = v;
        }
    }
}

impl GeneratorConfig {
    /// Defaults overlaid with the given config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        ConfigFile::load(path)?.apply(&mut config, path.parent());
        Ok(config)
    }
}
