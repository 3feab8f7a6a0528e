//! Harness configuration.
//!
//! Loaded from a YAML file; every field is optional and falls back to
//! [`HarnessConfig::default`]:
//!
//! ```yaml
//! fixture_root: fixtures
//! timeout_ms: 5000
//! workers: 4
//! use_colors: false
//! commands:
//!   lexical:     { program: ./kcc, args: [--emit-tokens] }
//!   integration: { program: ./kcc-run }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterSet, CommandAdapter};
use crate::errors::{HarnessError, Result};
use crate::runner::RunOptions;
use crate::stage::Stage;

/// An external compiler invocation for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Per-stage compiler commands; absent stages run without an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageCommands {
    pub lexical: Option<CommandSpec>,
    pub syntactic: Option<CommandSpec>,
    pub semantic: Option<CommandSpec>,
    pub codegen: Option<CommandSpec>,
    pub integration: Option<CommandSpec>,
}

impl StageCommands {
    pub fn get(&self, stage: Stage) -> Option<&CommandSpec> {
        match stage {
            Stage::Lexical => self.lexical.as_ref(),
            Stage::Syntactic => self.syntactic.as_ref(),
            Stage::Semantic => self.semantic.as_ref(),
            Stage::CodeGen => self.codegen.as_ref(),
            Stage::Integration => self.integration.as_ref(),
        }
    }
}

/// Configuration for fixture loading, execution and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    pub timeout_ms: u64,
    pub workers: usize,
    pub use_colors: bool,
    pub commands: StageCommands,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            fixture_root: PathBuf::from("fixtures"),
            timeout_ms: 5000,
            workers: 1,
            use_colors: atty::is(atty::Stream::Stdout),
            commands: StageCommands::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| HarnessError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(HarnessError::Config("timeout_ms must be greater than zero".into()));
        }
        if self.workers == 0 {
            return Err(HarnessError::Config("workers must be at least 1".into()));
        }
        for stage in Stage::ALL {
            if let Some(spec) = self.commands.get(stage) {
                if spec.program.as_os_str().is_empty() {
                    return Err(HarnessError::Config(format!("empty program for the {} stage", stage)));
                }
            }
        }
        Ok(())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            workers: self.workers,
        }
    }

    /// One [`CommandAdapter`] per configured stage.
    pub fn adapters(&self) -> AdapterSet {
        Stage::ALL
            .into_iter()
            .filter_map(|stage| self.commands.get(stage).map(|spec| (stage, spec)))
            .fold(AdapterSet::new(), |set, (stage, spec)| {
                set.with(stage, CommandAdapter::new(stage, &spec.program).args(spec.args.iter().cloned()))
            })
    }
}
