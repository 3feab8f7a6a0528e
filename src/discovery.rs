//! Fixture discovery from YAML files.
//!
//! A fixture file holds the fixtures of one stage:
//!
//! ```yaml
//! stage: semantic
//! fixtures:
//!   - name: Redeclaration Error
//!     input: "int x; int x;"
//!     expect_failure: true
//!     expected: "Variable 'x' already declared"
//! ```
//!
//! `expected` is decoded according to the stage: a token list (lexical), a
//! string (syntactic), an optional string (semantic), a predicate list
//! (codegen) or an integer (integration).

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{HarnessError, Result};
use crate::fixture::{CodePredicate, Expectation, Fixture, TokenDescriptor};
use crate::registry::FixtureRegistry;
use crate::stage::Stage;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FixtureFile {
    stage: Stage,
    #[serde(default)]
    fixtures: Vec<RawFixture>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFixture {
    name: String,
    input: String,
    #[serde(default)]
    expected: serde_yaml::Value,
    #[serde(default)]
    expect_failure: bool,
}

impl RawFixture {
    fn into_fixture(self, stage: Stage) -> Result<Fixture> {
        let expected = match stage {
            Stage::Lexical => Expectation::Tokens(decode::<Vec<TokenDescriptor>>(&self.name, self.expected)?),
            Stage::Syntactic => Expectation::Ast(decode::<String>(&self.name, self.expected)?),
            Stage::Semantic => Expectation::Diagnostic(decode::<Option<String>>(&self.name, self.expected)?),
            Stage::CodeGen => Expectation::Code(decode::<Vec<CodePredicate>>(&self.name, self.expected)?),
            Stage::Integration => Expectation::ExitCode(decode::<i64>(&self.name, self.expected)?),
        };
        Ok(Fixture::build(stage, self.name, self.input, expected, self.expect_failure))
    }
}

fn decode<T: DeserializeOwned>(name: &str, value: serde_yaml::Value) -> Result<T> {
    serde_yaml::from_value(value)
        .map_err(|e| HarnessError::invalid_fixture(name, format!("bad expected value: {}", e)))
}

fn is_fixture_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Recursively collects `.yaml`/`.yml` files under `root`.
///
/// The list is sorted so that registration order does not depend on the
/// file system.
pub fn discover_fixture_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_fixture_file(entry.path()) {
            continue;
        }
        files.push(entry.into_path());
    }
    files.sort();
    Ok(files)
}

/// Parses the fixtures of one file. `origin` only labels errors.
pub fn parse_fixture_file(origin: impl AsRef<Path>, content: &str) -> Result<Vec<Fixture>> {
    let file: FixtureFile = serde_yaml::from_str(content).map_err(|source| HarnessError::FixtureParse {
        path: origin.as_ref().to_path_buf(),
        source,
    })?;
    let stage = file.stage;
    file.fixtures
        .into_iter()
        .map(|raw| raw.into_fixture(stage))
        .collect()
}

pub fn load_fixture_file(path: impl AsRef<Path>) -> Result<Vec<Fixture>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_fixture_file(path, &content)
}

/// Builds a registry from every fixture file under `root`.
///
/// Files are registered in sorted path order, fixtures in file order. A
/// name reused within a stage, even across files, is an error.
pub fn load_registry(root: impl AsRef<Path>) -> Result<FixtureRegistry> {
    let mut registry = FixtureRegistry::new();
    for path in discover_fixture_files(root)? {
        let fixtures = load_fixture_file(&path)?;
        debug!(path = %path.display(), count = fixtures.len(), "loaded fixture file");
        registry.register_all(fixtures)?;
    }
    Ok(registry)
}
