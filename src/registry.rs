//! Fixture registry.
//!
//! Fixtures are grouped by [`Stage`] and kept in registration order. Names
//! are unique within a stage; the same name may appear in different stages.
//!
//! # Lifecycle
//!
//! A registry is built once at start-up and is read-only afterwards. A
//! process-wide instance can be installed with [`init`], read with
//! [`global`] and cleared with [`reset`]. Runs always take an explicit
//! `&FixtureRegistry`, so the global is a convenience for binaries and never
//! a hidden dependency of the runner.
//!
//! | Method         | Duplicate name    | Invalid fixture  | Registry on error |
//! |----------------|-------------------|------------------|-------------------|
//! | `register`     | `DuplicateFixture`| `InvalidFixture` | unchanged         |
//! | `register_all` | `DuplicateFixture`| `InvalidFixture` | earlier entries kept |

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::errors::{HarnessError, Result};
use crate::fixture::Fixture;
use crate::stage::Stage;

/// Fixtures partitioned by stage, each partition in registration order.
#[derive(Debug, Clone, Default)]
pub struct FixtureRegistry {
    stages: [Vec<Arc<Fixture>>; 5],
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and appends `fixture` to its stage.
    pub fn register(&mut self, fixture: Fixture) -> Result<()> {
        fixture.validate()?;
        let bucket = &mut self.stages[fixture.stage.index()];
        if bucket.iter().any(|existing| existing.name == fixture.name) {
            return Err(HarnessError::DuplicateFixture {
                stage: fixture.stage,
                name: fixture.name,
            });
        }
        debug!(stage = %fixture.stage, name = %fixture.name, "registered fixture");
        bucket.push(Arc::new(fixture));
        Ok(())
    }

    /// Registers fixtures in order, stopping at the first error.
    pub fn register_all(&mut self, fixtures: impl IntoIterator<Item = Fixture>) -> Result<()> {
        fixtures.into_iter().try_for_each(|fixture| self.register(fixture))
    }

    /// Fixtures of `stage` in registration order. The iterator is cheap to
    /// clone, so it can be restarted.
    pub fn all_fixtures(&self, stage: Stage) -> impl Iterator<Item = &Arc<Fixture>> + Clone + '_ {
        self.stages[stage.index()].iter()
    }

    pub fn get(&self, stage: Stage, name: &str) -> Option<&Arc<Fixture>> {
        self.all_fixtures(stage).find(|fixture| fixture.name == name)
    }

    pub fn count(&self, stage: Stage) -> usize {
        self.stages[stage.index()].len()
    }

    /// Total number of fixtures across all stages.
    pub fn len(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// PROCESS-WIDE REGISTRY
// =============================================================================

static GLOBAL: Lazy<RwLock<Option<Arc<FixtureRegistry>>>> = Lazy::new(|| RwLock::new(None));

/// Installs the process-wide registry. Fails if one is already installed.
pub fn init(registry: FixtureRegistry) -> Result<Arc<FixtureRegistry>> {
    let mut slot = GLOBAL.write();
    if slot.is_some() {
        return Err(HarnessError::RegistryInitialized);
    }
    let registry = Arc::new(registry);
    *slot = Some(Arc::clone(&registry));
    Ok(registry)
}

/// The process-wide registry, if one was installed.
pub fn global() -> Option<Arc<FixtureRegistry>> {
    GLOBAL.read().clone()
}

/// Removes the process-wide registry. Snapshots already handed out stay valid.
pub fn reset() {
    GLOBAL.write().take();
}
