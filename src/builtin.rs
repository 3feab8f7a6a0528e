//! The built-in Kayte C compiler suite.
//!
//! Five sections, one per stage, embedded from `fixtures/` at build time.

use crate::discovery::parse_fixture_file;
use crate::errors::Result;
use crate::registry::FixtureRegistry;

const SOURCES: [(&str, &str); 5] = [
    ("fixtures/lexical.yaml", include_str!("../fixtures/lexical.yaml")),
    ("fixtures/syntactic.yaml", include_str!("../fixtures/syntactic.yaml")),
    ("fixtures/semantic.yaml", include_str!("../fixtures/semantic.yaml")),
    ("fixtures/codegen.yaml", include_str!("../fixtures/codegen.yaml")),
    ("fixtures/integration.yaml", include_str!("../fixtures/integration.yaml")),
];

/// Builds a fresh registry holding the Kayte suite.
pub fn kayte_registry() -> Result<FixtureRegistry> {
    let mut registry = FixtureRegistry::new();
    for (origin, content) in SOURCES {
        registry.register_all(parse_fixture_file(origin, content)?)?;
    }
    Ok(registry)
}
