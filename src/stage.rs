//! Pipeline stages under test.
//!
//! The declaration order of [`Stage`] is significant: reports are always
//! assembled in this order, independent of the order in which fixtures or
//! stage reports were produced.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::HarnessError;

/// One phase of the compiler pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[serde(alias = "lexer")]
    Lexical,
    #[serde(alias = "parser")]
    Syntactic,
    #[serde(alias = "sema")]
    Semantic,
    #[serde(alias = "code_gen")]
    CodeGen,
    #[serde(alias = "e2e")]
    Integration,
}

impl Stage {
    /// All stages in declaration (aggregation) order.
    pub const ALL: [Stage; 5] = [
        Stage::Lexical,
        Stage::Syntactic,
        Stage::Semantic,
        Stage::CodeGen,
        Stage::Integration,
    ];

    /// Position of this stage in [`Stage::ALL`].
    pub fn index(self) -> usize {
        match self {
            Stage::Lexical => 0,
            Stage::Syntactic => 1,
            Stage::Semantic => 2,
            Stage::CodeGen => 3,
            Stage::Integration => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Lexical => "lexical",
            Stage::Syntactic => "syntactic",
            Stage::Semantic => "semantic",
            Stage::CodeGen => "codegen",
            Stage::Integration => "integration",
        }
    }

    /// Section title used by the text reporter.
    pub fn title(self) -> &'static str {
        match self {
            Stage::Lexical => "Lexical Analysis",
            Stage::Syntactic => "Parser",
            Stage::Semantic => "Semantic Analysis",
            Stage::CodeGen => "Code Generation",
            Stage::Integration => "Integration Tests",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" | "lexer" => Ok(Stage::Lexical),
            "syntactic" | "parser" => Ok(Stage::Syntactic),
            "semantic" | "sema" => Ok(Stage::Semantic),
            "codegen" | "code_gen" => Ok(Stage::CodeGen),
            "integration" | "e2e" => Ok(Stage::Integration),
            _ => Err(HarnessError::UnknownStage(s.to_string())),
        }
    }
}
