//! # Toy Compiler
//!
//! A small in-process stand-in for the Kayte compiler used by the
//! integration tests. The lexer is real; the later stages answer from
//! lookup tables keyed by source text, which is all the harness needs.

#![allow(dead_code)]

use std::collections::HashMap;

use kcc_conformance::prelude::*;

// =============================================================================
// LEXER
// =============================================================================

pub fn lex(source: &str) -> Vec<TokenDescriptor> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && next == Some('*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            tokens.push(TokenDescriptor::with_literal("NUMBER", literal));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "int" | "void" | "return" | "if" | "else" | "while" => {
                    TokenDescriptor::new(word.to_ascii_uppercase())
                }
                _ => TokenDescriptor::with_literal("IDENTIFIER", word),
            });
        } else {
            let (kind, width) = match (c, next) {
                ('=', Some('=')) => ("EQ", 2),
                ('!', Some('=')) => ("NEQ", 2),
                ('<', Some('=')) => ("LEQ", 2),
                ('>', Some('=')) => ("GEQ", 2),
                ('+', _) => ("PLUS", 1),
                ('-', _) => ("MINUS", 1),
                ('*', _) => ("STAR", 1),
                ('/', _) => ("SLASH", 1),
                ('=', _) => ("ASSIGN", 1),
                ('<', _) => ("LT", 1),
                ('>', _) => ("GT", 1),
                ('(', _) => ("LPAREN", 1),
                (')', _) => ("RPAREN", 1),
                ('{', _) => ("LBRACE", 1),
                ('}', _) => ("RBRACE", 1),
                (';', _) => ("SEMICOLON", 1),
                (',', _) => ("COMMA", 1),
                _ => ("UNKNOWN", 1),
            };
            tokens.push(TokenDescriptor::new(kind));
            i += width;
        }
    }
    tokens
}

// =============================================================================
// LATER STAGES
// =============================================================================

fn parse_table() -> HashMap<&'static str, &'static str> {
    // Deliberately formatted differently from the fixture files.
    HashMap::from([
        ("int main() { return 0; }", "FunctionDecl( int,main,[ ],Block( [Return(0)] ) )"),
        ("int x; int y = 10;", "VarDecl(int,x),  VarDecl(int,y,10)"),
        ("if (x > 0) { return 1; }", "If(BinOp(x,>,0),Block([Return(1)]))"),
        (
            "while (i < 10) { i = i + 1; }",
            "While(BinOp(i, <, 10),\n  Block([Assign(i, BinOp(i, +, 1))]))",
        ),
        (
            "x = a + b * c - d / e;",
            "Assign(x, BinOp(-, BinOp(+, a, BinOp(*, b, c)), BinOp(/, d, e)))",
        ),
        ("return 0;", "Return(0)"),
    ])
}

fn semantic_table() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("int main() { x = 5; }", "error: Variable 'x' used before declaration"),
        ("int x = 5; void y = x;", "error: cannot assign int to void"),
        ("int foo() { return; }", "error: Function 'foo' must return a value"),
        ("int x; int x;", "error: Variable 'x' already declared"),
    ])
}

fn codegen_table() -> HashMap<&'static str, CodeDescription> {
    HashMap::from([
        (
            "int main() { return 42; }",
            CodeDescription {
                return_literals: vec![42],
                instruction_count: 3,
                ..CodeDescription::default()
            },
        ),
        (
            "int main() { return 2 + 3 * 4; }",
            CodeDescription {
                return_literals: vec![14],
                instruction_count: 3,
                ..CodeDescription::default()
            },
        ),
        (
            "int main() { int x = 10; return x; }",
            CodeDescription {
                stack_slots: 1,
                instruction_count: 6,
                ..CodeDescription::default()
            },
        ),
        (
            "int main() { if (1) return 1; else return 0; }",
            CodeDescription {
                return_literals: vec![1, 0],
                conditional_branches: 1,
                instruction_count: 9,
                ..CodeDescription::default()
            },
        ),
    ])
}

/// Return value of the program, keyed by a distinctive call in `main`.
fn execute(source: &str) -> ExecutionOutcome {
    let table = [
        ("return fib(10);", 55),
        ("return result;", 120),
        ("return gcd(48, 18);", 6),
        ("return 6*7;", 42),
        ("return 42;", 42),
    ];
    table
        .iter()
        .find(|(needle, _)| source.contains(needle))
        .map(|(_, value)| ExecutionOutcome::returned(*value))
        .unwrap_or_else(|| ExecutionOutcome::returned(0))
}

// =============================================================================
// ADAPTERS
// =============================================================================

pub fn lexer() -> FnAdapter<impl Fn(&str) -> StageResult + Send + Sync> {
    FnAdapter::new(Stage::Lexical, |input: &str| StageResult::Tokens(lex(input))).reentrant()
}

pub fn parser() -> FnAdapter<impl Fn(&str) -> StageResult + Send + Sync> {
    let table = parse_table();
    FnAdapter::new(Stage::Syntactic, move |input: &str| match table.get(input) {
        Some(ast) => StageResult::Ast((*ast).to_string()),
        None => StageResult::diagnostic(format!("unexpected input '{}'", input)),
    })
    .reentrant()
}

pub fn analyzer() -> FnAdapter<impl Fn(&str) -> StageResult + Send + Sync> {
    let table = semantic_table();
    FnAdapter::new(Stage::Semantic, move |input: &str| {
        StageResult::Diagnostic(table.get(input).map(|d| (*d).to_string()))
    })
    .reentrant()
}

pub fn codegen() -> FnAdapter<impl Fn(&str) -> StageResult + Send + Sync> {
    let table = codegen_table();
    FnAdapter::new(Stage::CodeGen, move |input: &str| match table.get(input) {
        Some(code) => StageResult::Code(code.clone()),
        None => StageResult::diagnostic("unsupported construct"),
    })
    .reentrant()
}

pub fn runtime() -> FnAdapter<impl Fn(&str) -> StageResult + Send + Sync> {
    FnAdapter::new(Stage::Integration, |input: &str| StageResult::Execution(execute(input))).reentrant()
}

/// A complete toy pipeline that passes the built-in Kayte suite.
pub fn toy_adapters() -> AdapterSet {
    AdapterSet::new()
        .with(Stage::Lexical, lexer())
        .with(Stage::Syntactic, parser())
        .with(Stage::Semantic, analyzer())
        .with(Stage::CodeGen, codegen())
        .with(Stage::Integration, runtime())
}

pub fn registry_of(fixtures: Vec<Fixture>) -> FixtureRegistry {
    let mut registry = FixtureRegistry::new();
    registry.register_all(fixtures).expect("valid fixtures");
    registry
}

pub fn tokens(text: &str) -> Vec<TokenDescriptor> {
    text.split_whitespace()
        .map(|t| t.parse().expect("valid token"))
        .collect()
}
