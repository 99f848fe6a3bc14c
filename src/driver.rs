//! Ties the passes together: preprocess, lex, parse, analyze, optionally
//! optimize, generate, serialize. Each stage is its own `tracing` span so
//! `--verbose` shows where time and line numbers actually went.

use std::path::{Path, PathBuf};

use tracing::info_span;

use rtmc_image::{Mode, ProgramImage};

use crate::ast::Program;
use crate::codegen;
use crate::error::CompileError;
use crate::lex::Lexer;
use crate::parse::Parser;
use crate::preprocess::Preprocessor;
use crate::sema::{self, Analysis};
use crate::token::Token;

/// Compiler invocation options, independent of how the CLI parsed them.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: Mode,
    pub optimize: bool,
    pub include_paths: Vec<PathBuf>,
    pub dump_tokens: bool,
    pub dump_ast: bool,
}

impl CompilerConfig {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            mode: Mode::Release,
            optimize: false,
            include_paths: env_include_paths(),
            dump_tokens: false,
            dump_ast: false,
        }
    }
}

fn env_include_paths() -> Vec<PathBuf> {
    std::env::var_os("RTMC_INCLUDE_PATH")
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_default()
}

/// The fully compiled result: the serialized image bytes plus the
/// intermediate artifacts a `--dump-*` flag might want to print.
pub struct CompileOutput {
    pub bytes: Vec<u8>,
    pub tokens: Option<Vec<Token>>,
    pub ast: Option<Program>,
}

pub fn compile(config: &CompilerConfig) -> Result<CompileOutput, CompileError> {
    let source = {
        let _span = info_span!("preprocess", path = %config.input.display()).entered();
        let mut pp = Preprocessor::new(config.include_paths.clone());
        pp.run(&config.input)?
    };

    let tokens = {
        let _span = info_span!("lex").entered();
        Lexer::new(&source).tokenize()?
    };
    let dumped_tokens = config.dump_tokens.then(|| tokens.clone());

    let program = {
        let _span = info_span!("parse").entered();
        Parser::new(tokens).parse_program()?
    };
    let program = if config.optimize {
        sema::optimize_program(program)
    } else {
        program
    };
    let dumped_ast = config.dump_ast.then(|| program.clone());

    let analysis: Analysis = {
        let _span = info_span!("analyze").entered();
        sema::analyze(&program)?
    };

    let image: ProgramImage = {
        let _span = info_span!("codegen").entered();
        codegen::generate(&analysis, config.mode)?
    };

    let bytes = {
        let _span = info_span!("serialize").entered();
        image.serialize(config.mode)?
    };

    Ok(CompileOutput { bytes, tokens: dumped_tokens, ast: dumped_ast })
}

pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), CompileError> {
    std::fs::write(path, bytes).map_err(|e| CompileError::Io(e.to_string()))
}
