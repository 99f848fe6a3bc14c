use std::fmt;

use thiserror::Error;

use crate::ast::Pos;
use rtmc_image::ImageError;
use rtmc_types::LayoutError;

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors raised while resolving `#include`/`#define` directives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("{0}:{1}: include target not found: {2}")]
    IncludeNotFound(String, u32, String),
    #[error("{0}:{1}: macro `{2}` expands back into itself")]
    CyclicMacro(String, u32, String),
    #[error("{0}:{1}: malformed preprocessor directive: {2}")]
    MalformedDirective(String, u32, String),
}

/// Errors raised while scanning source text into tokens.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("{0}: unterminated string or character literal")]
    UnterminatedLiteral(Pos),
    #[error("{0}: malformed numeric literal `{1}`")]
    BadNumber(Pos, String),
    #[error("{0}: unexpected character `{1}`")]
    BadChar(Pos, char),
}

/// Errors raised while building the AST from a token stream.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("{pos}: expected {expected}, found {found}")]
    UnexpectedToken {
        pos: Pos,
        expected: String,
        found: String,
    },
}

/// Errors raised during name resolution, type checking, and layout
/// computation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SemaError {
    #[error("{0}: undefined symbol `{1}`")]
    UndefinedSymbol(Pos, String),
    #[error("{0}: `{1}` is already defined in this scope")]
    DuplicateDefinition(Pos, String),
    #[error("{pos}: type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        pos: Pos,
        expected: String,
        found: String,
    },
    #[error("{0}: left-hand side of assignment is not an lvalue")]
    NonLValueAssignment(Pos),
    #[error("{0}: cannot assign to const symbol `{1}`")]
    ConstAssignment(Pos, String),
    #[error("{0}: no field `{1}` on this type")]
    FieldNotFound(Pos, String),
    #[error("{pos}: expected {expected} argument(s), found {found}")]
    ArityMismatch { pos: Pos, expected: usize, found: usize },
    #[error("{0}: array size must be a compile-time constant")]
    ArraySizeNotConstant(Pos),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Errors raised while emitting bytecode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("{0}: branch offset exceeds the representable range")]
    BranchTooFar(Pos),
}

/// The unified error type returned by the compiler driver. Each pass's
/// error type converts into this one with `#[from]`, the way
/// `fuel-vm::error::InterpreterError` wraps a narrower validation error
/// from the layer below it.
#[derive(Debug, Error, Clone)]
pub enum CompileError {
    #[error("{0}")]
    Io(String),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Sema(#[from] SemaError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Image(#[from] ImageError),
}

impl CompileError {
    /// Maps this error onto the process exit code the CLI surface
    /// promises: 1 preprocessor, 2 lex, 3 parse, 4 semantic, 5 codegen,
    /// 6 I/O.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Preprocess(_) => 1,
            CompileError::Lex(_) => 2,
            CompileError::Parse(_) => 3,
            CompileError::Sema(_) => 4,
            CompileError::Codegen(_) => 5,
            CompileError::Io(_) | CompileError::Image(_) => 6,
        }
    }
}
