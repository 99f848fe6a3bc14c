//! A six-pass compiler for RT-Micro-C, an embedded real-time C dialect:
//! preprocessor, lexer, parser, semantic analyzer, bytecode generator, and
//! a binary image serializer. The produced `.vmb` file is consumed by a
//! separate virtual machine, out of scope for this crate.

pub mod ast;
pub mod codegen;
pub mod driver;
pub mod error;
pub mod lex;
pub mod parse;
pub mod preprocess;
pub mod sema;
pub mod token;

pub mod prelude {
    pub use crate::ast::{Decl, Expr, Program, Stmt};
    pub use crate::driver::{compile, CompileOutput, CompilerConfig};
    pub use crate::error::CompileError;
    pub use crate::sema::Analysis;
    pub use rtmc_image::{Mode, ProgramImage};
}
