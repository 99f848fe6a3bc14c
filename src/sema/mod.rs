//! Name resolution, type checking, and frame-slot assignment.
//!
//! Consumes the AST the parser produced and the struct/union layout engine
//! in `rtmc_types`, and produces an `Analysis` the bytecode generator walks
//! without needing to re-derive any of this.

mod analyzer;
mod optimize;
mod symbol;

pub use analyzer::{analyze, Analysis, FunctionInfo, GlobalInfo, MessageInfo};
pub use optimize::optimize_program;
pub(crate) use optimize::const_eval_int;
pub use symbol::{ScopeStack, Symbol, SymbolKind};
