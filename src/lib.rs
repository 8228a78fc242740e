//! Core library for the Lumen scripting language.
//! Implements lexing, parsing, tree-walking evaluation, and REPL utilities.

pub mod ast;
pub mod diagnostics;
pub mod environment;
pub mod host;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod stdlib;
pub mod value;

pub use diagnostics::{Diagnostic, DiagnosticKind, LumenError, SourceSpan};
pub use host::{BufferedHost, Host, StdHost};
pub use repl::Repl;
pub use runtime::{Completion, ExecutionContext, Interpreter};
pub use stdlib::BuiltinRegistry;
pub use value::Value;
