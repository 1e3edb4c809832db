//! PushXP - Push-style genome interpreter
//!
//! This crate is the execution engine of a stack-based, homoiconic
//! programming language used as the genome representation of an
//! evolutionary program-synthesis framework. A program is a tree of
//! instruction names, literals, and nested fragments; the interpreter
//! evaluates it against a set of typed stacks and reports a final state
//! plus a termination verdict.
//!
//! Programs are machine-generated, frequently malformed, and sometimes
//! non-terminating, so every evaluation runs under strict budgets:
//!
//! ```text
//! ( 2 3 integer_add print_integer )   ; pushes 5, prints "5"
//! ( true exec_if ( 1 ) ( 2 ) )        ; conditional over exec fragments
//! ( [] )                              ; empty vector: ambiguous, fills all
//!                                     ;   four vector stacks
//! ```
//!
//! ## Evaluation model
//!
//! The `exec` stack drives control flow: each step pops one element and
//! either splices it (nested fragments), pushes it (literals), or invokes
//! its registered handler (instruction names). Draining `exec` with no
//! pending environment frames is normal termination; exhausting the step
//! or wall-clock budget is abnormal termination. An unknown name is a
//! fatal [`Error::UndefinedInstruction`] that the fitness harness catches
//! and penalizes.
//!
//! ## Modules
//!
//! - `program`: the homoiconic program element type
//! - `state`: the machine state record of typed stacks
//! - `registry`: the instruction registry and its lookup contract
//! - `interpreter`: dispatch engine, step loop, and run wrapper
//! - `instructions`: the standard instruction library
//! - `parser`: textual program notation (feature `text`)
//! - `genome`: JSON genome interchange (feature `json`)

use std::fmt;

/// Maximum parsing depth to prevent stack overflow on adversarial input.
/// Limits nesting of program fragments in the parser.
pub const MAX_PARSE_DEPTH: usize = 64;

/// Default step-count ceiling for one evaluation.
pub const DEFAULT_STEP_LIMIT: u64 = 150;

/// Default ceiling on the length of the `output` buffer, in bytes.
pub const DEFAULT_OUTPUT_LIMIT: usize = 1000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed literals)
    InvalidSyntax,
    /// Input ended before the program was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Program nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid program
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
}

impl ParseError {
    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // Show some context before the error position as well
        let context_start = error_offset.saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        // Replace newlines with visible markers for better error display
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        ParseError {
            kind,
            message: message.into(),
            context: Some(display_context),
        }
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A name absent from the registry that also fails the input-binding
    /// pattern and both external predicates, or an `in<N>` reference beyond
    /// the bound input count. Fatal to the evaluation, not the host process:
    /// the offending element is carried so the fitness harness can inspect
    /// it and assign a penalty outcome.
    UndefinedInstruction(Item),
    /// Registration conflict: the name is already present in the registry.
    /// A programming error at initialization time, never a runtime condition.
    DuplicateInstruction(String),
    ParseError(ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UndefinedInstruction(item) => {
                write!(f, "Undefined instruction: {item}")
            }
            Error::DuplicateInstruction(name) => {
                write!(f, "Instruction already registered: {name}")
            }
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}

pub mod instructions;
pub mod interpreter;
pub mod program;
pub mod registry;
pub mod state;

#[cfg(feature = "json")]
pub mod genome;

#[cfg(feature = "text")]
pub mod parser;

pub use interpreter::{EvalConfig, Evaluation, Interpreter, TraceMode};
pub use program::{Item, VectorLiteral};
pub use registry::{Instruction, InstructionFn, Metadata, Registry, StackId};
pub use state::{PushState, StackType, Termination};
