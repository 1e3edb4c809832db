//! The machine state: one LIFO stack per semantic type, the bounded
//! `output` buffer, the `environment` stack of saved scope frames, and the
//! auxiliary `termination` and `trace` fields.
//!
//! States are threaded by value through the interpreter: each step
//! produces a new state and no in-place mutation is observable across
//! steps. The top of every stack is its last element; `push`, `pop`, and
//! `top` apply uniformly across all literal kinds through the
//! [`StackType`] accessor trait.

use std::collections::VecDeque;

use crate::DEFAULT_OUTPUT_LIMIT;
use crate::program::{FloatType, IntType, Item};
use crate::registry::StackId;

/// How an evaluation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    /// Evaluation has not finished (or never ran)
    #[default]
    Unset,
    /// `exec` and `environment` both drained
    Normal,
    /// A step-count or wall-clock budget was exhausted first
    Abnormal,
}

/// The full machine state of one evaluation.
///
/// `exec` is the control stack: its top drives the next dispatch. `code`
/// holds the same recursive element type as addressable data. One stack
/// exists per scalar literal kind and per homogeneous vector kind.
/// `input` holds the read-only bindings resolved by `in<N>` references.
/// `environment` holds saved states acting as scope frames, restored by
/// the step loop when `exec` drains.
#[derive(Debug, Clone, PartialEq)]
pub struct PushState {
    pub exec: Vec<Item>,
    pub code: Vec<Item>,
    pub integer: Vec<IntType>,
    pub float: Vec<FloatType>,
    pub boolean: Vec<bool>,
    pub character: Vec<char>,
    pub string: Vec<String>,
    pub vector_integer: Vec<Vec<IntType>>,
    pub vector_float: Vec<Vec<FloatType>>,
    pub vector_boolean: Vec<Vec<bool>>,
    pub vector_string: Vec<Vec<String>>,
    /// Read-only bindings for the current evaluation; `in1` reads the top
    pub input: Vec<Item>,
    /// Accumulating text buffer, bounded by `output_limit`
    pub output: String,
    /// Saved scope frames, LIFO
    pub environment: Vec<PushState>,
    pub termination: Termination,
    /// Executed-item log when tracing is enabled; most recent first
    pub trace: Option<VecDeque<Item>>,
    /// Ceiling on `output` length in bytes; seeded by the run wrapper and
    /// read-only during a run
    pub output_limit: usize,
}

impl Default for PushState {
    fn default() -> Self {
        PushState {
            exec: Vec::new(),
            code: Vec::new(),
            integer: Vec::new(),
            float: Vec::new(),
            boolean: Vec::new(),
            character: Vec::new(),
            string: Vec::new(),
            vector_integer: Vec::new(),
            vector_float: Vec::new(),
            vector_boolean: Vec::new(),
            vector_string: Vec::new(),
            input: Vec::new(),
            output: String::new(),
            environment: Vec::new(),
            termination: Termination::Unset,
            trace: None,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }
}

/// A literal kind with a dedicated stack in [`PushState`].
///
/// This is the single type-parameterized accessor the data model requires:
/// `state.push(1i64)` and `state.push(2.5f64)` address different stacks
/// through the same three generic methods.
pub trait StackType: Sized + Clone + PartialEq {
    /// The stack this kind lives on, for instruction metadata
    const ID: StackId;

    fn stack(state: &PushState) -> &Vec<Self>;
    fn stack_mut(state: &mut PushState) -> &mut Vec<Self>;
}

macro_rules! impl_stack_type {
    ($ty:ty, $field:ident, $id:expr) => {
        impl StackType for $ty {
            const ID: StackId = $id;

            fn stack(state: &PushState) -> &Vec<Self> {
                &state.$field
            }

            fn stack_mut(state: &mut PushState) -> &mut Vec<Self> {
                &mut state.$field
            }
        }
    };
}

impl_stack_type!(IntType, integer, StackId::Integer);
impl_stack_type!(FloatType, float, StackId::Float);
impl_stack_type!(bool, boolean, StackId::Boolean);
impl_stack_type!(char, character, StackId::Character);
impl_stack_type!(String, string, StackId::String);
impl_stack_type!(Vec<IntType>, vector_integer, StackId::VectorInteger);
impl_stack_type!(Vec<FloatType>, vector_float, StackId::VectorFloat);
impl_stack_type!(Vec<bool>, vector_boolean, StackId::VectorBoolean);
impl_stack_type!(Vec<String>, vector_string, StackId::VectorString);

impl PushState {
    pub fn new() -> Self {
        PushState::default()
    }

    /// A fresh state with the given input bindings. `in1` resolves to the
    /// last element of the vector (the top of the `input` stack).
    pub fn with_inputs<I: IntoIterator<Item = Item>>(inputs: I) -> Self {
        PushState {
            input: inputs.into_iter().collect(),
            ..PushState::default()
        }
    }

    pub fn push<T: StackType>(&mut self, value: T) {
        T::stack_mut(self).push(value);
    }

    pub fn pop<T: StackType>(&mut self) -> Option<T> {
        T::stack_mut(self).pop()
    }

    pub fn top<T: StackType>(&self) -> Option<&T> {
        T::stack(self).last()
    }

    pub fn depth<T: StackType>(&self) -> usize {
        T::stack(self).len()
    }

    /// Whether appending `text` would keep `output` within its ceiling.
    pub fn can_append(&self, text: &str) -> bool {
        self.output.len() + text.len() <= self.output_limit
    }

    /// Append text to the `output` buffer. An append that would exceed the
    /// ceiling is rejected whole: the buffer is left untouched (never
    /// truncated) and `false` is returned so the caller can keep its
    /// source item un-popped.
    pub fn append_output(&mut self, text: &str) -> bool {
        if !self.can_append(text) {
            return false;
        }
        self.output.push_str(text);
        true
    }
}

fn write_stack<T: std::fmt::Display>(
    f: &mut std::fmt::Formatter<'_>,
    label: &str,
    stack: &[T],
) -> std::fmt::Result {
    write!(f, "{label}: (")?;
    // Top of the stack first, matching the order dispatch consumes it
    for (i, v) in stack.iter().rev().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{v}")?;
    }
    writeln!(f, ")")
}

impl std::fmt::Display for PushState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_stack(f, "exec", &self.exec)?;
        write_stack(f, "code", &self.code)?;
        write_stack(f, "integer", &self.integer)?;
        write_stack(f, "float", &self.float)?;
        write_stack(f, "boolean", &self.boolean)?;
        write_stack(f, "character", &self.character)?;
        write_stack(f, "string", &self.string)?;
        writeln!(f, "vector_integer: {:?}", self.vector_integer)?;
        writeln!(f, "vector_float: {:?}", self.vector_float)?;
        writeln!(f, "vector_boolean: {:?}", self.vector_boolean)?;
        writeln!(f, "vector_string: {:?}", self.vector_string)?;
        write_stack(f, "input", &self.input)?;
        writeln!(f, "output: {:?}", self.output)?;
        writeln!(f, "environment: {} frame(s)", self.environment.len())?;
        write!(f, "termination: {:?}", self.termination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::lit;

    #[test]
    fn test_generic_stack_accessors() {
        let mut state = PushState::new();

        state.push(1i64);
        state.push(2i64);
        state.push(2.5f64);
        state.push(true);
        state.push('x');
        state.push("s".to_owned());
        state.push(vec![1i64, 2]);

        assert_eq!(state.depth::<i64>(), 2);
        assert_eq!(state.top::<i64>(), Some(&2));
        assert_eq!(state.pop::<i64>(), Some(2));
        assert_eq!(state.pop::<i64>(), Some(1));
        assert_eq!(state.pop::<i64>(), None);

        assert_eq!(state.pop::<f64>(), Some(2.5));
        assert_eq!(state.pop::<bool>(), Some(true));
        assert_eq!(state.pop::<char>(), Some('x'));
        assert_eq!(state.pop::<String>(), Some("s".to_owned()));
        assert_eq!(state.pop::<Vec<i64>>(), Some(vec![1, 2]));
    }

    #[test]
    fn test_stacks_are_lifo() {
        let mut state = PushState::new();
        for n in [1i64, 2, 3] {
            state.push(n);
        }
        assert_eq!(state.pop::<i64>(), Some(3));
        assert_eq!(state.pop::<i64>(), Some(2));
        assert_eq!(state.pop::<i64>(), Some(1));
    }

    #[test]
    fn test_output_append_within_limit() {
        let mut state = PushState::new();
        state.output_limit = 5;

        assert!(state.append_output("abc"));
        assert_eq!(state.output, "abc");
        // Exactly filling the buffer is allowed
        assert!(state.append_output("de"));
        assert_eq!(state.output, "abcde");
    }

    #[test]
    fn test_output_append_over_limit_rejected_whole() {
        let mut state = PushState::new();
        state.output_limit = 5;
        assert!(state.append_output("abc"));

        // Three more bytes would exceed the ceiling: the whole append is
        // rejected, nothing is truncated
        assert!(!state.append_output("xyz"));
        assert_eq!(state.output, "abc");
    }

    #[test]
    fn test_with_inputs_order() {
        let state = PushState::with_inputs([lit(1), lit(2)]);
        assert_eq!(state.input.last(), Some(&lit(2)));
    }
}
