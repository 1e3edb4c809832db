//! Instruction registry: an append-only mapping from instruction name to
//! handler and metadata.
//!
//! Registration happens during process initialization, before any
//! evaluation runs; after that the table is read-only and may be shared
//! across threads (wrap it in an `Arc`) without locking. There is no
//! deletion operation, and a name collision is a programming error
//! surfaced as [`Error::DuplicateInstruction`], never a runtime condition.

use std::collections::HashMap;
use std::sync::Arc;

use crate::Error;
use crate::state::PushState;

/// Identifies one stack of the machine state, for instruction metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackId {
    Exec,
    Code,
    Integer,
    Float,
    Boolean,
    Character,
    String,
    VectorInteger,
    VectorFloat,
    VectorBoolean,
    VectorString,
    Input,
    Output,
    Environment,
}

/// Canonical handler type: a pure transformation of the machine state.
///
/// Handlers receive the state with the instruction name already popped
/// from `exec`. All effects are expressed through the returned value.
pub type InstructionFn = Arc<dyn Fn(PushState) -> PushState + Send + Sync>;

/// Metadata attached to every instruction.
///
/// The interpreter itself never reads these fields; they are preserved
/// verbatim for the external program generator and mutation operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Stacks the instruction reads or pops from
    pub consumes: Vec<StackId>,
    /// Stacks the instruction pushes to
    pub produces: Vec<StackId>,
    /// Structural arity: how many fragment groups the instruction opens
    /// when a linear genome is translated to a tree
    pub parentheses: usize,
}

impl Metadata {
    pub fn new(consumes: Vec<StackId>, produces: Vec<StackId>, parentheses: usize) -> Self {
        Metadata {
            consumes,
            produces,
            parentheses,
        }
    }
}

/// One immutable registry entry.
#[derive(Clone)]
pub struct Instruction {
    pub name: String,
    pub func: InstructionFn,
    pub meta: Metadata,
}

impl std::fmt::Debug for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruction")
            .field("name", &self.name)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// The instruction table.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    entries: HashMap<String, Instruction>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Add an entry. Fails if the name is already registered.
    pub fn register(
        &mut self,
        name: &str,
        func: InstructionFn,
        meta: Metadata,
    ) -> Result<(), Error> {
        if self.entries.contains_key(name) {
            return Err(Error::DuplicateInstruction(name.to_owned()));
        }
        self.entries.insert(
            name.to_owned(),
            Instruction {
                name: name.to_owned(),
                func,
                meta,
            },
        );
        Ok(())
    }

    /// Pure, total lookup by exact name.
    pub fn lookup(&self, name: &str) -> Option<&Instruction> {
        self.entries.get(name)
    }

    /// All registered instructions, in no particular order. The program
    /// generator samples from this.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
