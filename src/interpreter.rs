//! Core evaluation engine: the dispatch engine ("execute one thing"), the
//! step loop driving repeated dispatch over the `exec` stack under step
//! and wall-clock budgets, and the run wrapper that seeds and strips the
//! program on the stacks.
//!
//! ## Dispatch precedence
//!
//! The cases of [`Interpreter::execute_item`] are not mutually exclusive
//! in general (a name can match the registry, the `in<N>` pattern, and the
//! tag predicate at once), so their order is part of the contract:
//!
//! 1. scalar literals push onto their matching stack
//! 2. vector literals push onto the matching vector stack; the empty
//!    vector is ambiguous and pushes onto all four
//! 3. names found in the registry invoke their handler
//! 4. unregistered names matching `in<N>` resolve through the input
//!    bindings and re-dispatch the stored value
//! 5. the external tag-instruction predicate, then
//! 6. the external tagged-code-macro predicate, get a chance to claim
//!    what is left
//! 7. anything else is a fatal [`Error::UndefinedInstruction`]
//!
//! ## Budgets
//!
//! Budgets are read once at evaluation start. Exhausting the step count or
//! the deadline is a normal control path reported as
//! [`Termination::Abnormal`]; an undefined instruction propagates as an
//! error and no partial state is returned. The deadline is checked once
//! per iteration, so a handler that blocks can overrun it; handlers are
//! assumed to return promptly.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::program::{FloatType, IntType, Item, VectorLiteral};
use crate::registry::Registry;
use crate::state::{PushState, Termination};
use crate::{DEFAULT_OUTPUT_LIMIT, DEFAULT_STEP_LIMIT, Error};

/// What the per-evaluation trace log captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub enum TraceMode {
    /// No capture
    #[default]
    Off,
    /// Every executed element, including no-ops and spliced fragments
    Full,
    /// Only elements whose dispatch changed the state; splices and
    /// environment restorations are not separately traced
    ChangesOnly,
}

/// Run-time configuration, read-only during a run. With the `json`
/// feature the host can load it from a JSON document; absent fields keep
/// their defaults.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "json",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct EvalConfig {
    /// Step-count ceiling (dispatch and restore iterations)
    pub step_limit: u64,
    /// Wall-clock ceiling; `Duration::ZERO` means unbounded
    pub time_limit: Duration,
    /// Ceiling on the `output` buffer length, seeded into the state by the
    /// run wrapper
    pub output_limit: usize,
    /// Also stage the program on the `code` stack before execution
    pub push_code: bool,
    /// Pop the top of `code` when the run ends
    pub pop_code: bool,
    pub trace: TraceMode,
    /// Retain the full state sequence of the run in [`Evaluation::states`]
    pub record_states: bool,
    /// Emit each intermediate state as a `debug!` event
    pub print_steps: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            step_limit: DEFAULT_STEP_LIMIT,
            time_limit: Duration::ZERO,
            output_limit: DEFAULT_OUTPUT_LIMIT,
            push_code: false,
            pop_code: false,
            trace: TraceMode::Off,
            record_states: false,
            print_steps: false,
        }
    }
}

/// Boundary to the external tag-memory subsystem (associative storage and
/// retrieval of code by integer tag). Invoked only after registry lookup
/// and input-binding resolution have declined a name.
pub trait TagHandler {
    /// Whether this name belongs to the tag-instruction family
    fn is_tag_instruction(&self, name: &str) -> bool;
    /// Execute a recognized tag instruction
    fn handle(&self, name: &str, state: PushState) -> PushState;
}

/// Boundary to the external tagged-code-macro subsystem (code templating).
/// Last chance to claim a value before it is ruled undefined.
pub trait MacroHandler {
    /// Whether this value is a macro form
    fn is_macro(&self, item: &Item) -> bool;
    /// Expand and execute a recognized macro form
    fn handle(&self, item: &Item, state: PushState) -> PushState;
}

/// The result of one evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Final machine state; `termination` and `output` are the externally
    /// meaningful results
    pub state: PushState,
    /// Iterations the step loop performed (dispatches and restores)
    pub steps: u64,
    /// Full state sequence, oldest first; empty unless
    /// [`EvalConfig::record_states`] is set
    pub states: Vec<PushState>,
}

/// The interpreter: registry, configuration, external handler boundaries,
/// and the aggregate dispatch counter.
///
/// One `Interpreter` value can serve many evaluations; evaluations are
/// independent and the value is `Sync` when its handlers are, so a host
/// may share it across worker threads. Per-run artifacts (trace, state
/// log) are never shared between runs.
pub struct Interpreter {
    registry: Arc<Registry>,
    config: EvalConfig,
    tag_handler: Option<Box<dyn TagHandler + Send + Sync>>,
    macro_handler: Option<Box<dyn MacroHandler + Send + Sync>>,
    /// Total successful dispatches across all evaluations; aggregate
    /// accounting only, no effect on control flow
    dispatched: AtomicU64,
}

/// Parse the `in<N>` input-binding pattern: "in" followed by a positive
/// decimal integer. Returns the 1-based index from the bound end.
fn parse_input_ref(name: &str) -> Option<usize> {
    let digits = name.strip_prefix("in")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}

/// Push a vector literal onto its matching stack. The empty vector has no
/// element kind to inspect, so it populates every vector stack.
fn push_vector(literal: &VectorLiteral, mut state: PushState) -> PushState {
    if literal.is_empty() {
        state.push(Vec::<IntType>::new());
        state.push(Vec::<FloatType>::new());
        state.push(Vec::<bool>::new());
        state.push(Vec::<String>::new());
        return state;
    }
    match literal {
        VectorLiteral::Empty => {}
        VectorLiteral::Ints(v) => state.push(v.clone()),
        VectorLiteral::Floats(v) => state.push(v.clone()),
        VectorLiteral::Bools(v) => state.push(v.clone()),
        VectorLiteral::Strs(v) => state.push(v.clone()),
    }
    state
}

/// Pop the top environment frame and resume it. Restoration is plain value
/// substitution; the externally consumed accumulators of the inner scope
/// carry forward.
pub(crate) fn end_environment(mut state: PushState) -> PushState {
    let Some(mut frame) = state.environment.pop() else {
        return state;
    };
    frame.output = state.output;
    frame.trace = state.trace;
    frame
}

fn trace_push(state: &mut PushState, item: Item) {
    if let Some(log) = &mut state.trace {
        // Most recent first
        log.push_front(item);
    }
}

impl Interpreter {
    pub fn new(registry: Registry) -> Self {
        Interpreter::with_shared_registry(Arc::new(registry))
    }

    /// Build on an already shared registry, for hosts that run many
    /// interpreter values against one instruction table.
    pub fn with_shared_registry(registry: Arc<Registry>) -> Self {
        Interpreter {
            registry,
            config: EvalConfig::default(),
            tag_handler: None,
            macro_handler: None,
            dispatched: AtomicU64::new(0),
        }
    }

    /// An interpreter over the standard instruction library.
    pub fn standard() -> Self {
        Interpreter::new(crate::instructions::standard_registry())
    }

    pub fn with_config(mut self, config: EvalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_tag_handler<H: TagHandler + Send + Sync + 'static>(mut self, handler: H) -> Self {
        self.tag_handler = Some(Box::new(handler));
        self
    }

    pub fn with_macro_handler<H: MacroHandler + Send + Sync + 'static>(
        mut self,
        handler: H,
    ) -> Self {
        self.macro_handler = Some(Box::new(handler));
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Total successful dispatches across all evaluations so far.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Execute one element against the state and return the new state.
    ///
    /// The element has already been popped from `exec`; all effects are
    /// expressed through the returned value. See the module docs for the
    /// case precedence.
    pub fn execute_item(&self, item: &Item, state: PushState) -> Result<PushState, Error> {
        let result = self.dispatch(item, state);
        if result.is_ok() {
            self.dispatched.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn dispatch(&self, item: &Item, mut state: PushState) -> Result<PushState, Error> {
        match item {
            Item::Bool(b) => {
                state.push(*b);
                Ok(state)
            }
            Item::Int(n) => {
                state.push(*n);
                Ok(state)
            }
            Item::Float(x) => {
                state.push(*x);
                Ok(state)
            }
            Item::Char(c) => {
                state.push(*c);
                Ok(state)
            }
            Item::Str(s) => {
                state.push(s.clone());
                Ok(state)
            }
            Item::Vector(v) => Ok(push_vector(v, state)),
            Item::Name(n) => {
                if let Some(instruction) = self.registry.lookup(n) {
                    return Ok((instruction.func)(state));
                }
                if let Some(index) = parse_input_ref(n) {
                    return self.execute_input_ref(item, index, state);
                }
                if let Some(tags) = &self.tag_handler
                    && tags.is_tag_instruction(n)
                {
                    return Ok(tags.handle(n, state));
                }
                if let Some(macros) = &self.macro_handler
                    && macros.is_macro(item)
                {
                    return Ok(macros.handle(item, state));
                }
                Err(Error::UndefinedInstruction(item.clone()))
            }
            Item::Block(_) => {
                if let Some(macros) = &self.macro_handler
                    && macros.is_macro(item)
                {
                    return Ok(macros.handle(item, state));
                }
                // A fragment reaching dispatch directly (through an input
                // binding) goes back on exec so the step loop splices it
                state.exec.push(item.clone());
                Ok(state)
            }
        }
    }

    /// Input-binding rule: `in<N>` reads the (N-1)-th input from the bound
    /// end and re-dispatches the stored value through the full precedence,
    /// so a bound name executes and a bound fragment runs.
    fn execute_input_ref(
        &self,
        item: &Item,
        index: usize,
        state: PushState,
    ) -> Result<PushState, Error> {
        if state.input.len() < index {
            return Err(Error::UndefinedInstruction(item.clone()));
        }
        let bound = state.input[state.input.len() - index].clone();
        self.execute_item(&bound, state)
    }

    /// Drive the `exec` stack to completion or budget exhaustion.
    ///
    /// Each iteration either restores an environment frame (when `exec` is
    /// empty but frames are pending), splices a nested fragment, or
    /// dispatches one element. The verdict is [`Termination::Normal`] iff
    /// both `exec` and `environment` are empty at the stop point.
    pub fn eval(&self, mut state: PushState) -> Result<Evaluation, Error> {
        let config = &self.config;
        if config.trace != TraceMode::Off && state.trace.is_none() {
            state.trace = Some(VecDeque::new());
        }
        let deadline = (config.time_limit > Duration::ZERO).then(|| Instant::now() + config.time_limit);

        let mut states = Vec::new();
        if config.record_states {
            states.push(state.clone());
        }

        let mut iteration: u64 = 1;
        loop {
            let exec_empty = state.exec.is_empty();
            let finished = exec_empty && state.environment.is_empty();
            let out_of_time = deadline.is_some_and(|d| Instant::now() > d);
            if iteration > config.step_limit || finished || out_of_time {
                state.termination = if finished {
                    Termination::Normal
                } else {
                    Termination::Abnormal
                };
                return Ok(Evaluation {
                    state,
                    steps: iteration - 1,
                    states,
                });
            }

            match state.exec.pop() {
                None => {
                    // Scope body drained with frames pending: resume the
                    // calling scope
                    state = end_environment(state);
                }
                Some(Item::Block(items)) => {
                    // Splice the fragment onto exec so its first element
                    // becomes the new top
                    if config.trace == TraceMode::Full {
                        trace_push(&mut state, Item::Block(items.clone()));
                    }
                    state.exec.extend(items.into_iter().rev());
                    if config.record_states {
                        states.push(state.clone());
                    }
                }
                Some(item) => {
                    trace!(step = iteration, item = %item, "dispatch");
                    let before =
                        (config.trace == TraceMode::ChangesOnly).then(|| state.clone());
                    state = self.execute_item(&item, state)?;
                    match config.trace {
                        TraceMode::Off => {}
                        TraceMode::Full => trace_push(&mut state, item),
                        TraceMode::ChangesOnly => {
                            if before.as_ref() != Some(&state) {
                                trace_push(&mut state, item);
                            }
                        }
                    }
                    if config.record_states {
                        states.push(state.clone());
                    }
                    if config.print_steps {
                        debug!(step = iteration, state = %state, "push step");
                    }
                }
            }
            iteration += 1;
        }
    }

    /// Run one program from a prepared initial state.
    ///
    /// The program is pushed onto `exec` as one fragment (not flattened)
    /// and, when [`EvalConfig::push_code`] is set, staged on `code` as
    /// well; [`EvalConfig::pop_code`] strips the top of `code` on exit.
    /// The returned state's `termination` and `output` are the externally
    /// meaningful results.
    pub fn run(&self, program: Item, mut state: PushState) -> Result<Evaluation, Error> {
        state.output_limit = self.config.output_limit;
        if self.config.push_code {
            state.code.push(program.clone());
        }
        state.exec.push(program);
        let mut evaluation = self.eval(state)?;
        if self.config.pop_code {
            evaluation.state.code.pop();
        }
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{block, lit, name};
    use crate::registry::{InstructionFn, Metadata, StackId};

    fn interp() -> Interpreter {
        Interpreter::standard()
    }

    fn interp_with(config: EvalConfig) -> Interpreter {
        Interpreter::standard().with_config(config)
    }

    /// Registry with the standard library plus a self-replicating "spin"
    /// instruction that never lets exec drain, and a "nap" instruction
    /// that blocks for a few milliseconds.
    fn registry_with_test_ops() -> Registry {
        let mut registry = crate::instructions::standard_registry();
        let spin: InstructionFn = Arc::new(|mut state: PushState| {
            state.exec.push(name("spin"));
            state
        });
        registry
            .register("spin", spin, Metadata::new(vec![], vec![StackId::Exec], 0))
            .unwrap();
        let nap: InstructionFn = Arc::new(|state: PushState| {
            std::thread::sleep(Duration::from_millis(5));
            state
        });
        registry
            .register("nap", nap, Metadata::new(vec![], vec![], 0))
            .unwrap();
        registry
    }

    #[test]
    fn test_literal_dispatch_pushes_matching_stack() {
        let interp = interp();

        let state = interp.execute_item(&lit(42), PushState::new()).unwrap();
        assert_eq!(state.integer, vec![42]);

        let state = interp.execute_item(&lit(2.5), PushState::new()).unwrap();
        assert_eq!(state.float, vec![2.5]);

        let state = interp.execute_item(&lit(true), PushState::new()).unwrap();
        assert_eq!(state.boolean, vec![true]);

        let state = interp.execute_item(&lit('q'), PushState::new()).unwrap();
        assert_eq!(state.character, vec!['q']);

        let state = interp.execute_item(&lit("txt"), PushState::new()).unwrap();
        assert_eq!(state.string, vec!["txt".to_owned()]);
    }

    #[test]
    fn test_empty_vector_fills_all_four_vector_stacks() {
        let interp = interp();
        let state = interp
            .execute_item(&Item::Vector(VectorLiteral::Empty), PushState::new())
            .unwrap();

        assert_eq!(state.vector_integer, vec![Vec::<i64>::new()]);
        assert_eq!(state.vector_float, vec![Vec::<f64>::new()]);
        assert_eq!(state.vector_boolean, vec![Vec::<bool>::new()]);
        assert_eq!(state.vector_string, vec![Vec::<String>::new()]);
    }

    #[test]
    fn test_typed_vector_pushes_single_matching_stack() {
        let interp = interp();
        let state = interp
            .execute_item(
                &Item::Vector(VectorLiteral::ints(vec![1, 2, 3])),
                PushState::new(),
            )
            .unwrap();

        assert_eq!(state.vector_integer, vec![vec![1, 2, 3]]);
        assert!(state.vector_float.is_empty());
        assert!(state.vector_boolean.is_empty());
        assert!(state.vector_string.is_empty());
    }

    #[test]
    fn test_registry_dispatch() {
        let interp = interp();
        let mut state = PushState::new();
        state.push(2i64);
        state.push(3i64);

        let state = interp.execute_item(&name("integer_add"), state).unwrap();
        assert_eq!(state.integer, vec![5]);
    }

    #[test]
    fn test_undefined_instruction_carries_offender() {
        let interp = interp();
        let err = interp
            .execute_item(&name("no_such_op"), PushState::new())
            .unwrap_err();
        assert_eq!(err, Error::UndefinedInstruction(name("no_such_op")));
    }

    #[test]
    fn test_input_binding_dispatches_stored_value() {
        let interp = interp();
        // in1 reads the top of input, in2 the one below it
        let state = PushState::with_inputs([lit(10), lit(20)]);

        let after = interp.execute_item(&name("in1"), state.clone()).unwrap();
        assert_eq!(after.integer, vec![20]);

        let after = interp.execute_item(&name("in2"), state.clone()).unwrap();
        assert_eq!(after.integer, vec![10]);

        // Out of range: fewer than 3 inputs bound
        let err = interp.execute_item(&name("in3"), state).unwrap_err();
        assert_eq!(err, Error::UndefinedInstruction(name("in3")));
    }

    #[test]
    fn test_input_binding_executes_bound_name_and_fragment() {
        let interp = interp();

        // A bound instruction name executes rather than pushing as data
        let mut state = PushState::with_inputs([name("integer_add")]);
        state.push(4i64);
        state.push(5i64);
        let after = interp.execute_item(&name("in1"), state).unwrap();
        assert_eq!(after.integer, vec![9]);

        // A bound fragment lands on exec for splicing
        let state = PushState::with_inputs([block([lit(1), lit(2)])]);
        let after = interp.execute_item(&name("in1"), state).unwrap();
        assert_eq!(after.exec, vec![block([lit(1), lit(2)])]);
    }

    #[test]
    fn test_registry_precedes_input_binding_pattern() {
        // A registered instruction literally named "in1" wins over the
        // input-binding fallback
        let mut registry = crate::instructions::standard_registry();
        let shadow: InstructionFn = Arc::new(|mut state: PushState| {
            state.push(-1i64);
            state
        });
        registry
            .register("in1", shadow, Metadata::new(vec![], vec![StackId::Integer], 0))
            .unwrap();

        let interp = Interpreter::new(registry);
        let state = PushState::with_inputs([lit(99)]);
        let after = interp.execute_item(&name("in1"), state).unwrap();
        assert_eq!(after.integer, vec![-1]);
    }

    #[test]
    fn test_tag_and_macro_boundaries() {
        struct Tags;
        impl TagHandler for Tags {
            fn is_tag_instruction(&self, name: &str) -> bool {
                name.starts_with("tag_")
            }
            fn handle(&self, _name: &str, mut state: PushState) -> PushState {
                state.push(777i64);
                state
            }
        }
        struct Macros;
        impl MacroHandler for Macros {
            fn is_macro(&self, item: &Item) -> bool {
                matches!(item, Item::Name(n) if n == "expand_me")
            }
            fn handle(&self, _item: &Item, mut state: PushState) -> PushState {
                state.push(888i64);
                state
            }
        }

        let interp = Interpreter::standard()
            .with_tag_handler(Tags)
            .with_macro_handler(Macros);

        let after = interp
            .execute_item(&name("tag_store_100"), PushState::new())
            .unwrap();
        assert_eq!(after.integer, vec![777]);

        let after = interp
            .execute_item(&name("expand_me"), PushState::new())
            .unwrap();
        assert_eq!(after.integer, vec![888]);

        // Unclaimed names still fail
        let err = interp
            .execute_item(&name("untagged"), PushState::new())
            .unwrap_err();
        assert_eq!(err, Error::UndefinedInstruction(name("untagged")));
    }

    #[test]
    fn test_run_normal_termination() {
        let interp = interp();
        let program = block([lit(2), lit(3), name("integer_add")]);
        let evaluation = interp.run(program, PushState::new()).unwrap();

        assert_eq!(evaluation.state.integer, vec![5]);
        assert_eq!(evaluation.state.termination, Termination::Normal);
        assert!(evaluation.state.exec.is_empty());
    }

    #[test]
    fn test_step_limit_forces_abnormal_termination() {
        let config = EvalConfig {
            step_limit: 20,
            ..EvalConfig::default()
        };
        let interp = Interpreter::new(registry_with_test_ops()).with_config(config);

        let evaluation = interp.run(name("spin"), PushState::new()).unwrap();
        assert_eq!(evaluation.state.termination, Termination::Abnormal);
        assert_eq!(evaluation.steps, 20);
        assert!(!evaluation.state.exec.is_empty());
    }

    #[test]
    fn test_time_limit_zero_is_unbounded() {
        // With time_limit zero the deadline branch can never fire; a
        // program longer than any plausible instant still runs to the end
        let config = EvalConfig {
            step_limit: 10_000,
            time_limit: Duration::ZERO,
            ..EvalConfig::default()
        };
        let interp = interp_with(config);

        let items: Vec<Item> = (0..2000).map(|n| lit(n as i64)).collect();
        let evaluation = interp.run(Item::Block(items), PushState::new()).unwrap();
        assert_eq!(evaluation.state.termination, Termination::Normal);
        assert_eq!(evaluation.state.integer.len(), 2000);
    }

    #[test]
    fn test_time_limit_exceeded_is_abnormal() {
        let config = EvalConfig {
            time_limit: Duration::from_millis(1),
            ..EvalConfig::default()
        };
        let interp = Interpreter::new(registry_with_test_ops()).with_config(config);

        // The first nap blocks past the deadline; the second never runs
        let program = block([name("nap"), name("nap")]);
        let evaluation = interp.run(program, PushState::new()).unwrap();
        assert_eq!(evaluation.state.termination, Termination::Abnormal);
        assert!(!evaluation.state.exec.is_empty());
    }

    #[test]
    fn test_fragment_splicing_preserves_order() {
        let interp = interp();

        // Running (a b c) as the sole exec content is equivalent to
        // running a, b, c sequentially from the same starting state
        let items = [lit(1), lit(2), name("integer_add")];
        let via_fragment = interp
            .run(block(items.clone()), PushState::new())
            .unwrap()
            .state;

        let mut sequential = PushState::new();
        for item in &items {
            sequential = interp.execute_item(item, sequential).unwrap();
        }

        assert_eq!(via_fragment.integer, sequential.integer);
        assert_eq!(via_fragment.integer, vec![3]);
    }

    #[test]
    fn test_nested_fragments_splice_depth_first() {
        let interp = interp();
        let program = block([block([lit(1), block([lit(2)])]), lit(3)]);
        let evaluation = interp.run(program, PushState::new()).unwrap();
        assert_eq!(evaluation.state.integer, vec![1, 2, 3]);
    }

    #[test]
    fn test_undefined_instruction_aborts_run() {
        let interp = interp();
        let program = block([lit(1), name("bogus"), lit(2)]);
        let err = interp.run(program, PushState::new()).unwrap_err();
        assert_eq!(err, Error::UndefinedInstruction(name("bogus")));
    }

    #[test]
    fn test_environment_frame_restored_when_exec_drains() {
        let interp = interp();
        // environment_new runs (0 print_integer) in its own scope; the
        // remaining program resumes from the saved frame afterwards
        let program = block([
            lit(5),
            name("environment_new"),
            block([lit(0), name("print_integer")]),
            lit(7),
        ]);
        let evaluation = interp.run(program, PushState::new()).unwrap();

        assert_eq!(evaluation.state.termination, Termination::Normal);
        // The scope's integer push was discarded with the frame, the
        // outer 5 and the resumed 7 survive, and output carries forward
        assert_eq!(evaluation.state.integer, vec![5, 7]);
        assert_eq!(evaluation.state.output, "0");
        assert!(evaluation.state.environment.is_empty());
    }

    #[test]
    fn test_trace_full_logs_every_dispatch() {
        let config = EvalConfig {
            trace: TraceMode::Full,
            ..EvalConfig::default()
        };
        let interp = interp_with(config);

        let program = block([lit(1), name("exec_noop"), lit(2)]);
        let evaluation = interp.run(program.clone(), PushState::new()).unwrap();

        let log = evaluation.state.trace.unwrap();
        // Most recent first: 2, exec_noop, 1, then the spliced fragment
        let logged: Vec<Item> = log.into_iter().collect();
        assert_eq!(logged, vec![lit(2), name("exec_noop"), lit(1), program]);
    }

    #[test]
    fn test_trace_changes_only_skips_noops() {
        let config = EvalConfig {
            trace: TraceMode::ChangesOnly,
            ..EvalConfig::default()
        };
        let interp = interp_with(config);

        let program = block([lit(1), name("exec_noop"), lit(2)]);
        let evaluation = interp.run(program, PushState::new()).unwrap();

        let logged: Vec<Item> = evaluation.state.trace.unwrap().into_iter().collect();
        assert_eq!(logged, vec![lit(2), lit(1)]);
    }

    #[test]
    fn test_output_over_limit_leaves_state_unchanged() {
        let config = EvalConfig {
            output_limit: 5,
            ..EvalConfig::default()
        };
        let interp = interp_with(config);

        // Buffer at limit minus 2; printing a 3-character integer must
        // reject the whole operation and keep the source un-popped
        let mut state = PushState::new();
        state.output_limit = 5;
        state.output = "abc".to_owned();
        state.push(123i64);

        let before = state.clone();
        let after = interp.execute_item(&name("print_integer"), state).unwrap();
        assert_eq!(after, before);
        assert_eq!(after.integer, vec![123]);
    }

    #[test]
    fn test_record_states_keeps_full_sequence() {
        let config = EvalConfig {
            record_states: true,
            ..EvalConfig::default()
        };
        let interp = interp_with(config);

        let program = block([lit(1), lit(2)]);
        let evaluation = interp.run(program.clone(), PushState::new()).unwrap();

        // Initial state with program loaded, the splice, then one state
        // per dispatched literal
        assert_eq!(evaluation.states.len(), 4);
        assert_eq!(evaluation.states[0].exec, vec![program]);
        assert_eq!(evaluation.states[3].integer, vec![1, 2]);
    }

    #[test]
    fn test_code_staging_and_stripping() {
        let program = block([lit(1)]);

        // push_code without pop_code leaves the program on code
        let config = EvalConfig {
            push_code: true,
            ..EvalConfig::default()
        };
        let evaluation = interp_with(config)
            .run(program.clone(), PushState::new())
            .unwrap();
        assert_eq!(evaluation.state.code, vec![program.clone()]);

        // the paired pop strips it on exit
        let config = EvalConfig {
            push_code: true,
            pop_code: true,
            ..EvalConfig::default()
        };
        let evaluation = interp_with(config).run(program, PushState::new()).unwrap();
        assert!(evaluation.state.code.is_empty());
    }

    #[test]
    fn test_dispatch_counter_accumulates_across_runs() {
        let interp = interp();
        assert_eq!(interp.dispatch_count(), 0);

        interp.run(block([lit(1), lit(2)]), PushState::new()).unwrap();
        assert_eq!(interp.dispatch_count(), 2);

        interp.run(block([lit(3)]), PushState::new()).unwrap();
        assert_eq!(interp.dispatch_count(), 3);
    }

    #[test]
    fn test_parse_input_ref() {
        assert_eq!(parse_input_ref("in1"), Some(1));
        assert_eq!(parse_input_ref("in42"), Some(42));
        assert_eq!(parse_input_ref("in0"), None);
        assert_eq!(parse_input_ref("in"), None);
        assert_eq!(parse_input_ref("input"), None);
        assert_eq!(parse_input_ref("in1x"), None);
        assert_eq!(parse_input_ref("integer_add"), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Side-effect-free program elements: scalar literals only.
        fn scalar_item() -> impl Strategy<Value = Item> {
            prop_oneof![
                any::<i64>().prop_map(Item::Int),
                any::<bool>().prop_map(Item::Bool),
                "[a-z]{0,8}".prop_map(Item::Str),
                (-1000.0f64..1000.0).prop_map(Item::Float),
            ]
        }

        fn small_program() -> impl Strategy<Value = Item> {
            scalar_item().prop_recursive(3, 24, 6, |inner| {
                prop::collection::vec(inner, 0..6).prop_map(Item::Block)
            })
        }

        proptest! {
            #[test]
            fn prop_step_limit_bounds_iterations(
                program in small_program(),
                limit in 1u64..64,
            ) {
                let config = EvalConfig { step_limit: limit, ..EvalConfig::default() };
                let interp = Interpreter::standard().with_config(config);
                let evaluation = interp.run(program, PushState::new()).unwrap();
                prop_assert!(evaluation.steps <= limit);
            }

            #[test]
            fn prop_verdict_normal_iff_drained(program in small_program()) {
                let config = EvalConfig { step_limit: 50, ..EvalConfig::default() };
                let interp = Interpreter::standard().with_config(config);
                let evaluation = interp.run(program, PushState::new()).unwrap();
                let drained = evaluation.state.exec.is_empty()
                    && evaluation.state.environment.is_empty();
                prop_assert_eq!(
                    evaluation.state.termination == Termination::Normal,
                    drained
                );
            }

            #[test]
            fn prop_splice_equals_sequential(
                items in prop::collection::vec(scalar_item(), 0..8),
            ) {
                let interp = Interpreter::standard();
                let via_fragment = interp
                    .run(Item::Block(items.clone()), PushState::new())
                    .unwrap()
                    .state;

                let mut sequential = PushState::new();
                for item in &items {
                    sequential = interp.execute_item(item, sequential).unwrap();
                }
                sequential.termination = Termination::Normal;

                prop_assert_eq!(via_fragment, sequential);
            }
        }
    }
}
