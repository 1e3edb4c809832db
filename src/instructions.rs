//! The standard instruction library.
//!
//! [`standard_registry`] builds the registry the evolutionary host samples
//! from: arithmetic and comparison over the numeric stacks, logic,
//! conversions between literal kinds, uniform stack manipulation for every
//! literal stack, `exec` and `code` control flow, environment scoping, and
//! the bounded print family.
//!
//! All handlers obey the uniform underflow contract (too-shallow operand
//! stacks make the instruction a no-op) and the partial-operation contract
//! (division by zero and friends restore their operands). Scalar
//! arithmetic saturates at the `i64` range rather than wrapping.

pub mod lift;

use std::sync::Arc;

use crate::interpreter::end_environment;
use crate::program::{FloatType, IntType, Item};
use crate::registry::{InstructionFn, Metadata, Registry, StackId};
use crate::state::{PushState, StackType};

use lift::{binary, binary_checked, unary, unary_checked};

struct Lib {
    registry: Registry,
}

impl Lib {
    fn op(
        &mut self,
        name: &str,
        func: InstructionFn,
        consumes: &[StackId],
        produces: &[StackId],
        parentheses: usize,
    ) {
        self.registry
            .register(
                name,
                func,
                Metadata::new(consumes.to_vec(), produces.to_vec(), parentheses),
            )
            .expect("standard library instruction registered twice");
    }
}

// Uniform stack manipulation, parameterized over the literal kind.

fn dup<T: StackType + 'static>() -> InstructionFn {
    Arc::new(|mut state: PushState| {
        if let Some(top) = state.top::<T>().cloned() {
            state.push(top);
        }
        state
    })
}

fn pop_op<T: StackType + 'static>() -> InstructionFn {
    Arc::new(|mut state: PushState| {
        state.pop::<T>();
        state
    })
}

fn swap<T: StackType + 'static>() -> InstructionFn {
    Arc::new(|mut state: PushState| {
        let n = T::stack(&state).len();
        if n >= 2 {
            T::stack_mut(&mut state).swap(n - 1, n - 2);
        }
        state
    })
}

/// Rotate the top three: the third-from-top moves to the top.
fn rot<T: StackType + 'static>() -> InstructionFn {
    Arc::new(|mut state: PushState| {
        if state.depth::<T>() < 3 {
            return state;
        }
        let Some(c) = state.pop::<T>() else { return state };
        let Some(b) = state.pop::<T>() else { return state };
        let Some(a) = state.pop::<T>() else { return state };
        state.push(b);
        state.push(c);
        state.push(a);
        state
    })
}

fn flush<T: StackType + 'static>() -> InstructionFn {
    Arc::new(|mut state: PushState| {
        T::stack_mut(&mut state).clear();
        state
    })
}

fn stackdepth<T: StackType + 'static>() -> InstructionFn {
    Arc::new(|mut state: PushState| {
        let depth = state.depth::<T>() as IntType;
        state.push(depth);
        state
    })
}

/// Pop the top two and push their equality onto `boolean`.
fn eq<T: StackType + 'static>() -> InstructionFn {
    Arc::new(|mut state: PushState| {
        if state.depth::<T>() < 2 {
            return state;
        }
        let Some(b) = state.pop::<T>() else { return state };
        let Some(a) = state.pop::<T>() else { return state };
        state.push(a == b);
        state
    })
}

/// Print the rendered top of a stack into `output`. An append that would
/// exceed the output ceiling is rejected whole and the source stays
/// un-popped.
fn print_op<T: StackType + 'static>(render: fn(&T) -> String) -> InstructionFn {
    Arc::new(move |mut state: PushState| {
        let Some(text) = state.top::<T>().map(render) else {
            return state;
        };
        if !state.append_output(&text) {
            return state;
        }
        state.pop::<T>();
        state
    })
}

macro_rules! stack_ops {
    ($lib:expr, $prefix:literal, $ty:ty) => {{
        const ID: StackId = <$ty as StackType>::ID;
        $lib.op(concat!($prefix, "_dup"), dup::<$ty>(), &[ID], &[ID, ID], 0);
        $lib.op(concat!($prefix, "_pop"), pop_op::<$ty>(), &[ID], &[], 0);
        $lib.op(concat!($prefix, "_swap"), swap::<$ty>(), &[ID, ID], &[ID, ID], 0);
        $lib.op(
            concat!($prefix, "_rot"),
            rot::<$ty>(),
            &[ID, ID, ID],
            &[ID, ID, ID],
            0,
        );
        $lib.op(concat!($prefix, "_flush"), flush::<$ty>(), &[ID], &[], 0);
        $lib.op(
            concat!($prefix, "_stackdepth"),
            stackdepth::<$ty>(),
            &[],
            &[StackId::Integer],
            0,
        );
        $lib.op(
            concat!($prefix, "_eq"),
            eq::<$ty>(),
            &[ID, ID],
            &[StackId::Boolean],
            0,
        );
    }};
}

macro_rules! vector_ops {
    ($lib:expr, $prefix:literal, $elem:ty) => {{
        const ID: StackId = <Vec<$elem> as StackType>::ID;
        const EID: StackId = <$elem as StackType>::ID;
        $lib.op(
            concat!($prefix, "_concat"),
            binary(|mut a: Vec<$elem>, b: Vec<$elem>| {
                a.extend(b);
                a
            }),
            &[ID, ID],
            &[ID],
            0,
        );
        $lib.op(
            concat!($prefix, "_length"),
            unary(|v: Vec<$elem>| v.len() as IntType),
            &[ID],
            &[StackId::Integer],
            0,
        );
        $lib.op(
            concat!($prefix, "_first"),
            unary_checked(|v: &Vec<$elem>| v.first().cloned()),
            &[ID],
            &[EID],
            0,
        );
        $lib.op(
            concat!($prefix, "_last"),
            unary_checked(|v: &Vec<$elem>| v.last().cloned()),
            &[ID],
            &[EID],
            0,
        );
        $lib.op(
            concat!($prefix, "_conj"),
            binary(|mut v: Vec<$elem>, e: $elem| {
                v.push(e);
                v
            }),
            &[ID, EID],
            &[ID],
            0,
        );
        $lib.op(
            concat!($prefix, "_contains"),
            binary(|v: Vec<$elem>, e: $elem| v.contains(&e)),
            &[ID, EID],
            &[StackId::Boolean],
            0,
        );
        $lib.op(
            concat!($prefix, "_reverse"),
            unary(|mut v: Vec<$elem>| {
                v.reverse();
                v
            }),
            &[ID],
            &[ID],
            0,
        );
    }};
}

/// Coerce a code element into fragment form for structural operations.
fn fragment_items(item: Item) -> Vec<Item> {
    match item {
        Item::Block(items) => items,
        other => vec![other],
    }
}

fn register_exec_ops(lib: &mut Lib) {
    use StackId::{Boolean, Exec};

    lib.op("exec_noop", Arc::new(|state: PushState| state), &[], &[], 0);
    lib.op(
        "exec_dup",
        Arc::new(|mut state: PushState| {
            if let Some(top) = state.exec.last().cloned() {
                state.exec.push(top);
            }
            state
        }),
        &[Exec],
        &[Exec, Exec],
        1,
    );
    lib.op(
        "exec_pop",
        Arc::new(|mut state: PushState| {
            state.exec.pop();
            state
        }),
        &[Exec],
        &[],
        1,
    );
    lib.op(
        "exec_swap",
        Arc::new(|mut state: PushState| {
            let n = state.exec.len();
            if n >= 2 {
                state.exec.swap(n - 1, n - 2);
            }
            state
        }),
        &[Exec, Exec],
        &[Exec, Exec],
        2,
    );
    lib.op(
        "exec_rot",
        Arc::new(|mut state: PushState| {
            if state.exec.len() < 3 {
                return state;
            }
            let n = state.exec.len();
            state.exec.swap(n - 1, n - 3);
            state.exec.swap(n - 2, n - 3);
            state
        }),
        &[Exec, Exec, Exec],
        &[Exec, Exec, Exec],
        3,
    );
    lib.op(
        "exec_flush",
        Arc::new(|mut state: PushState| {
            state.exec.clear();
            state
        }),
        &[Exec],
        &[],
        0,
    );
    lib.op(
        "exec_stackdepth",
        Arc::new(|mut state: PushState| {
            let depth = state.exec.len() as IntType;
            state.push(depth);
            state
        }),
        &[],
        &[StackId::Integer],
        0,
    );
    lib.op(
        "exec_eq",
        Arc::new(|mut state: PushState| {
            if state.exec.len() < 2 {
                return state;
            }
            let Some(b) = state.exec.pop() else { return state };
            let Some(a) = state.exec.pop() else { return state };
            state.push(a == b);
            state
        }),
        &[Exec, Exec],
        &[Boolean],
        2,
    );
    // Conditional over the next two exec elements: true keeps the first,
    // false keeps the second
    lib.op(
        "exec_if",
        Arc::new(|mut state: PushState| {
            if state.boolean.is_empty() || state.exec.len() < 2 {
                return state;
            }
            let Some(condition) = state.pop::<bool>() else { return state };
            let Some(first) = state.exec.pop() else { return state };
            let Some(second) = state.exec.pop() else { return state };
            state.exec.push(if condition { first } else { second });
            state
        }),
        &[Boolean, Exec, Exec],
        &[Exec],
        2,
    );
    // One-armed conditional: false discards the next exec element
    lib.op(
        "exec_when",
        Arc::new(|mut state: PushState| {
            if state.boolean.is_empty() || state.exec.is_empty() {
                return state;
            }
            let Some(condition) = state.pop::<bool>() else { return state };
            if !condition {
                state.exec.pop();
            }
            state
        }),
        &[Boolean, Exec],
        &[],
        1,
    );
}

fn register_code_ops(lib: &mut Lib) {
    use StackId::{Boolean, Code, Exec};

    // Move the next exec element to code unexecuted
    lib.op(
        "code_quote",
        Arc::new(|mut state: PushState| {
            if let Some(top) = state.exec.pop() {
                state.code.push(top);
            }
            state
        }),
        &[Exec],
        &[Code],
        1,
    );
    // Push the top of code back onto exec for execution
    lib.op(
        "code_do",
        Arc::new(|mut state: PushState| {
            if let Some(top) = state.code.pop() {
                state.exec.push(top);
            }
            state
        }),
        &[Code],
        &[Exec],
        0,
    );
    lib.op(
        "code_wrap",
        Arc::new(|mut state: PushState| {
            if let Some(top) = state.code.pop() {
                state.code.push(Item::Block(vec![top]));
            }
            state
        }),
        &[Code],
        &[Code],
        0,
    );
    // First element of a fragment; a scalar is its own first, an empty
    // fragment is left in place
    lib.op(
        "code_first",
        Arc::new(|mut state: PushState| {
            match state.code.pop() {
                Some(Item::Block(items)) => {
                    if let Some(first) = items.first() {
                        state.code.push(first.clone());
                    } else {
                        state.code.push(Item::Block(items));
                    }
                }
                Some(other) => state.code.push(other),
                None => {}
            }
            state
        }),
        &[Code],
        &[Code],
        0,
    );
    // Everything after the first element; the rest of a scalar is ()
    lib.op(
        "code_rest",
        Arc::new(|mut state: PushState| {
            match state.code.pop() {
                Some(Item::Block(items)) => {
                    let rest: Vec<Item> = items.into_iter().skip(1).collect();
                    state.code.push(Item::Block(rest));
                }
                Some(_) => state.code.push(Item::Block(Vec::new())),
                None => {}
            }
            state
        }),
        &[Code],
        &[Code],
        0,
    );
    // Concatenate the top two as fragments, second before top
    lib.op(
        "code_append",
        Arc::new(|mut state: PushState| {
            if state.code.len() < 2 {
                return state;
            }
            let Some(b) = state.code.pop() else { return state };
            let Some(a) = state.code.pop() else { return state };
            let mut items = fragment_items(a);
            items.extend(fragment_items(b));
            state.code.push(Item::Block(items));
            state
        }),
        &[Code, Code],
        &[Code],
        0,
    );
    // Element count of a fragment; a scalar counts 1
    lib.op(
        "code_length",
        Arc::new(|mut state: PushState| {
            match state.code.pop() {
                Some(Item::Block(items)) => state.push(items.len() as IntType),
                Some(_) => state.push(1 as IntType),
                None => {}
            }
            state
        }),
        &[Code],
        &[StackId::Integer],
        0,
    );
    lib.op(
        "code_dup",
        Arc::new(|mut state: PushState| {
            if let Some(top) = state.code.last().cloned() {
                state.code.push(top);
            }
            state
        }),
        &[Code],
        &[Code, Code],
        0,
    );
    lib.op(
        "code_pop",
        Arc::new(|mut state: PushState| {
            state.code.pop();
            state
        }),
        &[Code],
        &[],
        0,
    );
    lib.op(
        "code_stackdepth",
        Arc::new(|mut state: PushState| {
            let depth = state.code.len() as IntType;
            state.push(depth);
            state
        }),
        &[],
        &[StackId::Integer],
        0,
    );
    lib.op(
        "code_eq",
        Arc::new(|mut state: PushState| {
            if state.code.len() < 2 {
                return state;
            }
            let Some(b) = state.code.pop() else { return state };
            let Some(a) = state.code.pop() else { return state };
            state.push(a == b);
            state
        }),
        &[Code, Code],
        &[Boolean],
        0,
    );
}

fn register_environment_ops(lib: &mut Lib) {
    use StackId::{Environment, Exec};

    // Run the next exec element in its own scope: the rest of the
    // computation is saved as a frame and resumes when the scope drains
    lib.op(
        "environment_new",
        Arc::new(|mut state: PushState| {
            let Some(body) = state.exec.pop() else {
                return state;
            };
            let frame = state.clone();
            state.environment.push(frame);
            state.exec = vec![body];
            state
        }),
        &[Exec],
        &[Environment, Exec],
        1,
    );
    // Save a frame that terminates the run when restored, without
    // altering the current exec contents
    lib.op(
        "environment_begin",
        Arc::new(|mut state: PushState| {
            let mut frame = state.clone();
            frame.exec.clear();
            state.environment.push(frame);
            state
        }),
        &[],
        &[Environment],
        0,
    );
    // Restore the top frame immediately, abandoning the current scope
    lib.op(
        "environment_end",
        Arc::new(end_environment),
        &[Environment],
        &[],
        0,
    );
}

/// Build the standard instruction library.
pub fn standard_registry() -> Registry {
    use StackId::{Boolean, Character, Float, Integer, Output, String as Str};

    let mut lib = Lib {
        registry: Registry::new(),
    };

    // Integer arithmetic saturates at the i64 range; division and modulus
    // are partial and restore their operands on a zero divisor
    lib.op(
        "integer_add",
        binary(|a: IntType, b: IntType| a.saturating_add(b)),
        &[Integer, Integer],
        &[Integer],
        0,
    );
    lib.op(
        "integer_sub",
        binary(|a: IntType, b: IntType| a.saturating_sub(b)),
        &[Integer, Integer],
        &[Integer],
        0,
    );
    lib.op(
        "integer_mult",
        binary(|a: IntType, b: IntType| a.saturating_mul(b)),
        &[Integer, Integer],
        &[Integer],
        0,
    );
    lib.op(
        "integer_div",
        binary_checked(|a: &IntType, b: &IntType| a.checked_div(*b)),
        &[Integer, Integer],
        &[Integer],
        0,
    );
    lib.op(
        "integer_mod",
        binary_checked(|a: &IntType, b: &IntType| a.checked_rem_euclid(*b)),
        &[Integer, Integer],
        &[Integer],
        0,
    );
    lib.op(
        "integer_min",
        binary(|a: IntType, b: IntType| a.min(b)),
        &[Integer, Integer],
        &[Integer],
        0,
    );
    lib.op(
        "integer_max",
        binary(|a: IntType, b: IntType| a.max(b)),
        &[Integer, Integer],
        &[Integer],
        0,
    );
    lib.op(
        "integer_negate",
        unary(|n: IntType| n.saturating_neg()),
        &[Integer],
        &[Integer],
        0,
    );
    lib.op(
        "integer_lt",
        binary(|a: IntType, b: IntType| a < b),
        &[Integer, Integer],
        &[Boolean],
        0,
    );
    lib.op(
        "integer_gt",
        binary(|a: IntType, b: IntType| a > b),
        &[Integer, Integer],
        &[Boolean],
        0,
    );

    lib.op(
        "float_add",
        binary(|a: FloatType, b: FloatType| a + b),
        &[Float, Float],
        &[Float],
        0,
    );
    lib.op(
        "float_sub",
        binary(|a: FloatType, b: FloatType| a - b),
        &[Float, Float],
        &[Float],
        0,
    );
    lib.op(
        "float_mult",
        binary(|a: FloatType, b: FloatType| a * b),
        &[Float, Float],
        &[Float],
        0,
    );
    lib.op(
        "float_div",
        binary_checked(|a: &FloatType, b: &FloatType| (*b != 0.0).then(|| a / b)),
        &[Float, Float],
        &[Float],
        0,
    );
    lib.op(
        "float_mod",
        binary_checked(|a: &FloatType, b: &FloatType| (*b != 0.0).then(|| a.rem_euclid(*b))),
        &[Float, Float],
        &[Float],
        0,
    );
    lib.op(
        "float_min",
        binary(|a: FloatType, b: FloatType| a.min(b)),
        &[Float, Float],
        &[Float],
        0,
    );
    lib.op(
        "float_max",
        binary(|a: FloatType, b: FloatType| a.max(b)),
        &[Float, Float],
        &[Float],
        0,
    );
    lib.op(
        "float_negate",
        unary(|x: FloatType| -x),
        &[Float],
        &[Float],
        0,
    );
    lib.op(
        "float_sin",
        unary(|x: FloatType| x.sin()),
        &[Float],
        &[Float],
        0,
    );
    lib.op(
        "float_cos",
        unary(|x: FloatType| x.cos()),
        &[Float],
        &[Float],
        0,
    );
    lib.op(
        "float_tan",
        unary(|x: FloatType| x.tan()),
        &[Float],
        &[Float],
        0,
    );
    lib.op(
        "float_lt",
        binary(|a: FloatType, b: FloatType| a < b),
        &[Float, Float],
        &[Boolean],
        0,
    );
    lib.op(
        "float_gt",
        binary(|a: FloatType, b: FloatType| a > b),
        &[Float, Float],
        &[Boolean],
        0,
    );

    lib.op(
        "boolean_and",
        binary(|a: bool, b: bool| a && b),
        &[Boolean, Boolean],
        &[Boolean],
        0,
    );
    lib.op(
        "boolean_or",
        binary(|a: bool, b: bool| a || b),
        &[Boolean, Boolean],
        &[Boolean],
        0,
    );
    lib.op(
        "boolean_xor",
        binary(|a: bool, b: bool| a != b),
        &[Boolean, Boolean],
        &[Boolean],
        0,
    );
    lib.op("boolean_not", unary(|b: bool| !b), &[Boolean], &[Boolean], 0);

    // Conversions between literal kinds
    lib.op(
        "integer_from_float",
        unary(|x: FloatType| x as IntType),
        &[Float],
        &[Integer],
        0,
    );
    lib.op(
        "integer_from_boolean",
        unary(|b: bool| IntType::from(b)),
        &[Boolean],
        &[Integer],
        0,
    );
    lib.op(
        "integer_from_char",
        unary(|c: char| c as IntType),
        &[Character],
        &[Integer],
        0,
    );
    lib.op(
        "integer_from_string",
        unary_checked(|s: &String| s.parse::<IntType>().ok()),
        &[Str],
        &[Integer],
        0,
    );
    lib.op(
        "float_from_integer",
        unary(|n: IntType| n as FloatType),
        &[Integer],
        &[Float],
        0,
    );
    lib.op(
        "float_from_boolean",
        unary(|b: bool| if b { 1.0 } else { 0.0 }),
        &[Boolean],
        &[Float],
        0,
    );
    lib.op(
        "float_from_string",
        unary_checked(|s: &String| s.parse::<FloatType>().ok()),
        &[Str],
        &[Float],
        0,
    );
    lib.op(
        "boolean_from_integer",
        unary(|n: IntType| n != 0),
        &[Integer],
        &[Boolean],
        0,
    );
    lib.op(
        "boolean_from_float",
        unary(|x: FloatType| x != 0.0),
        &[Float],
        &[Boolean],
        0,
    );
    // Reduced into the printable ASCII range
    lib.op(
        "char_from_integer",
        unary(|n: IntType| (n.rem_euclid(128) as u8) as char),
        &[Integer],
        &[Character],
        0,
    );
    lib.op(
        "char_is_letter",
        unary(|c: char| c.is_alphabetic()),
        &[Character],
        &[Boolean],
        0,
    );
    lib.op(
        "char_is_digit",
        unary(|c: char| c.is_ascii_digit()),
        &[Character],
        &[Boolean],
        0,
    );
    lib.op(
        "char_is_whitespace",
        unary(|c: char| c.is_whitespace()),
        &[Character],
        &[Boolean],
        0,
    );

    lib.op(
        "string_concat",
        binary(|a: String, b: String| a + &b),
        &[Str, Str],
        &[Str],
        0,
    );
    lib.op(
        "string_length",
        unary(|s: String| s.chars().count() as IntType),
        &[Str],
        &[Integer],
        0,
    );
    lib.op(
        "string_reverse",
        unary(|s: String| s.chars().rev().collect::<String>()),
        &[Str],
        &[Str],
        0,
    );
    // Whether the second string contains the top as a substring
    lib.op(
        "string_contains",
        binary(|a: String, b: String| a.contains(&b)),
        &[Str, Str],
        &[Boolean],
        0,
    );
    lib.op(
        "string_take",
        binary(|s: String, n: IntType| s.chars().take(n.max(0) as usize).collect::<String>()),
        &[Str, Integer],
        &[Str],
        0,
    );
    lib.op(
        "string_from_integer",
        unary(|n: IntType| n.to_string()),
        &[Integer],
        &[Str],
        0,
    );
    lib.op(
        "string_from_float",
        unary(|x: FloatType| format!("{x:?}")),
        &[Float],
        &[Str],
        0,
    );
    lib.op(
        "string_from_boolean",
        unary(|b: bool| b.to_string()),
        &[Boolean],
        &[Str],
        0,
    );
    lib.op(
        "string_from_char",
        unary(|c: char| c.to_string()),
        &[Character],
        &[Str],
        0,
    );

    stack_ops!(lib, "integer", IntType);
    stack_ops!(lib, "float", FloatType);
    stack_ops!(lib, "boolean", bool);
    stack_ops!(lib, "char", char);
    stack_ops!(lib, "string", String);
    stack_ops!(lib, "vector_integer", Vec<IntType>);
    stack_ops!(lib, "vector_float", Vec<FloatType>);
    stack_ops!(lib, "vector_boolean", Vec<bool>);
    stack_ops!(lib, "vector_string", Vec<String>);

    vector_ops!(lib, "vector_integer", IntType);
    vector_ops!(lib, "vector_float", FloatType);
    vector_ops!(lib, "vector_boolean", bool);
    vector_ops!(lib, "vector_string", String);

    register_exec_ops(&mut lib);
    register_code_ops(&mut lib);
    register_environment_ops(&mut lib);

    lib.op(
        "print_integer",
        print_op::<IntType>(|n| n.to_string()),
        &[Integer],
        &[Output],
        0,
    );
    lib.op(
        "print_float",
        print_op::<FloatType>(|x| format!("{x:?}")),
        &[Float],
        &[Output],
        0,
    );
    lib.op(
        "print_boolean",
        print_op::<bool>(|b| b.to_string()),
        &[Boolean],
        &[Output],
        0,
    );
    lib.op(
        "print_char",
        print_op::<char>(|c| c.to_string()),
        &[Character],
        &[Output],
        0,
    );
    lib.op(
        "print_string",
        print_op::<String>(|s| s.clone()),
        &[Str],
        &[Output],
        0,
    );
    lib.op(
        "print_newline",
        Arc::new(|mut state: PushState| {
            state.append_output("\n");
            state
        }),
        &[],
        &[Output],
        0,
    );

    lib.registry
}
