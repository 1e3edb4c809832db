//! Adapters lifting plain Rust functions into instruction handlers.
//!
//! Handlers must be total over every state, so the adapters encode the
//! uniform underflow contract once: an instruction whose operand stacks
//! are too shallow is a no-op, and a partial application (`None` from a
//! checked function, such as division by zero) restores its operands
//! instead of consuming them.

use std::sync::Arc;

use crate::registry::InstructionFn;
use crate::state::{PushState, StackType};

/// Lift a unary function. No-op when the operand stack is empty.
pub fn unary<A, R, F>(f: F) -> InstructionFn
where
    A: StackType + 'static,
    R: StackType + 'static,
    F: Fn(A) -> R + Send + Sync + 'static,
{
    Arc::new(move |mut state: PushState| {
        if let Some(a) = state.pop::<A>() {
            let r = f(a);
            state.push(r);
        }
        state
    })
}

/// Lift a unary partial function. `None` pushes the operand back.
pub fn unary_checked<A, R, F>(f: F) -> InstructionFn
where
    A: StackType + 'static,
    R: StackType + 'static,
    F: Fn(&A) -> Option<R> + Send + Sync + 'static,
{
    Arc::new(move |mut state: PushState| {
        let Some(a) = state.pop::<A>() else {
            return state;
        };
        match f(&a) {
            Some(r) => state.push(r),
            None => state.push(a),
        }
        state
    })
}

/// Lift a binary function. `b` is popped first, so when both operands
/// live on the same stack `b` is the top and `a` the one beneath it
/// (`integer_sub` computes `a - b`). No-op when either operand is
/// missing; a missing `a` restores `b`.
pub fn binary<A, B, R, F>(f: F) -> InstructionFn
where
    A: StackType + 'static,
    B: StackType + 'static,
    R: StackType + 'static,
    F: Fn(A, B) -> R + Send + Sync + 'static,
{
    Arc::new(move |mut state: PushState| {
        let Some(b) = state.pop::<B>() else {
            return state;
        };
        let Some(a) = state.pop::<A>() else {
            state.push(b);
            return state;
        };
        let r = f(a, b);
        state.push(r);
        state
    })
}

/// Lift a binary partial function. `None` restores both operands in
/// their original order.
pub fn binary_checked<A, B, R, F>(f: F) -> InstructionFn
where
    A: StackType + 'static,
    B: StackType + 'static,
    R: StackType + 'static,
    F: Fn(&A, &B) -> Option<R> + Send + Sync + 'static,
{
    Arc::new(move |mut state: PushState| {
        let Some(b) = state.pop::<B>() else {
            return state;
        };
        let Some(a) = state.pop::<A>() else {
            state.push(b);
            return state;
        };
        match f(&a, &b) {
            Some(r) => state.push(r),
            None => {
                state.push(a);
                state.push(b);
            }
        }
        state
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unary_applies_and_underflows() {
        let negate = unary(|n: i64| -n);

        let mut state = PushState::new();
        state.push(5i64);
        let state = negate(state);
        assert_eq!(state.integer, vec![-5]);

        // Empty operand stack: no-op
        let state = negate(PushState::new());
        assert!(state.integer.is_empty());
    }

    #[test]
    fn test_binary_operand_order() {
        let sub = binary(|a: i64, b: i64| a - b);

        let mut state = PushState::new();
        state.push(10i64);
        state.push(3i64);
        // 3 is the top, so the result is 10 - 3
        let state = sub(state);
        assert_eq!(state.integer, vec![7]);
    }

    #[test]
    fn test_binary_restores_on_underflow() {
        let add = binary(|a: i64, b: i64| a + b);

        let mut state = PushState::new();
        state.push(42i64);
        let state = add(state);
        assert_eq!(state.integer, vec![42]);
    }

    #[test]
    fn test_binary_across_stacks() {
        let repeat = binary(|s: String, n: i64| s.repeat(n.max(0) as usize));

        let mut state = PushState::new();
        state.push("ab".to_owned());
        state.push(3i64);
        let state = repeat(state);
        assert_eq!(state.string, vec!["ababab".to_owned()]);
        assert!(state.integer.is_empty());

        // Missing string operand restores the integer
        let mut state = PushState::new();
        state.push(3i64);
        let state = repeat(state);
        assert_eq!(state.integer, vec![3]);
    }

    #[test]
    fn test_checked_none_restores_operands() {
        let div = binary_checked(|a: &i64, b: &i64| a.checked_div(*b));

        let mut state = PushState::new();
        state.push(10i64);
        state.push(0i64);
        let state = div(state);
        // Division by zero leaves both operands in place
        assert_eq!(state.integer, vec![10, 0]);

        let parse = unary_checked(|s: &String| s.parse::<i64>().ok());
        let mut state = PushState::new();
        state.push("xyz".to_owned());
        let state = parse(state);
        assert_eq!(state.string, vec!["xyz".to_owned()]);
    }
}
