//! JSON genome interchange.
//!
//! The evolutionary host stores genomes and passes them between processes
//! as JSON. The encoding keeps the program tree shape: a fragment is an
//! array, scalar literals map to the matching JSON scalars, and the kinds
//! JSON cannot express directly (instruction names, chars, typed vectors)
//! become single-key objects:
//!
//! ```text
//! (2 3.5 integer_add 'x' [1 2])
//!   =>
//! [2, 3.5, {"instruction": "integer_add"}, {"char": "x"}, {"vector": [1, 2]}]
//! ```
//!
//! A JSON number with no fractional part decodes onto the integer stack;
//! anything with a decimal point or exponent decodes as a float, mirroring
//! the textual notation.

use serde_json::{Map, Value, json};

use crate::program::{Item, VectorLiteral, is_valid_name};
use crate::{Error, ParseError, ParseErrorKind};

fn decode_error(message: impl Into<String>) -> Error {
    Error::ParseError(ParseError::from_message(
        ParseErrorKind::InvalidSyntax,
        message,
    ))
}

/// Encode a program as a JSON value.
pub fn to_json(item: &Item) -> Value {
    match item {
        Item::Bool(b) => Value::Bool(*b),
        Item::Int(n) => json!(n),
        Item::Float(x) => json!(x),
        Item::Char(c) => json!({ "char": c.to_string() }),
        Item::Str(s) => Value::String(s.clone()),
        Item::Name(n) => json!({ "instruction": n }),
        Item::Vector(v) => json!({ "vector": vector_to_json(v) }),
        Item::Block(items) => Value::Array(items.iter().map(to_json).collect()),
    }
}

fn vector_to_json(literal: &VectorLiteral) -> Value {
    match literal {
        VectorLiteral::Empty => Value::Array(Vec::new()),
        VectorLiteral::Ints(v) => json!(v),
        VectorLiteral::Floats(v) => json!(v),
        VectorLiteral::Bools(v) => json!(v),
        VectorLiteral::Strs(v) => json!(v),
    }
}

/// Decode a program from a JSON value.
pub fn from_json(value: &Value) -> Result<Item, Error> {
    match value {
        Value::Bool(b) => Ok(Item::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Item::Int(i))
            } else if let Some(x) = n.as_f64() {
                Ok(Item::Float(x))
            } else {
                Err(decode_error(format!("number out of range: {n}")))
            }
        }
        Value::String(s) => Ok(Item::Str(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Item::Block),
        Value::Object(map) => from_json_object(map),
        Value::Null => Err(decode_error("null is not a program element")),
    }
}

fn from_json_object(map: &Map<String, Value>) -> Result<Item, Error> {
    if map.len() == 1 {
        if let Some(v) = map.get("instruction") {
            return match v {
                Value::String(s) if is_valid_name(s) => Ok(Item::Name(s.clone())),
                _ => Err(decode_error(format!("invalid instruction name: {v}"))),
            };
        }
        if let Some(v) = map.get("char") {
            return match v.as_str().and_then(single_char) {
                Some(c) => Ok(Item::Char(c)),
                None => Err(decode_error(format!("invalid char literal: {v}"))),
            };
        }
        if let Some(v) = map.get("vector") {
            return match v {
                Value::Array(elements) => Ok(Item::Vector(vector_from_json(elements)?)),
                _ => Err(decode_error("\"vector\" must hold an array")),
            };
        }
    }
    Err(decode_error(
        "expected an object with exactly one of the keys \"instruction\", \"char\", \"vector\"",
    ))
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

/// Decode a homogeneous vector, typed by its elements. Integer elements
/// win when every element is an integer; otherwise any all-numeric vector
/// decodes as floats.
fn vector_from_json(elements: &[Value]) -> Result<VectorLiteral, Error> {
    if elements.is_empty() {
        return Ok(VectorLiteral::Empty);
    }
    if elements.iter().all(|e| e.as_i64().is_some()) {
        let ints = elements.iter().filter_map(Value::as_i64).collect();
        return Ok(VectorLiteral::ints(ints));
    }
    if elements.iter().all(|e| e.as_f64().is_some()) {
        let floats = elements.iter().filter_map(Value::as_f64).collect();
        return Ok(VectorLiteral::floats(floats));
    }
    if elements.iter().all(Value::is_boolean) {
        let bools = elements.iter().filter_map(Value::as_bool).collect();
        return Ok(VectorLiteral::bools(bools));
    }
    if elements.iter().all(Value::is_string) {
        let strs = elements
            .iter()
            .filter_map(|e| e.as_str().map(str::to_owned))
            .collect();
        return Ok(VectorLiteral::strs(strs));
    }
    Err(decode_error(format!(
        "vector elements must be homogeneous scalars: {elements:?}"
    )))
}

/// Decode a genome from its JSON text form.
pub fn decode_genome(text: &str) -> Result<Item, Error> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| decode_error(format!("invalid JSON: {e}")))?;
    from_json(&value)
}

/// Encode a genome to its JSON text form.
pub fn encode_genome(item: &Item) -> String {
    to_json(item).to_string()
}
