//! This module defines the homoiconic program element type used both as
//! executable control flow (on the `exec` stack) and as inspectable data
//! (on the `code` stack). The main enum, [`Item`], covers all scalar
//! literal kinds, typed vector literals, instruction names, and nested
//! program fragments. Ergonomic helper functions such as [`lit`], [`name`],
//! and [`block`] are provided for convenient program construction in both
//! code and tests. Conversion traits normalize every Rust integer width to
//! the canonical `i64` and every float width to `f64` at the construction
//! boundary, so no sub-kinds survive into the stacks. Display renders the
//! parseable textual notation.

/// Canonical integer width for the `integer` stack
pub(crate) type IntType = i64;

/// Canonical float width for the `float` stack
pub(crate) type FloatType = f64;

/// Allowed non-alphanumeric characters in instruction names
/// Underscore separates the stack prefix from the operation; the rest
/// cover arithmetic-style names and predicates ("?")
pub(crate) const NAME_SPECIAL_CHARS: &str = "_+-*/<>=!?%.";

/// Check if a string is a valid instruction name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + NAME_SPECIAL_CHARS
pub(crate) fn is_valid_name(candidate: &str) -> bool {
    let mut chars = candidate.chars();

    match chars.next() {
        None => false, // name is empty
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if first_char == '-'
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            candidate
                .chars()
                .all(|c| c.is_alphanumeric() || NAME_SPECIAL_CHARS.contains(c))
        }
    }
}

/// A homogeneous vector literal.
///
/// The variant tag records the element kind that dispatch inspects; an
/// empty vector has no element to inspect, so it gets a dedicated variant
/// and is pushed onto every vector stack when executed. The typed
/// constructors normalize empty payloads to [`VectorLiteral::Empty`] so
/// the two representations cannot diverge.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorLiteral {
    /// The ambiguous empty vector `[]`
    Empty,
    Ints(Vec<IntType>),
    Floats(Vec<FloatType>),
    Bools(Vec<bool>),
    Strs(Vec<String>),
}

impl VectorLiteral {
    pub fn ints(elements: Vec<IntType>) -> Self {
        if elements.is_empty() {
            VectorLiteral::Empty
        } else {
            VectorLiteral::Ints(elements)
        }
    }

    pub fn floats(elements: Vec<FloatType>) -> Self {
        if elements.is_empty() {
            VectorLiteral::Empty
        } else {
            VectorLiteral::Floats(elements)
        }
    }

    pub fn bools(elements: Vec<bool>) -> Self {
        if elements.is_empty() {
            VectorLiteral::Empty
        } else {
            VectorLiteral::Bools(elements)
        }
    }

    pub fn strs(elements: Vec<String>) -> Self {
        if elements.is_empty() {
            VectorLiteral::Empty
        } else {
            VectorLiteral::Strs(elements)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            VectorLiteral::Empty => true,
            VectorLiteral::Ints(v) => v.is_empty(),
            VectorLiteral::Floats(v) => v.is_empty(),
            VectorLiteral::Bools(v) => v.is_empty(),
            VectorLiteral::Strs(v) => v.is_empty(),
        }
    }
}

/// One program element.
///
/// An element is either a scalar literal, a vector literal, an instruction
/// name, or a finite ordered fragment of elements. The recursive `Block`
/// variant is what makes the language homoiconic: a whole program is
/// itself an `Item` and can be pushed onto the `code` stack as data.
///
/// To build a program, use the ergonomic helper functions:
/// - `lit(42)`, `lit(2.5)`, `lit(true)`, `lit("text")` for literals
/// - `name("integer_add")` for instruction names
/// - `block([lit(1), lit(2), name("integer_add")])` for fragments
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Bool(bool),
    Int(IntType),
    Float(FloatType),
    Char(char),
    Str(String),
    Vector(VectorLiteral),
    /// An instruction name, `in<N>` input reference, or tag instruction
    Name(String),
    /// A nested program fragment, spliced when reached on the exec stack
    Block(Vec<Item>),
}

impl Item {
    /// Total number of points in this program: one for the element itself
    /// plus one for every element of every nested fragment. Consumed by the
    /// external program generator and size-limiting mutation operators.
    pub fn points(&self) -> usize {
        match self {
            Item::Block(items) => 1 + items.iter().map(Item::points).sum::<usize>(),
            _ => 1,
        }
    }

    /// Check if this element is a nested program fragment
    pub fn is_block(&self) -> bool {
        matches!(self, Item::Block(_))
    }
}

// From trait implementations for Item - enables .into() conversion and
// collapses all numeric widths to the canonical stack types.

impl From<&str> for Item {
    fn from(s: &str) -> Self {
        Item::Str(s.to_owned())
    }
}

impl From<String> for Item {
    fn from(s: String) -> Self {
        Item::Str(s)
    }
}

impl From<bool> for Item {
    fn from(b: bool) -> Self {
        Item::Bool(b)
    }
}

impl From<char> for Item {
    fn from(c: char) -> Self {
        Item::Char(c)
    }
}

impl From<VectorLiteral> for Item {
    fn from(v: VectorLiteral) -> Self {
        Item::Vector(v)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Item {
            fn from(n: $int_type) -> Self {
                Item::Int(n as IntType)
            }
        }
    };
}

// Generate From implementations for all integer widths
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntType); // Special case - no casting
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl From<f32> for Item {
    fn from(x: f32) -> Self {
        Item::Float(x as FloatType)
    }
}

impl From<FloatType> for Item {
    fn from(x: FloatType) -> Self {
        Item::Float(x)
    }
}

/// Helper function for creating literals - accepts any type convertible to Item
pub fn lit<T: Into<Item>>(value: T) -> Item {
    value.into()
}

/// Helper function for creating instruction names
pub fn name<S: AsRef<str>>(n: S) -> Item {
    Item::Name(n.as_ref().to_owned())
}

/// Helper function for creating nested program fragments
pub fn block<I: IntoIterator<Item = Item>>(items: I) -> Item {
    Item::Block(items.into_iter().collect())
}

fn write_escaped_string(f: &mut std::fmt::Formatter<'_>, s: &str) -> std::fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl std::fmt::Display for VectorLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn write_elements<T: std::fmt::Display>(
            f: &mut std::fmt::Formatter<'_>,
            elements: &[T],
        ) -> std::fmt::Result {
            for (i, elem) in elements.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{elem}")?;
            }
            Ok(())
        }

        write!(f, "[")?;
        match self {
            VectorLiteral::Empty => {}
            VectorLiteral::Ints(v) => write_elements(f, v)?,
            VectorLiteral::Floats(v) => {
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{x:?}")?;
                }
            }
            VectorLiteral::Bools(v) => write_elements(f, v)?,
            VectorLiteral::Strs(v) => {
                for (i, s) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write_escaped_string(f, s)?;
                }
            }
        }
        write!(f, "]")
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Item::Bool(b) => write!(f, "{b}"),
            Item::Int(n) => write!(f, "{n}"),
            // {:?} keeps the decimal point on round floats so the literal
            // stays a float when parsed back
            Item::Float(x) => write!(f, "{x:?}"),
            Item::Char(c) => match c {
                '\n' => write!(f, "'\\n'"),
                '\t' => write!(f, "'\\t'"),
                '\r' => write!(f, "'\\r'"),
                '\\' => write!(f, "'\\\\'"),
                '\'' => write!(f, "'\\''"),
                c => write!(f, "'{c}'"),
            },
            Item::Str(s) => write_escaped_string(f, s),
            Item::Vector(v) => write!(f, "{v}"),
            Item::Name(n) => write!(f, "{n}"),
            Item::Block(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
