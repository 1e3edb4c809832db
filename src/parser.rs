//! Textual program notation.
//!
//! Programs read the way they print: whitespace-separated elements,
//! fragments in parentheses, homogeneous vectors in brackets, strings and
//! chars with the usual escapes. `parse_program` accepts exactly one
//! top-level element and rejects trailing content, so a multi-element
//! program is written as one fragment: `(2 3 integer_add)`.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{opt, recognize, value},
    error::ErrorKind,
    multi::separated_list0,
    sequence::{preceded, terminated},
};

use crate::program::{FloatType, IntType, Item, NAME_SPECIAL_CHARS, VectorLiteral, is_valid_name};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Convert nom parsing errors to structured errors with input context
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            match e.code {
                ErrorKind::TooLarge => ParseError::from_message(
                    ParseErrorKind::TooDeeplyNested,
                    format!("Program too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                ),
                _ => {
                    if position < input.len() {
                        ParseError::with_context(
                            ParseErrorKind::InvalidSyntax,
                            format!("Invalid syntax at position {position}"),
                            input,
                            position,
                        )
                    } else {
                        ParseError::from_message(
                            ParseErrorKind::Incomplete,
                            "Unexpected end of input",
                        )
                    }
                }
            }
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input")
        }
    }
}

/// Parse a numeric literal. The presence of a decimal point or exponent
/// decides the kind; a bare integer never lands on the float stack.
fn parse_number(input: &str) -> IResult<&str, Item> {
    let (remaining, text) = recognize((
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit()),
        opt((char('.'), take_while1(|c: char| c.is_ascii_digit()))),
        opt((
            alt((char('e'), char('E'))),
            opt(alt((char('+'), char('-')))),
            take_while1(|c: char| c.is_ascii_digit()),
        )),
    ))
    .parse(input)?;

    if text.contains(['.', 'e', 'E']) {
        match text.parse::<FloatType>() {
            Ok(x) => Ok((remaining, Item::Float(x))),
            Err(_) => Err(nom::Err::Error(nom::error::Error::new(
                input,
                ErrorKind::Float,
            ))),
        }
    } else {
        match text.parse::<IntType>() {
            Ok(n) => Ok((remaining, Item::Int(n))),
            // Overflow: out of the canonical integer range
            Err(_) => Err(nom::Err::Error(nom::error::Error::new(
                input,
                ErrorKind::Digit,
            ))),
        }
    }
}

/// Parse a char literal: `'a'`, with the escapes `\n \t \r \\ \'`
fn parse_char(input: &str) -> IResult<&str, Item> {
    let (input, _) = char('\'').parse(input)?;
    let mut iter = input.chars();
    let (c, remaining) = match iter.next() {
        Some('\\') => match iter.next() {
            Some('n') => ('\n', iter.as_str()),
            Some('t') => ('\t', iter.as_str()),
            Some('r') => ('\r', iter.as_str()),
            Some('\\') => ('\\', iter.as_str()),
            Some('\'') => ('\'', iter.as_str()),
            _ => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    ErrorKind::Char,
                )));
            }
        },
        Some(c) if c != '\'' => (c, iter.as_str()),
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                ErrorKind::Char,
            )));
        }
    };
    let (remaining, _) = char('\'').parse(remaining)?;
    Ok((remaining, Item::Char(c)))
}

/// Parse a string literal with escape sequences
fn parse_string(input: &str) -> IResult<&str, Item> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = Vec::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                return Ok((char_iter.as_str(), Item::Str(chars.into_iter().collect())));
            }
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    // Unknown or incomplete escape sequence
                    _ => {
                        return Err(nom::Err::Error(nom::error::Error::new(
                            remaining,
                            ErrorKind::Char,
                        )));
                    }
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => {
                // End of input without a closing quote
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    ErrorKind::Char,
                )));
            }
        }
    }
}

/// Parse a bare word: the boolean literals, otherwise an instruction name
fn parse_word(input: &str) -> IResult<&str, Item> {
    let (remaining, candidate) =
        take_while1(|c: char| c.is_alphanumeric() || NAME_SPECIAL_CHARS.contains(c)).parse(input)?;

    match candidate {
        "true" => Ok((remaining, Item::Bool(true))),
        "false" => Ok((remaining, Item::Bool(false))),
        _ if is_valid_name(candidate) => Ok((remaining, Item::Name(candidate.to_owned()))),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Alpha,
        ))),
    }
}

/// One element of a vector literal. Only scalar literals that have a
/// vector stack are allowed; names and nested structures are not.
fn parse_vector_element(input: &str) -> IResult<&str, Item> {
    alt((
        parse_number,
        value(Item::Bool(true), tag("true")),
        value(Item::Bool(false), tag("false")),
        parse_string,
    ))
    .parse(input)
}

enum ElementKind {
    Int,
    Float,
    Bool,
    Str,
}

/// Assemble parsed elements into a homogeneous vector literal, typed by
/// the first element. A mixed vector yields `None`.
fn typed_vector(elements: Vec<Item>) -> Option<VectorLiteral> {
    let kind = match elements.first() {
        None => return Some(VectorLiteral::Empty),
        Some(Item::Int(_)) => ElementKind::Int,
        Some(Item::Float(_)) => ElementKind::Float,
        Some(Item::Bool(_)) => ElementKind::Bool,
        Some(Item::Str(_)) => ElementKind::Str,
        Some(_) => return None,
    };

    match kind {
        ElementKind::Int => {
            let mut out = Vec::with_capacity(elements.len());
            for element in elements {
                match element {
                    Item::Int(n) => out.push(n),
                    _ => return None,
                }
            }
            Some(VectorLiteral::ints(out))
        }
        ElementKind::Float => {
            let mut out = Vec::with_capacity(elements.len());
            for element in elements {
                match element {
                    Item::Float(x) => out.push(x),
                    _ => return None,
                }
            }
            Some(VectorLiteral::floats(out))
        }
        ElementKind::Bool => {
            let mut out = Vec::with_capacity(elements.len());
            for element in elements {
                match element {
                    Item::Bool(b) => out.push(b),
                    _ => return None,
                }
            }
            Some(VectorLiteral::bools(out))
        }
        ElementKind::Str => {
            let mut out = Vec::with_capacity(elements.len());
            for element in elements {
                match element {
                    Item::Str(s) => out.push(s),
                    _ => return None,
                }
            }
            Some(VectorLiteral::strs(out))
        }
    }
}

/// Parse a vector literal: `[1 2 3]`, `[]`, `["a" "b"]`
fn parse_vector(input: &str) -> IResult<&str, Item> {
    let (rest, _) = char('[').parse(input)?;
    let (rest, _) = multispace0.parse(rest)?;
    let (rest, elements) = separated_list0(multispace1, parse_vector_element).parse(rest)?;
    let (rest, _) = multispace0.parse(rest)?;
    let (rest, _) = char(']').parse(rest)?;

    match typed_vector(elements) {
        Some(literal) => Ok((rest, Item::Vector(literal))),
        // Mixed element kinds
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Verify,
        ))),
    }
}

/// Parse a program fragment: `( ... )`
fn parse_block(input: &str, depth: usize) -> IResult<&str, Item> {
    let (input, _) = char('(').parse(input)?;
    let (input, _) = multispace0.parse(input)?;

    let (input, elements) =
        separated_list0(multispace1, |input| parse_item(input, depth + 1)).parse(input)?;

    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char(')').parse(input)?;

    Ok((input, Item::Block(elements)))
}

/// Parse one program element at the given nesting depth
fn parse_item(input: &str, depth: usize) -> IResult<&str, Item> {
    if depth >= MAX_PARSE_DEPTH {
        // Failure, not Error: enclosing combinators must not backtrack
        // over the depth limit
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    preceded(
        multispace0,
        alt((
            |input| parse_block(input, depth),
            parse_vector,
            parse_number,
            parse_char,
            parse_string,
            parse_word,
        )),
    )
    .parse(input)
}

/// Parse a complete program from its textual notation.
pub fn parse_program(input: &str) -> Result<Item, Error> {
    match terminated(|input| parse_item(input, 0), multispace0).parse(input) {
        Ok(("", item)) => Ok(item),
        Ok((remaining, _)) => {
            let position = input.len().saturating_sub(remaining.len());
            Err(Error::ParseError(ParseError::with_context(
                ParseErrorKind::TrailingContent,
                "Trailing content after a complete program",
                input,
                position,
            )))
        }
        Err(e) => Err(Error::ParseError(to_parse_error(input, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{block, lit, name};

    /// Expected outcome of one parse test case
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Item),
        Fails(ParseErrorKind),
    }
    use ParseTestResult::*;

    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{}", i + 1);
            let result = parse_program(input);

            match (result, expected) {
                (Ok(actual), Success(expected_item)) => {
                    assert_eq!(&actual, expected_item, "{test_id}: value mismatch");

                    // Round-trip: display -> parse -> display must be stable
                    let displayed = format!("{actual}");
                    let reparsed = parse_program(&displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
                    });
                    assert_eq!(
                        displayed,
                        format!("{reparsed}"),
                        "{test_id}: round-trip display mismatch for '{input}'"
                    );
                }
                (Err(Error::ParseError(err)), Fails(expected_kind)) => {
                    assert_eq!(
                        &err.kind, expected_kind,
                        "{test_id}: error kind mismatch ({err:?})"
                    );
                }
                (Ok(actual), Fails(kind)) => {
                    panic!("{test_id}: expected {kind:?} error, got {actual:?}");
                }
                (Err(err), Success(_)) => {
                    panic!("{test_id}: expected success, got error {err:?}");
                }
                (Err(err), _) => {
                    panic!("{test_id}: unexpected error variant {err:?}");
                }
            }
        }
    }

    #[test]
    fn test_parser_comprehensive() {
        use ParseErrorKind::*;

        let test_cases = vec![
            // ===== INTEGER LITERALS =====
            ("42", Success(lit(42))),
            ("-5", Success(lit(-5))),
            ("0", Success(lit(0))),
            ("9223372036854775807", Success(lit(i64::MAX))),
            ("-9223372036854775808", Success(lit(i64::MIN))),
            // Out of the canonical range
            ("99999999999999999999", Fails(InvalidSyntax)),
            // ===== FLOAT LITERALS =====
            // The decimal point or exponent decides the kind
            ("2.5", Success(lit(2.5))),
            ("3.0", Success(lit(3.0))),
            ("-0.5", Success(lit(-0.5))),
            ("1e3", Success(lit(1000.0))),
            ("2.5e-1", Success(lit(0.25))),
            // A bare point with no leading digits is not a float; "." is
            // a name character, so this reads as a name
            ("3.", Fails(TrailingContent)),
            (".5", Success(name(".5"))),
            // ===== BOOLEAN LITERALS =====
            ("true", Success(lit(true))),
            ("false", Success(lit(false))),
            // Prefix of a longer word stays a name
            ("truthy", Success(name("truthy"))),
            ("falsey", Success(name("falsey"))),
            // ===== CHAR LITERALS =====
            ("'a'", Success(lit('a'))),
            ("'Z'", Success(lit('Z'))),
            ("' '", Success(lit(' '))),
            (r"'\n'", Success(lit('\n'))),
            (r"'\t'", Success(lit('\t'))),
            (r"'\\'", Success(lit('\\'))),
            (r"'\''", Success(lit('\''))),
            ("'ab'", Fails(InvalidSyntax)),
            ("''", Fails(InvalidSyntax)),
            // ===== STRING LITERALS =====
            ("\"hello\"", Success(lit("hello"))),
            ("\"\"", Success(lit(""))),
            (r#""line\nbreak""#, Success(lit("line\nbreak"))),
            (r#""quote\"inside""#, Success(lit("quote\"inside"))),
            // Unknown escape
            (r#""bad\xescape""#, Fails(InvalidSyntax)),
            // Unterminated
            (r#""open"#, Fails(Incomplete)),
            // ===== NAMES =====
            ("integer_add", Success(name("integer_add"))),
            ("in1", Success(name("in1"))),
            ("exec_if", Success(name("exec_if"))),
            ("zero?", Success(name("zero?"))),
            ("+", Success(name("+"))),
            ("-", Success(name("-"))),
            ("1in", Fails(TrailingContent)),
            // ===== VECTOR LITERALS =====
            ("[]", Success(lit(VectorLiteral::Empty))),
            ("[ ]", Success(lit(VectorLiteral::Empty))),
            ("[1 2 3]", Success(lit(VectorLiteral::ints(vec![1, 2, 3])))),
            ("[-1]", Success(lit(VectorLiteral::ints(vec![-1])))),
            (
                "[1.0 2.5]",
                Success(lit(VectorLiteral::floats(vec![1.0, 2.5]))),
            ),
            (
                "[true false]",
                Success(lit(VectorLiteral::bools(vec![true, false]))),
            ),
            (
                r#"["a" "b"]"#,
                Success(lit(VectorLiteral::strs(vec!["a".to_owned(), "b".to_owned()]))),
            ),
            // Mixed element kinds
            ("[1 2.5]", Fails(InvalidSyntax)),
            ("[1 true]", Fails(InvalidSyntax)),
            // Names are not vector elements
            ("[foo]", Fails(InvalidSyntax)),
            // Nested vectors are not a literal kind
            ("[[1]]", Fails(InvalidSyntax)),
            ("[1 2", Fails(Incomplete)),
            // ===== FRAGMENTS =====
            ("()", Success(block([]))),
            ("(   )", Success(block([]))),
            (
                "(2 3 integer_add)",
                Success(block([lit(2), lit(3), name("integer_add")])),
            ),
            (
                "(true exec_if (1) (2))",
                Success(block([
                    lit(true),
                    name("exec_if"),
                    block([lit(1)]),
                    block([lit(2)]),
                ])),
            ),
            ("(((1)))", Success(block([block([block([lit(1)])])]))),
            (
                "( 1   2\t\n3 )",
                Success(block([lit(1), lit(2), lit(3)])),
            ),
            (
                "([1 2] [] \"s\")",
                Success(block([
                    lit(VectorLiteral::ints(vec![1, 2])),
                    lit(VectorLiteral::Empty),
                    lit("s"),
                ])),
            ),
            // ===== WHITESPACE HANDLING =====
            ("  42  ", Success(lit(42))),
            ("\t(1)\n", Success(block([lit(1)]))),
            // ===== ERROR CASES =====
            ("", Fails(Incomplete)),
            ("   ", Fails(Incomplete)),
            ("(1 2 3", Fails(Incomplete)),
            ("((1 2)", Fails(Incomplete)),
            (")", Fails(InvalidSyntax)),
            ("@invalid", Fails(InvalidSyntax)),
            // Exactly one top-level element
            ("1 2", Fails(TrailingContent)),
            ("1 2 3)", Fails(TrailingContent)),
            ("(1) (2)", Fails(TrailingContent)),
            ("(1 2))", Fails(TrailingContent)),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_parser_depth_limits() {
        let under_limit = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH - 1),
            ")".repeat(MAX_PARSE_DEPTH - 1)
        );
        let at_limit = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH),
            ")".repeat(MAX_PARSE_DEPTH)
        );

        assert!(
            parse_program(&under_limit).is_ok(),
            "nesting just under the depth limit should parse"
        );

        match parse_program(&at_limit) {
            Err(Error::ParseError(err)) => {
                assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested);
            }
            other => panic!("expected depth error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_context_snippet() {
        let input = "(integer_add @bad)";
        match parse_program(input) {
            Err(Error::ParseError(err)) => {
                let context = err.context.expect("context snippet expected");
                assert!(context.contains("@bad"), "context was: {context}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
