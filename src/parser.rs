use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char, digit0, digit1, multispace1, satisfy},
    combinator::{cut, opt, recognize, value},
    error::ErrorKind as NomErrorKind,
    multi::many0,
    sequence::{pair, preceded, terminated},
};

use crate::Error;
use crate::ast::{FloatType, IntType, Value, is_symbol_char};

/// Parse a `;` comment up to (not including) the end of the line
fn parse_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_while(|c: char| c != '\n'))).parse(input)
}

/// Skip any run of whitespace and comments
fn skip_trivia(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, parse_comment)))).parse(input)
}

/// Parse a number: optional `-`, digits, and an optional fraction selecting float
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (remaining, text) =
        recognize((opt(char('-')), digit1, opt(pair(char('.'), digit0)))).parse(input)?;

    let number = if text.contains('.') {
        text.parse::<FloatType>().ok().map(Value::Float)
    } else {
        // Integers too large for i64 are still numbers
        text.parse::<IntType>()
            .map(Value::Int)
            .or_else(|_| text.parse::<FloatType>().map(Value::Float))
            .ok()
    };

    match number {
        Some(number) => Ok((remaining, number)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            NomErrorKind::Float,
        ))),
    }
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    // Once the opening quote is consumed, failures are not recoverable
    let unterminated = || {
        nom::Err::Failure(nom::error::Error::new(input, NomErrorKind::Char))
    };

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::String(text))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    // Unknown escapes are kept as written
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => return Err(unterminated()),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            None => return Err(unterminated()),
        }
    }
}

/// Parse the unit literal `@`
fn parse_unit(input: &str) -> IResult<&str, Value> {
    value(Value::Unit, char('@')).parse(input)
}

/// Parse an atom; digits may follow the first character
fn parse_atom(input: &str) -> IResult<&str, Value> {
    let (remaining, name) = recognize(pair(
        satisfy(is_symbol_char),
        take_while(|c: char| (is_symbol_char(c) || c.is_alphanumeric()) && c != ';'),
    ))
    .parse(input)?;
    Ok((remaining, Value::Atom(name.to_owned())))
}

/// Parse a list; once `(` is seen the closing `)` is required
fn parse_list(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('(').parse(input)?;
    let (input, elements) = many0(preceded(skip_trivia, parse_expr)).parse(input)?;
    let (input, _) = skip_trivia(input)?;
    let (input, _) = cut(char(')')).parse(input)?;
    Ok((input, Value::List(elements)))
}

/// Parse quoted expression ('expr -> Quote(expr))
fn parse_quote(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = preceded(skip_trivia, parse_expr).parse(input)?;
    Ok((input, Value::quote(expr)))
}

/// Parse one expression starting exactly at `input`
fn parse_expr(input: &str) -> IResult<&str, Value> {
    alt((
        parse_quote,
        parse_list,
        parse_number,
        parse_string,
        parse_unit,
        parse_atom,
    ))
    .parse(input)
}

/// Build a malformed-program error pointing at the unparsed `rest` of `source`
fn malformed_at(source: &str, rest: &str) -> Error {
    let byte_offset = source.len().saturating_sub(rest.len());
    let char_offset = source
        .get(..byte_offset)
        .map_or(0, |consumed| consumed.chars().count());
    Error::malformed(source, char_offset)
}

/// Parse a complete program into its top-level forms.
///
/// Whitespace and `;` comments may appear between any two tokens. Empty or
/// comment-only input yields no forms. Any text that cannot be read, including
/// an unterminated string or list, is a `MalformedProgram` error whose cause is
/// a snippet of the source around the failure.
pub fn parse(source: &str) -> Result<Vec<Value>, Error> {
    let result = terminated(many0(preceded(skip_trivia, parse_expr)), skip_trivia).parse(source);

    match result {
        Ok(("", forms)) => Ok(forms),
        Ok((rest, _)) => Err(malformed_at(source, rest)),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(malformed_at(source, e.input)),
        Err(nom::Err::Incomplete(_)) => Err(malformed_at(source, "")),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::ast::{atom, nil, val};

    /// Test result variants for comprehensive parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Vec<Value>), // Parsing should succeed with these top-level forms
        Malformed,           // Parsing should fail with MalformedProgram
    }
    use ParseTestResult::*;

    /// Helper for a single successfully parsed form
    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(vec![value.into()])
    }

    /// Run parse tests with round-trip validation
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{}", i + 1);
            let result = parse(input);

            match (result, expected) {
                (Ok(actual), Success(expected_forms)) => {
                    assert_eq!(actual, *expected_forms, "{test_id}: value mismatch for '{input}'");

                    // Round-trip: debug -> parse -> debug should be identical
                    for form in &actual {
                        let rendered = form.debug();
                        let reparsed = parse(&rendered).unwrap_or_else(|e| {
                            panic!("{test_id}: round-trip parse failed for '{rendered}': {e}")
                        });
                        let rerendered: Vec<String> = reparsed.iter().map(Value::debug).collect();
                        assert_eq!(
                            vec![rendered],
                            rerendered,
                            "{test_id}: round-trip mismatch for '{input}'"
                        );
                    }
                }
                (Err(e), Malformed) => {
                    assert_eq!(e.kind, ErrorKind::MalformedProgram, "{test_id}");
                }
                (Ok(actual), Malformed) => {
                    panic!("{test_id}: expected error for '{input}', got {actual:?}");
                }
                (Err(e), Success(expected_forms)) => {
                    panic!("{test_id}: expected {expected_forms:?} for '{input}', got error {e}");
                }
            }
        }
    }

    #[test]
    fn test_parse_comprehensive() {
        let test_cases = vec![
            // === NUMBERS ===
            ("42", success(42)),
            ("-7", success(-7)),
            ("0", success(0)),
            ("3.25", success(3.25)),
            ("-0.5", success(-0.5)),
            ("-0.0", success(-0.0)),
            ("1.", success(1.0)),
            ("9223372036854775807", success(i64::MAX)),
            ("99999999999999999999", success(1e20)),
            // === STRINGS ===
            ("\"hello\"", success("hello")),
            ("\"\"", success("")),
            ("\"a\\nb\"", success("a\nb")),
            ("\"tab\\there\"", success("tab\there")),
            ("\"say \\\"hi\\\"\"", success("say \"hi\"")),
            ("\"back\\\\slash\"", success("back\\slash")),
            ("\"odd\\qescape\"", success("odd\\qescape")),
            ("\"multi\nline\"", success("multi\nline")),
            // === UNIT AND ATOMS ===
            ("@", success(Value::Unit)),
            ("foo", success(atom("foo"))),
            ("-", success(atom("-"))),
            ("-x", success(atom("-x"))),
            ("a1", success(atom("a1"))),
            ("read-file", success(atom("read-file"))),
            ("!=", success(atom("!="))),
            ("<=", success(atom("<="))),
            // === QUOTES ===
            ("'x", success(Value::quote(atom("x")))),
            ("' x", success(Value::quote(atom("x")))),
            ("'(1 2)", success(Value::quote(val([1, 2])))),
            ("''x", success(Value::quote(Value::quote(atom("x"))))),
            // === LISTS ===
            ("()", success(nil())),
            ("(+ 1 2)", success(vec![atom("+"), val(1), val(2)])),
            (
                "( 1 ( 2 ) )",
                success(vec![val(1), val(vec![val(2)])]),
            ),
            (
                "(define x \"s\")",
                success(vec![atom("define"), atom("x"), val("s")]),
            ),
            ("(a;comment\n b)", success(vec![atom("a"), atom("b")])),
            // === MULTIPLE FORMS AND TRIVIA ===
            ("1 2 3", Success(vec![val(1), val(2), val(3)])),
            (
                "(a) ; comment\n(b)",
                Success(vec![val(vec![atom("a")]), val(vec![atom("b")])]),
            ),
            ("; one\n; two\n42", success(42)),
            ("42 ; trailing", success(42)),
            ("", Success(vec![])),
            ("   \n\t", Success(vec![])),
            (";only a comment", Success(vec![])),
            // === MALFORMED PROGRAMS ===
            ("(1 2", Malformed),
            ("(", Malformed),
            (")", Malformed),
            ("(a))", Malformed),
            ("\"unterminated", Malformed),
            ("\"ends in escape\\", Malformed),
            ("'", Malformed),
            ("(quote ')", Malformed),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_malformed_error_context() {
        let source = "(define greeting \"hello) (print greeting)";
        let err = parse(source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedProgram);
        let Value::String(snippet) = *err.cause else {
            panic!("expected string snippet, got {:?}", err.cause);
        };
        assert!(snippet.contains("\"hello"), "snippet was {snippet:?}");
        assert!(snippet.starts_with("[...]"));

        let err = parse("(+ 1 2))").unwrap_err();
        assert_eq!(*err.cause, val("(+ 1 2))"));
    }
}
