use tracing::{instrument, Level};

use crate::ast::{Expr, SliceKind};
use crate::error::{ParseError, ParseErrorKind};

/// Parser state: tracks position in the input string.
///
/// Every `parse_*` method starts at `pos` and leaves `pos` just past the
/// text it consumed, so callers resume exactly where the sub-parser stopped.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

/// Parse a complete expression string into a single tree.
///
/// The whole input must be consumed; any trailing text, even a single
/// space, is an error.
#[instrument(level = Level::TRACE)]
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser { input, pos: 0 };
    if input.is_empty() {
        return Err(parser.error(ParseErrorKind::UnexpectedEnd));
    }

    let expr = parser.parse_expr()?;
    if parser.pos != input.len() {
        return Err(parser.error(ParseErrorKind::UnexpectedToken));
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    // ── Helpers ──────────────────────────────────────────────────────

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn starts_with(&self, s: &str) -> bool {
        self.remaining().starts_with(s)
    }

    fn eat_char(&mut self, ch: char) -> bool {
        if self.peek_char() == Some(ch) {
            self.advance(ch.len_utf8());
            true
        } else {
            false
        }
    }

    fn expect_str(&mut self, s: &'static str) -> Result<(), ParseError> {
        if self.starts_with(s) {
            self.advance(s.len());
            Ok(())
        } else if s.starts_with(self.remaining()) {
            // input ran out part way through `s`
            Err(self.error(ParseErrorKind::UnexpectedEnd))
        } else {
            Err(self.error(ParseErrorKind::Expected(s)))
        }
    }

    /// The unquoted token at the cursor: everything up to the first
    /// terminator or the end of input. Does not advance.
    fn peek_token(&self) -> &'a str {
        let rest = self.remaining();
        match rest.find(is_token_terminator) {
            Some(end) => &rest[..end],
            None => rest,
        }
    }

    fn skip_spaces(&mut self) {
        while self.eat_char(' ') {}
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(kind, self.pos)
    }

    // ── Expression Dispatch ─────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        if self.at_end() {
            return Err(self.error(ParseErrorKind::UnexpectedEnd));
        }

        match self.peek_token() {
            "$eq" => {
                let (left, right) = self.parse_pair("$eq(")?;
                Ok(Expr::Eq(Box::new(left), Box::new(right)))
            }
            "$in" => {
                let (element, collection) = self.parse_pair("$in(")?;
                Ok(Expr::In {
                    element: Box::new(element),
                    collection: Box::new(collection),
                })
            }
            "$and" => {
                self.expect_str("$and(")?;
                self.parse_sequence(')', |p| p.parse_expr()).map(Expr::And)
            }
            "$or" => {
                self.expect_str("$or(")?;
                self.parse_sequence(')', |p| p.parse_expr()).map(Expr::Or)
            }
            _ => self.parse_non_operator(),
        }
    }

    /// `prefix expr "," ws expr ")"`
    fn parse_pair(&mut self, prefix: &'static str) -> Result<(Expr, Expr), ParseError> {
        self.expect_str(prefix)?;
        let left = self.parse_expr()?;
        self.expect_str(",")?;
        self.skip_spaces();
        let right = self.parse_expr()?;
        self.expect_str(")")?;
        Ok((left, right))
    }

    // ── Literals & References ───────────────────────────────────────

    fn parse_non_operator(&mut self) -> Result<Expr, ParseError> {
        match self.peek_char() {
            None => Err(self.error(ParseErrorKind::UnexpectedEnd)),
            Some('\'') => self.parse_string().map(Expr::Str),
            Some(ch) if ch.is_ascii_digit() => self.parse_uint().map(Expr::Uint),
            Some('[') => self.parse_slice(),
            Some(_) => self.parse_reference(),
        }
    }

    /// `'...'` with no escape mechanism.
    fn parse_string(&mut self) -> Result<String, ParseError> {
        let begin = self.pos;
        self.advance(1);
        match self.remaining().find('\'') {
            Some(end) => {
                let value = self.remaining()[..end].to_string();
                self.advance(end + 1);
                Ok(value)
            }
            None => Err(ParseError::new(ParseErrorKind::UnterminatedString, begin)),
        }
    }

    fn parse_uint(&mut self) -> Result<u32, ParseError> {
        let token = self.peek_token();
        if let Some(bad) = token.find(|ch: char| !ch.is_ascii_digit()) {
            return Err(ParseError::new(ParseErrorKind::ExpectedDigit, self.pos + bad));
        }
        let value = token
            .parse::<u32>()
            .map_err(|_| self.error(ParseErrorKind::InvalidInteger(token.to_string())))?;
        self.advance(token.len());
        Ok(value)
    }

    fn parse_slice(&mut self) -> Result<Expr, ParseError> {
        let kind = [SliceKind::Bool, SliceKind::Str, SliceKind::Uint]
            .into_iter()
            .find(|kind| self.starts_with(kind.prefix()))
            .ok_or_else(|| self.error(ParseErrorKind::ExpectedSliceType))?;
        self.advance(kind.prefix().len());

        let expected = kind.element_kind();
        let elements = self.parse_sequence('}', |p| {
            let begin = p.pos;
            let element = p.parse_expr()?;
            match element.literal_kind() {
                Some(found) if found != expected => Err(ParseError::new(
                    ParseErrorKind::SliceElementKind(expected),
                    begin,
                )),
                _ => Ok(element),
            }
        })?;
        Ok(Expr::Slice { kind, elements })
    }

    /// `true`, `false`, `name` or `name.field`.
    fn parse_reference(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek_token();
        let expr = match token {
            "" => return Err(self.error(ParseErrorKind::UnexpectedToken)),
            "true" => Expr::True,
            "false" => Expr::False,
            _ if token.contains('.') => {
                let mut parts = token.split('.');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(var), Some(field), None) if !var.is_empty() && !field.is_empty() => {
                        Expr::Field {
                            var: var.to_string(),
                            field: field.to_string(),
                        }
                    }
                    _ => {
                        return Err(
                            self.error(ParseErrorKind::InvalidFieldRef(token.to_string()))
                        )
                    }
                }
            }
            _ => Expr::Var(token.to_string()),
        };
        self.advance(token.len());
        Ok(expr)
    }

    // ── Sequences ───────────────────────────────────────────────────

    /// Zero or more elements separated by `,` plus optional spaces, ending
    /// at `close`. A comma must be followed by another element, so
    /// `(true,)` and `(true, )` are both rejected.
    fn parse_sequence(
        &mut self,
        close: char,
        mut parse_element: impl FnMut(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Vec<Expr>, ParseError> {
        let mut elements = Vec::new();
        if self.eat_char(close) {
            return Ok(elements);
        }

        loop {
            elements.push(parse_element(self)?);
            match self.peek_char() {
                None => return Err(self.error(ParseErrorKind::UnexpectedEnd)),
                Some(ch) if ch == close => {
                    self.advance(ch.len_utf8());
                    return Ok(elements);
                }
                Some(',') => {
                    self.advance(1);
                    self.skip_spaces();
                    match self.peek_char() {
                        None => return Err(self.error(ParseErrorKind::UnexpectedEnd)),
                        Some(ch) if ch == close || ch == ',' => {
                            return Err(self.error(ParseErrorKind::InvalidSequenceTerminator))
                        }
                        Some(_) => {}
                    }
                }
                Some(_) => return Err(self.error(ParseErrorKind::UnexpectedToken)),
            }
        }
    }
}

/// Characters that end an unquoted token.
fn is_token_terminator(ch: char) -> bool {
    matches!(ch, ' ' | ',' | ')' | '(' | '}')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err_kind(input: &str) -> ParseErrorKind {
        parse(input).unwrap_err().kind
    }

    #[test]
    fn literals() {
        assert_eq!(parse("true"), Ok(Expr::True));
        assert_eq!(parse("false"), Ok(Expr::False));
        assert_eq!(parse("'foo'"), Ok(Expr::Str("foo".to_string())));
        assert_eq!(parse("''"), Ok(Expr::Str(String::new())));
        assert_eq!(parse("123"), Ok(Expr::Uint(123)));
        assert_eq!(parse("4294967295"), Ok(Expr::Uint(u32::MAX)));
    }

    #[test]
    fn string_may_contain_terminators() {
        assert_eq!(parse("'a, (b)}'"), Ok(Expr::Str("a, (b)}".to_string())));
    }

    #[test]
    fn keywords_must_be_whole_tokens() {
        assert_eq!(parse("trueish"), Ok(Expr::Var("trueish".to_string())));
        assert_eq!(parse("falsey"), Ok(Expr::Var("falsey".to_string())));
    }

    #[test]
    fn integer_errors() {
        assert_eq!(
            err_kind("4294967296"),
            ParseErrorKind::InvalidInteger("4294967296".to_string())
        );
        let err = parse("12a").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedDigit);
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn unterminated_string_points_at_opening_quote() {
        let err = parse("$eq(a, 'foo)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);
        assert_eq!(err.offset, 7);
    }

    #[test]
    fn trailing_input_is_rejected() {
        for input in ["true ", "true,", "'foo' ", "123 ", "foo(", "$and() ", "$eq(true, true),"] {
            assert!(parse(input).is_err(), "{input:?} should not parse");
        }
        let err = parse("true ").unwrap_err();
        assert_eq!(err, ParseError::new(ParseErrorKind::UnexpectedToken, 4));
    }

    #[test]
    fn empty_input() {
        assert_eq!(err_kind(""), ParseErrorKind::UnexpectedEnd);
        assert_eq!(err_kind("$eq("), ParseErrorKind::UnexpectedEnd);
        assert_eq!(err_kind("$and(true"), ParseErrorKind::UnexpectedEnd);
    }

    #[test]
    fn operator_requires_open_paren() {
        assert_eq!(err_kind("$eq"), ParseErrorKind::UnexpectedEnd);
        assert_eq!(err_kind("$eq true"), ParseErrorKind::Expected("$eq("));
    }

    #[test]
    fn pair_allows_any_spaces_after_comma() {
        let want = Expr::Eq(Box::new(Expr::Var("a".to_string())), Box::new(Expr::True));
        assert_eq!(parse("$eq(a,true)"), Ok(want.clone()));
        assert_eq!(parse("$eq(a,   true)"), Ok(want));
        assert_eq!(err_kind("$eq(a ,true)"), ParseErrorKind::Expected(","));
        assert_eq!(err_kind("$eq(a, true )"), ParseErrorKind::Expected(")"));
    }

    #[test]
    fn sequences() {
        assert_eq!(parse("$and()"), Ok(Expr::And(Vec::new())));
        assert_eq!(parse("$or()"), Ok(Expr::Or(Vec::new())));
        assert_eq!(parse("$or(x)"), Ok(Expr::Or(vec![Expr::Var("x".to_string())])));
        assert_eq!(
            parse("$and(true,false)"),
            Ok(Expr::And(vec![Expr::True, Expr::False]))
        );
        assert_eq!(err_kind("$and(true,)"), ParseErrorKind::InvalidSequenceTerminator);
        assert_eq!(err_kind("$and(true, )"), ParseErrorKind::InvalidSequenceTerminator);
        assert_eq!(err_kind("$and(true,,false)"), ParseErrorKind::InvalidSequenceTerminator);
        assert_eq!(err_kind("$and( true)"), ParseErrorKind::UnexpectedToken);
        assert_eq!(err_kind("$and(true )"), ParseErrorKind::UnexpectedToken);
    }

    #[test]
    fn nested_operators() {
        let parsed = parse("$or($eq(a.b, 'x'), $in(c, []uint{1, 2}), $and())").unwrap();
        assert_eq!(
            parsed,
            Expr::Or(vec![
                Expr::Eq(
                    Box::new(Expr::Field {
                        var: "a".to_string(),
                        field: "b".to_string()
                    }),
                    Box::new(Expr::Str("x".to_string())),
                ),
                Expr::In {
                    element: Box::new(Expr::Var("c".to_string())),
                    collection: Box::new(Expr::Slice {
                        kind: SliceKind::Uint,
                        elements: vec![Expr::Uint(1), Expr::Uint(2)],
                    }),
                },
                Expr::And(Vec::new()),
            ])
        );
    }

    #[test]
    fn slice_literals() {
        assert_eq!(
            parse("[]string{'foo', 'bar'}"),
            Ok(Expr::Slice {
                kind: SliceKind::Str,
                elements: vec![Expr::Str("foo".to_string()), Expr::Str("bar".to_string())],
            })
        );
        assert_eq!(
            parse("[]bool{}"),
            Ok(Expr::Slice {
                kind: SliceKind::Bool,
                elements: Vec::new(),
            })
        );
        assert_eq!(
            parse("[]uint{n}"),
            Ok(Expr::Slice {
                kind: SliceKind::Uint,
                elements: vec![Expr::Var("n".to_string())],
            })
        );
        assert_eq!(err_kind("[]str{'a'}"), ParseErrorKind::ExpectedSliceType);
        assert_eq!(err_kind("[1]"), ParseErrorKind::ExpectedSliceType);
        assert_eq!(err_kind("[]uint{123,}"), ParseErrorKind::InvalidSequenceTerminator);
        assert_eq!(err_kind("[]uint{123"), ParseErrorKind::UnexpectedEnd);
    }

    #[test]
    fn slice_literal_element_kinds() {
        use crate::value::Kind;

        assert_eq!(err_kind("[]bool{1}"), ParseErrorKind::SliceElementKind(Kind::Bool));
        assert_eq!(err_kind("[]bool{'hello'}"), ParseErrorKind::SliceElementKind(Kind::Bool));
        assert_eq!(err_kind("[]string{true}"), ParseErrorKind::SliceElementKind(Kind::Str));
        assert_eq!(err_kind("[]uint{'foo'}"), ParseErrorKind::SliceElementKind(Kind::Uint));
        assert_eq!(err_kind("[]uint{[]uint{}}"), ParseErrorKind::SliceElementKind(Kind::Uint));
    }

    #[test]
    fn field_references() {
        assert_eq!(
            parse("request.UserId"),
            Ok(Expr::Field {
                var: "request".to_string(),
                field: "UserId".to_string(),
            })
        );
        for input in ["a.b.c", "a.", ".b", "."] {
            assert!(
                matches!(err_kind(input), ParseErrorKind::InvalidFieldRef(_)),
                "{input:?}"
            );
        }
    }

    #[test]
    fn display_round_trips() {
        for input in [
            "true",
            "'a b'",
            "42",
            "[]bool{true, false}",
            "[]string{}",
            "$eq(obj.Value, true)",
            "$in(x, []uint{1, 2, 3})",
            "$and($or(a, b), $and(), 'x')",
        ] {
            let parsed = parse(input).unwrap();
            assert_eq!(parsed.to_string(), input);
            assert_eq!(parse(&parsed.to_string()), Ok(parsed));
        }
    }
}
