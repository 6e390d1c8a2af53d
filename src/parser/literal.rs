//! Static evaluation of Ruby literal expressions into JSON values.
//!
//! Only literals are understood: strings without interpolation, symbols,
//! numbers, `true`/`false`/`nil`, `%w[]`, arrays and hashes (`=>` or
//! `key:` syntax) built from those. Anything else evaluates to `None`.

use serde_json::{Map, Number, Value};

use super::lexer::{Token, TokenKind};

/// Nesting bound for arrays and hashes.
const MAX_NESTING: usize = 128;

/// Evaluate `tokens` as one literal, or `None` if it is not fully static.
#[must_use]
pub fn evaluate(tokens: &[Token]) -> Option<Value> {
    let tokens: Vec<&Token> = tokens.iter().filter(|t| t.kind != TokenKind::Newline).collect();
    let mut cursor = Cursor {
        tokens: &tokens,
        pos: 0,
    };
    let value = cursor.value(0)?;
    (cursor.pos == tokens.len()).then_some(value)
}

struct Cursor<'t> {
    tokens: &'t [&'t Token],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<&TokenKind> {
        let kind = self.tokens.get(self.pos).map(|t| &t.kind);
        self.pos += 1;
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self, depth: usize) -> Option<Value> {
        if depth > MAX_NESTING {
            return None;
        }
        match self.next()?.clone() {
            TokenKind::Str {
                value,
                interpolated: false,
            } => Some(Value::String(value)),
            TokenKind::Symbol(name) => Some(Value::String(name)),
            TokenKind::Number(text) => number(&text, false),
            TokenKind::Op(op) if op == "-" => match self.next()?.clone() {
                TokenKind::Number(text) => number(&text, true),
                _ => None,
            },
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                "nil" => Some(Value::Null),
                _ => None,
            },
            TokenKind::Words(words) => {
                Some(Value::Array(words.into_iter().map(Value::String).collect()))
            }
            TokenKind::LBracket => self.array(depth),
            TokenKind::LBrace => self.hash(depth),
            _ => None,
        }
    }

    fn array(&mut self, depth: usize) -> Option<Value> {
        let mut items = Vec::new();
        loop {
            if self.eat(&TokenKind::RBracket) {
                return Some(Value::Array(items));
            }
            items.push(self.value(depth + 1)?);
            if !self.eat(&TokenKind::Comma) {
                return self.eat(&TokenKind::RBracket).then_some(Value::Array(items));
            }
        }
    }

    fn hash(&mut self, depth: usize) -> Option<Value> {
        let mut map = Map::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                return Some(Value::Object(map));
            }
            let key = match self.next()?.clone() {
                TokenKind::Label(name) => name,
                TokenKind::Str {
                    value,
                    interpolated: false,
                } => {
                    self.separator()?;
                    value
                }
                TokenKind::Symbol(name) | TokenKind::Number(name) => {
                    self.separator()?;
                    name
                }
                _ => return None,
            };
            let value = self.value(depth + 1)?;
            map.insert(key, value);
            if !self.eat(&TokenKind::Comma) {
                return self.eat(&TokenKind::RBrace).then_some(Value::Object(map));
            }
        }
    }

    /// `=>` or the `:` of a quoted label (`'key': value`).
    fn separator(&mut self) -> Option<()> {
        match self.next()? {
            TokenKind::FatArrow => Some(()),
            TokenKind::Op(op) if op == ":" => Some(()),
            _ => None,
        }
    }
}

fn number(text: &str, negative: bool) -> Option<Value> {
    let clean = text.replace('_', "");
    let signed = if negative { format!("-{clean}") } else { clean };
    if let Ok(int) = signed.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    signed.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::tokenize;
    use serde_json::json;

    fn eval(src: &str) -> Option<Value> {
        evaluate(&tokenize(src))
    }

    #[test]
    fn test_scalars() {
        assert_eq!(eval("'x'"), Some(json!("x")));
        assert_eq!(eval(":install"), Some(json!("install")));
        assert_eq!(eval("8_080"), Some(json!(8080)));
        assert_eq!(eval("-1.5"), Some(json!(-1.5)));
        assert_eq!(eval("nil"), Some(Value::Null));
        assert_eq!(eval("true"), Some(json!(true)));
    }

    #[test]
    fn test_collections() {
        assert_eq!(eval("%w(a b)"), Some(json!(["a", "b"])));
        assert_eq!(eval("[1, 'two', :three,]"), Some(json!([1, "two", "three"])));
        assert_eq!(
            eval("{ 'a' => { port: 80 }, :b => [], 'c': nil }"),
            Some(json!({"a": {"port": 80}, "b": [], "c": null}))
        );
    }

    #[test]
    fn test_multiline_hash() {
        assert_eq!(eval("{\n  'x' => 1,\n  'y' => 2\n}"), Some(json!({"x": 1, "y": 2})));
    }

    #[test]
    fn test_hash_preserves_source_order() {
        let value = eval("{ 'b' => {}, 'a' => {} }").unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_non_literals() {
        assert_eq!(eval(r##""#{x}""##), None);
        assert_eq!(eval("node['x']"), None);
        assert_eq!(eval("1 + 2"), None);
        assert_eq!(eval("{ 'a' => foo }"), None);
        assert_eq!(eval(""), None);
    }
}
