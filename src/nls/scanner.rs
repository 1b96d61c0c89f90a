//! A small JavaScript lexer, just enough to find calls of a named function
//! outside of comments and string literals and to read their literal
//! arguments.

use std::ops::Range;

use super::LocalizeKey;

/// A call site, `name (`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Call {
    /// Byte offset of the identifier.
    pub start: usize,
    /// Byte offset of the opening parenthesis.
    pub open: usize,
}

impl Call {
    /// 1-based line of the call.
    pub fn line(&self, source: &str) -> usize {
        source[..self.start].matches('\n').count() + 1
    }
}

/// The literal arguments of a `localize` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalizeCall {
    pub key: LocalizeKey,
    pub message: String,
    /// Span of the key and message arguments.
    pub args: Range<usize>,
}

#[derive(Clone)]
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Skips whitespace and comments.
    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                self.pos += rest.find('\n').unwrap_or(rest.len());
            } else if rest.starts_with("/*") {
                self.pos += rest[2..].find("*/").map_or(rest.len(), |end| end + 4);
            } else if self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn identifier(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// Skips a string literal whose opening quote was already consumed.
    fn skip_string(&mut self, quote: char) {
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '$' if quote == '`' && self.eat('{') => self.skip_substitution(),
                c if c == quote => return,
                '\n' if quote != '`' => return,
                _ => {}
            }
        }
    }

    /// Skips a regular expression literal whose opening slash was already
    /// consumed, flags included.
    fn skip_regex(&mut self) {
        let mut class = false;
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '[' => class = true,
                ']' => class = false,
                '/' if !class => break,
                '\n' => return,
                _ => {}
            }
        }
        self.identifier();
    }

    /// Skips a template substitution up to its closing brace.
    fn skip_substitution(&mut self) {
        let mut depth = 1;
        while let Some(c) = self.peek() {
            if self.rest().starts_with("//") || self.rest().starts_with("/*") {
                self.skip_trivia();
                continue;
            }
            self.bump();
            match c {
                '\'' | '"' | '`' => self.skip_string(c),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    /// Reads a string literal starting at the cursor and returns its value.
    fn string(&mut self) -> Result<String, String> {
        let quote = match self.bump() {
            Some(q @ ('\'' | '"' | '`')) => q,
            _ => return Err("expected a string literal".into()),
        };

        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err("unterminated string literal".into());
            };
            match c {
                c if c == quote => return Ok(value),
                '\n' if quote != '`' => return Err("unterminated string literal".into()),
                '$' if quote == '`' && self.peek() == Some('{') => {
                    return Err("template substitutions are not allowed".into());
                }
                '\\' => self.escape(&mut value)?,
                c => value.push(c),
            }
        }
    }

    fn escape(&mut self, value: &mut String) -> Result<(), String> {
        let Some(c) = self.bump() else {
            return Err("unterminated string literal".into());
        };

        match c {
            'n' => value.push('\n'),
            't' => value.push('\t'),
            'r' => value.push('\r'),
            'b' => value.push('\u{8}'),
            'f' => value.push('\u{c}'),
            'v' => value.push('\u{b}'),
            '0' => value.push('\0'),
            'x' => value.push(self.hex(2)?),
            'u' if self.eat('{') => {
                let end = self.rest().find('}').ok_or("unterminated unicode escape")?;
                let code = &self.rest()[..end];
                let c = u32::from_str_radix(code, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or("invalid unicode escape")?;
                self.pos += end + 1;
                value.push(c);
            }
            'u' => {
                let high = self.hex_code(4)?;
                // surrogate pair
                if (0xD800..0xDC00).contains(&high) && self.rest().starts_with("\\u") {
                    self.pos += 2;
                    let low = self.hex_code(4)?;
                    let code =
                        0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
                    value.push(char::from_u32(code).ok_or("invalid surrogate pair")?);
                } else {
                    value.push(char::from_u32(high).ok_or("invalid unicode escape")?);
                }
            }
            // line continuation
            '\n' => {}
            '\r' => {
                self.eat('\n');
            }
            c => value.push(c),
        }

        Ok(())
    }

    fn hex_code(&mut self, len: usize) -> Result<u32, String> {
        let digits = self.rest().get(..len).ok_or("truncated escape sequence")?;
        let code = u32::from_str_radix(digits, 16).map_err(|_| "invalid escape sequence")?;
        self.pos += len;
        Ok(code)
    }

    fn hex(&mut self, len: usize) -> Result<char, String> {
        let code = self.hex_code(len)?;
        char::from_u32(code).ok_or_else(|| "invalid escape sequence".into())
    }

    /// A string literal or a `+` concatenation of string literals.
    fn concatenation(&mut self) -> Result<String, String> {
        let mut value = self.string()?;
        loop {
            let mut look = self.clone();
            look.skip_trivia();
            if !look.eat('+') {
                return Ok(value);
            }
            look.skip_trivia();
            value.push_str(&look.string()?);
            *self = look;
        }
    }

    /// `{ key: '...', comment: ['...'] }`
    fn key_object(&mut self) -> Result<LocalizeKey, String> {
        self.bump();
        let mut key = None;
        let mut comment = Vec::new();

        loop {
            self.skip_trivia();
            if self.eat('}') {
                break;
            }

            let name = match self.peek() {
                Some('\'' | '"') => self.string()?,
                Some(c) if is_ident_start(c) => self.identifier().to_string(),
                _ => return Err("expected a property name in the key object".into()),
            };

            self.skip_trivia();
            if !self.eat(':') {
                return Err(format!("expected ':' after '{name}'"));
            }
            self.skip_trivia();

            match name.as_str() {
                "key" => key = Some(self.string()?),
                "comment" if self.eat('[') => loop {
                    self.skip_trivia();
                    if self.eat(']') {
                        break;
                    }
                    comment.push(self.string()?);
                    self.skip_trivia();
                    self.eat(',');
                },
                "comment" => comment.push(self.string()?),
                _ => return Err(format!("unexpected property '{name}' in the key object")),
            }

            self.skip_trivia();
            if !self.eat(',') {
                self.skip_trivia();
                if !self.eat('}') {
                    return Err("expected ',' or '}' in the key object".into());
                }
                break;
            }
        }

        let key = key.ok_or("key object without a 'key' property")?;
        Ok(LocalizeKey::Commented { key, comment })
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Keywords after which a slash starts a regular expression literal.
const BEFORE_REGEX: [&str; 13] = [
    "return",
    "typeof",
    "case",
    "do",
    "else",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "instanceof",
    "yield",
];

/// Finds every call of `name` in `source`, skipping comments, string and
/// regular expression literals and function declarations.
pub(crate) fn find_calls(source: &str, name: &str) -> Vec<Call> {
    let mut cursor = Cursor::new(source, 0);
    let mut calls = Vec::new();
    let mut previous = "";
    // whether a `/` here starts a regular expression rather than a division
    let mut operand = true;

    while let Some(c) = cursor.peek() {
        match c {
            '/' if cursor.rest().starts_with("//") || cursor.rest().starts_with("/*") => {
                cursor.skip_trivia();
            }
            '/' => {
                cursor.bump();
                if operand {
                    cursor.skip_regex();
                }
                operand = !operand;
                previous = "";
            }
            '\'' | '"' | '`' => {
                cursor.bump();
                cursor.skip_string(c);
                previous = "";
                operand = false;
            }
            c if is_ident_start(c) => {
                let start = cursor.pos;
                let word = cursor.identifier();

                if word == name && previous != "function" {
                    let mut look = cursor.clone();
                    look.skip_trivia();
                    if look.peek() == Some('(') {
                        calls.push(Call {
                            start,
                            open: look.pos,
                        });
                    }
                }
                previous = word;
                operand = BEFORE_REGEX.contains(&word);
            }
            c if c.is_whitespace() => {
                cursor.bump();
            }
            _ => {
                cursor.bump();
                previous = "";
                operand = !(c.is_alphanumeric() || matches!(c, ')' | ']' | '}'));
            }
        }
    }

    calls
}

/// Reads the key and message of a `localize` call.
pub(crate) fn parse_localize(source: &str, call: Call) -> Result<LocalizeCall, String> {
    let mut cursor = Cursor::new(source, call.open + 1);
    cursor.skip_trivia();
    let start = cursor.pos;

    let key = match cursor.peek() {
        Some('\'' | '"' | '`') => LocalizeKey::Plain(cursor.string()?),
        Some('{') => cursor.key_object()?,
        _ => return Err("the key must be a string literal or an object literal".into()),
    };

    cursor.skip_trivia();
    if !cursor.eat(',') {
        return Err(format!("missing message for key '{}'", key.key()));
    }
    cursor.skip_trivia();

    let message = match cursor.peek() {
        Some('\'' | '"' | '`') => cursor.concatenation()?,
        _ => {
            return Err(format!(
                "the message for key '{}' must be a string literal",
                key.key()
            ));
        }
    };
    let end = cursor.pos;

    cursor.skip_trivia();
    if !matches!(cursor.peek(), Some(',' | ')')) {
        return Err(format!(
            "the message for key '{}' must be a string literal or a concatenation of literals",
            key.key()
        ));
    }

    Ok(LocalizeCall {
        key,
        message,
        args: start..end,
    })
}

/// True if the call has no arguments, `name()`. Returns the offset right
/// after the opening parenthesis.
pub(crate) fn empty_arguments(source: &str, call: Call) -> Option<usize> {
    let mut cursor = Cursor::new(source, call.open + 1);
    cursor.skip_trivia();
    (cursor.peek() == Some(')')).then_some(call.open + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> Result<LocalizeCall, String> {
        let calls = find_calls(source, "localize");
        assert_eq!(calls.len(), 1, "calls in {source:?}");
        parse_localize(source, calls[0])
    }

    #[test]
    fn skips_comments_strings_and_declarations() {
        let source = r#"
            // localize('a', 'b')
            /* localize('c', 'd') */
            const s = "localize('e', 'f')";
            const t = `${ "}" } localize('g', 'h')`;
            function localize(key, message) {}
            mylocalize('i', 'j');
            nls.localize('k', 'l');
            localize ('m', 'n');
        "#;

        let calls = find_calls(source, "localize");
        let keys: Vec<_> = calls
            .iter()
            .map(|&call| parse_localize(source, call).unwrap().key)
            .collect();

        assert_eq!(
            keys,
            vec![
                LocalizeKey::Plain("k".into()),
                LocalizeKey::Plain("m".into()),
            ]
        );
        assert_eq!(calls[0].line(source), 8);
    }

    #[test]
    fn skips_regular_expressions() {
        let source = r#"
            s.replace(/"/g, x); localize('a', 'b');
            const r = [/'[/]/, /`\//]; localize('c', 'd');
            if (/localize('e', 'f')/.test(s)) return /x/i;
            const half = total / 2, third = (total) / 3; localize('g', 'h');
        "#;

        let keys: Vec<_> = find_calls(source, "localize")
            .into_iter()
            .map(|call| parse_localize(source, call).unwrap().key)
            .collect();

        assert_eq!(
            keys,
            vec![
                LocalizeKey::Plain("a".into()),
                LocalizeKey::Plain("c".into()),
                LocalizeKey::Plain("g".into()),
            ]
        );
    }

    #[test]
    fn unescapes_and_concatenates() {
        let source = r#"localize("quote", 'It\'s ' + "a \"test\"\n" /* c */ + `é\u{1F600}`, x)"#;
        let call = single(source).unwrap();
        assert_eq!(call.message, "It's a \"test\"\n\u{e9}\u{1F600}");
    }

    #[test]
    fn key_objects() {
        let source =
            "localize({ key: 'launch', comment: ['{0} is a path', 'keep short'] }, 'Launch {0}', p)";
        let call = single(source).unwrap();

        assert_eq!(
            call.key,
            LocalizeKey::Commented {
                key: "launch".into(),
                comment: vec!["{0} is a path".into(), "keep short".into()]
            }
        );
        assert_eq!(call.message, "Launch {0}");

        let call = single(r#"localize({ "comment": "single", "key": "k", }, "v")"#).unwrap();
        assert_eq!(call.key.comment(), ["single".to_string()]);
    }

    #[test]
    fn argument_span() {
        let source = "x = localize('k', 'a' +\n 'b', 1);";
        let call = single(source).unwrap();
        assert_eq!(&source[call.args.clone()], "'k', 'a' +\n 'b'");
    }

    #[test]
    fn malformed_calls() {
        assert!(single("localize(key, 'message')").is_err());
        assert!(single("localize('key')").is_err());
        assert!(single("localize('key', message)").is_err());
        assert!(single("localize('key', 'a' + b)").is_err());
        assert!(single("localize('key', `a ${b}`)").is_err());
        assert!(single("localize({ comment: [] }, 'a')").is_err());
        assert!(single("localize('key, 'a')").is_err());
    }

    #[test]
    fn empty_argument_lists() {
        let source = "nls.loadMessageBundle( ); nls.loadMessageBundle(file);";
        let calls = find_calls(source, "loadMessageBundle");
        assert_eq!(calls.len(), 2);
        assert_eq!(empty_arguments(source, calls[0]), Some(calls[0].open + 1));
        assert_eq!(empty_arguments(source, calls[1]), None);
    }
}
