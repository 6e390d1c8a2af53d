//! Tokenizer for the Ruby-syntax recipe DSL.
//!
//! Produces a flat token stream with 1-based line numbers and byte spans
//! into the source. Comments, `=begin`/`=end` blocks and everything after
//! `__END__` are dropped. Heredoc bodies are folded into the string token of
//! their opener, so the lines of a heredoc never show up as statements.
//!
//! The lexer never fails: anything it does not understand becomes an
//! [`TokenKind::Op`] token.

/// Token kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword; may end with `?` or `!`, may start with `@`/`$`
    Ident(String),
    /// Capitalized name (`File`, `Chef`)
    Constant(String),
    /// `:name` or `:"name"`
    Symbol(String),
    /// `name:` hash key
    Label(String),
    /// String literal (quoted, `%q`/`%Q`, backtick or heredoc)
    Str {
        /// Unescaped contents; interpolations are kept verbatim
        value: String,
        /// Contains `#{...}`
        interpolated: bool,
    },
    /// `%w[...]` / `%i[...]`
    Words(Vec<String>),
    /// `/.../` or `%r{...}`
    Regex(String),
    /// Integer or float literal, as written
    Number(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    /// `&.`
    SafeNav,
    /// `::`
    DoubleColon,
    Pipe,
    Semicolon,
    Newline,
    /// `=>`
    FatArrow,
    /// `=`
    Assign,
    /// `+=`, `||=`, `<<=` and friends
    OpAssign(String),
    /// Any other operator
    Op(String),
}

/// A token with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based line of the first character
    pub line: usize,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
}

impl Token {
    /// Whether this is the identifier/keyword `word`.
    #[must_use]
    pub fn is_ident(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(s) if s == word)
    }

    /// Identifier text, if this is an identifier.
    #[must_use]
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s),
            _ => None,
        }
    }
}

struct PendingHeredoc {
    token_index: usize,
    terminator: String,
    squiggly: bool,
    dash: bool,
    raw: bool,
}

/// Tokenizer state.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    heredocs: Vec<PendingHeredoc>,
}

const OPERATORS: &[&str] = &[
    "**=", "<=>", "===", "...", "||=", "&&=", "<<=", ">>=", "==", "!=", "=~", "!~", ">=", "<=",
    "&&", "||", "<<", ">>", "**", "+=", "-=", "*=", "/=", "%=", "|=", "&=", "^=", "..", "->",
    "+", "-", "*", "/", "%", "<", ">", "!", "&", "^", "~", "?", ":",
];

impl<'a> Lexer<'a> {
    /// Create a lexer over `src`.
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            tokens: Vec::new(),
            heredocs: Vec::new(),
        }
    }

    /// Tokenize the whole source.
    #[must_use]
    pub fn tokenize(mut self) -> Vec<Token> {
        while self.pos < self.src.len() {
            self.next_token();
        }
        self.tokens
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.src[..self.pos].ends_with('\n')
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize) {
        self.tokens.push(Token {
            kind,
            line,
            start,
            end: self.pos,
        });
    }

    fn last_kind(&self) -> Option<&TokenKind> {
        self.tokens.last().map(|t| &t.kind)
    }

    /// Whether the previous token leaves the parser expecting a value, which
    /// decides between `/` as division and `/` as a regex opener.
    fn expects_value(&self) -> bool {
        match self.last_kind() {
            None => true,
            Some(
                TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::Comma
                | TokenKind::FatArrow
                | TokenKind::Assign
                | TokenKind::OpAssign(_)
                | TokenKind::Op(_)
                | TokenKind::Pipe
                | TokenKind::Label(_),
            ) => true,
            Some(TokenKind::Ident(word)) => matches!(
                word.as_str(),
                "if" | "unless" | "when" | "and" | "or" | "not" | "return" | "while" | "until"
            ),
            _ => false,
        }
    }

    fn next_token(&mut self) {
        let Some(ch) = self.peek() else {
            return;
        };

        if self.at_line_start() {
            if self.rest().starts_with("=begin") {
                self.skip_block_comment();
                return;
            }
            if self.rest().starts_with("__END__") {
                self.pos = self.src.len();
                return;
            }
        }

        let start = self.pos;
        let line = self.line;

        match ch {
            ' ' | '\t' | '\r' => {
                self.bump();
            }
            '\\' if self.peek_at(1) == Some('\n') => {
                self.bump();
                self.bump();
            }
            '\n' => {
                self.bump();
                self.push(TokenKind::Newline, start, line);
                if !self.heredocs.is_empty() {
                    self.read_heredoc_bodies();
                }
            }
            '#' => {
                while let Some(c) = self.peek()
                    && c != '\n'
                {
                    self.bump();
                }
            }
            '"' | '`' => {
                self.bump();
                let (value, interpolated) = self.read_quoted(ch, true);
                self.push(
                    TokenKind::Str {
                        value,
                        interpolated,
                    },
                    start,
                    line,
                );
            }
            '\'' => {
                self.bump();
                let (value, _) = self.read_quoted('\'', false);
                self.push(
                    TokenKind::Str {
                        value,
                        interpolated: false,
                    },
                    start,
                    line,
                );
            }
            '%' if self.percent_literal_ahead() => self.read_percent_literal(start, line),
            '<' if self.rest().starts_with("<<") && self.heredoc_ahead() => {
                self.read_heredoc_opener(start, line);
            }
            '/' if self.expects_value() => {
                self.bump();
                let (value, _) = self.read_quoted('/', true);
                while let Some(c) = self.peek()
                    && c.is_ascii_alphabetic()
                {
                    self.bump();
                }
                self.push(TokenKind::Regex(value), start, line);
            }
            ':' if self.peek_at(1) == Some(':') => {
                self.bump();
                self.bump();
                self.push(TokenKind::DoubleColon, start, line);
            }
            ':' if matches!(self.peek_at(1), Some('"' | '\'')) => {
                self.bump();
                let quote = self.bump().unwrap_or('"');
                let (value, _) = self.read_quoted(quote, quote == '"');
                self.push(TokenKind::Symbol(value), start, line);
            }
            ':' if self.peek_at(1).is_some_and(|c| c.is_alphabetic() || c == '_') => {
                self.bump();
                let name = self.read_word();
                self.push(TokenKind::Symbol(name), start, line);
            }
            c if c.is_ascii_digit() => {
                let number = self.read_number();
                self.push(TokenKind::Number(number), start, line);
            }
            c if c.is_alphabetic() || c == '_' || c == '@' || c == '$' => {
                let word = self.read_word();
                if self.peek() == Some(':')
                    && self.peek_at(1) != Some(':')
                    && !word.starts_with(['@', '$'])
                    && !word.ends_with('?')
                {
                    self.bump();
                    self.push(TokenKind::Label(word), start, line);
                } else if word.starts_with(|c: char| c.is_uppercase()) {
                    self.push(TokenKind::Constant(word), start, line);
                } else {
                    self.push(TokenKind::Ident(word), start, line);
                }
            }
            '(' => self.single(TokenKind::LParen, start, line),
            ')' => self.single(TokenKind::RParen, start, line),
            '[' => self.single(TokenKind::LBracket, start, line),
            ']' => self.single(TokenKind::RBracket, start, line),
            '{' => self.single(TokenKind::LBrace, start, line),
            '}' => self.single(TokenKind::RBrace, start, line),
            ',' => self.single(TokenKind::Comma, start, line),
            ';' => self.single(TokenKind::Semicolon, start, line),
            '&' if self.peek_at(1) == Some('.') => {
                self.bump();
                self.bump();
                self.push(TokenKind::SafeNav, start, line);
            }
            '.' if self.peek_at(1) != Some('.') => self.single(TokenKind::Dot, start, line),
            '=' if self.peek_at(1) == Some('>') => {
                self.bump();
                self.bump();
                self.push(TokenKind::FatArrow, start, line);
            }
            '=' if !matches!(self.peek_at(1), Some('=' | '~')) => {
                self.single(TokenKind::Assign, start, line);
            }
            '|' if !matches!(self.peek_at(1), Some('|' | '=')) => {
                self.single(TokenKind::Pipe, start, line);
            }
            _ => self.read_operator(start, line),
        }
    }

    fn single(&mut self, kind: TokenKind, start: usize, line: usize) {
        self.bump();
        self.push(kind, start, line);
    }

    fn read_operator(&mut self, start: usize, line: usize) {
        let rest = self.rest();
        let op = OPERATORS.iter().find(|op| rest.starts_with(**op)).copied();
        match op {
            Some(op) => {
                for _ in op.chars() {
                    self.bump();
                }
                let kind = if op.len() > 1 && op.ends_with('=') && !is_comparison(op) {
                    TokenKind::OpAssign(op.to_string())
                } else {
                    TokenKind::Op(op.to_string())
                };
                self.push(kind, start, line);
            }
            None => {
                let ch = self.bump().unwrap_or_default();
                self.push(TokenKind::Op(ch.to_string()), start, line);
            }
        }
    }

    fn skip_block_comment(&mut self) {
        while self.pos < self.src.len() {
            let at_end = self.at_line_start() && self.rest().starts_with("=end");
            while let Some(c) = self.bump() {
                if c == '\n' {
                    break;
                }
            }
            if at_end {
                break;
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        if let Some(c @ ('@' | '$')) = self.peek() {
            word.push(c);
            self.bump();
            if self.peek() == Some('@') {
                word.push('@');
                self.bump();
            }
        }
        while let Some(c) = self.peek()
            && (c.is_alphanumeric() || c == '_')
        {
            word.push(c);
            self.bump();
        }
        if let Some(c @ ('?' | '!')) = self.peek()
            && self.peek_at(1) != Some('=')
            && !(c == '?' && self.peek_at(1) == Some(':'))
        {
            word.push(c);
            self.bump();
        }
        word
    }

    fn read_number(&mut self) -> String {
        let mut number = String::new();
        while let Some(c) = self.peek() {
            let continues = c.is_ascii_alphanumeric()
                || c == '_'
                || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()));
            if !continues {
                break;
            }
            number.push(c);
            self.bump();
        }
        number
    }

    /// Read until the unescaped `close` delimiter; the opener is consumed.
    fn read_quoted(&mut self, close: char, escapes: bool) -> (String, bool) {
        self.read_delimited(None, close, escapes)
    }

    fn read_delimited(&mut self, open: Option<char>, close: char, escapes: bool) -> (String, bool) {
        let mut value = String::new();
        let mut interpolated = false;
        let mut nesting = 0usize;

        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    let Some(next) = self.bump() else { break };
                    if escapes {
                        value.push(match next {
                            'n' => '\n',
                            't' => '\t',
                            's' => ' ',
                            '0' => '\0',
                            other => other,
                        });
                    } else if next == close || next == '\\' {
                        value.push(next);
                    } else {
                        value.push('\\');
                        value.push(next);
                    }
                }
                '#' if escapes && self.peek() == Some('{') => {
                    interpolated = true;
                    value.push('#');
                    value.push_str(&self.read_interpolation());
                }
                c if Some(c) == open => {
                    nesting += 1;
                    value.push(c);
                }
                c if c == close => {
                    if nesting == 0 {
                        break;
                    }
                    nesting -= 1;
                    value.push(c);
                }
                c => value.push(c),
            }
        }
        (value, interpolated)
    }

    /// Consume `{ ... }` of an interpolation, returning it verbatim.
    fn read_interpolation(&mut self) -> String {
        let mut text = String::new();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        while let Some(c) = self.bump() {
            text.push(c);
            match (quote, c) {
                (Some(_), '\\') => {
                    if let Some(n) = self.bump() {
                        text.push(n);
                    }
                }
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '{') => depth += 1,
                (None, '}') => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        text
    }

    fn percent_literal_ahead(&self) -> bool {
        if !self.expects_value() && !matches!(self.last_kind(), Some(TokenKind::Ident(_))) {
            return false;
        }
        match (self.peek_at(1), self.peek_at(2)) {
            (Some('w' | 'W' | 'i' | 'I' | 'q' | 'Q' | 'r'), Some(d)) => is_percent_delimiter(d),
            (Some(d), _) => matches!(d, '(' | '[' | '{' | '<' | '|' | '!'),
            _ => false,
        }
    }

    fn read_percent_literal(&mut self, start: usize, line: usize) {
        self.bump();
        let kind = match self.peek() {
            Some(c @ ('w' | 'W' | 'i' | 'I' | 'q' | 'Q' | 'r')) => {
                self.bump();
                c
            }
            _ => 'Q',
        };
        let open = self.bump().unwrap_or('(');
        let close = match open {
            '(' => ')',
            '[' => ']',
            '{' => '}',
            '<' => '>',
            other => other,
        };
        let nest = (open != close).then_some(open);
        let escapes = matches!(kind, 'Q' | 'W' | 'I' | 'r');
        let (value, interpolated) = self.read_delimited(nest, close, escapes);

        let token = match kind {
            'w' | 'W' | 'i' | 'I' => {
                TokenKind::Words(value.split_whitespace().map(str::to_string).collect())
            }
            'r' => {
                while let Some(c) = self.peek()
                    && c.is_ascii_alphabetic()
                {
                    self.bump();
                }
                TokenKind::Regex(value)
            }
            _ => TokenKind::Str {
                value,
                interpolated,
            },
        };
        self.push(token, start, line);
    }

    fn heredoc_ahead(&self) -> bool {
        let after = &self.rest()[2..];
        let after = after.strip_prefix(['~', '-']).unwrap_or(after);
        let starts_ident = after.starts_with(|c: char| c.is_ascii_uppercase() || c == '_');
        let starts_quoted = after.starts_with(['\'', '"'])
            && after[1..].starts_with(|c: char| c.is_ascii_alphabetic() || c == '_');
        (starts_ident || starts_quoted) && self.expects_heredoc()
    }

    fn expects_heredoc(&self) -> bool {
        self.expects_value()
            || matches!(self.last_kind(), Some(TokenKind::Ident(_) | TokenKind::Constant(_)))
    }

    fn read_heredoc_opener(&mut self, start: usize, line: usize) {
        self.bump();
        self.bump();
        let squiggly = self.peek() == Some('~');
        let dash = self.peek() == Some('-');
        if squiggly || dash {
            self.bump();
        }
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.bump();
                Some(q)
            }
            _ => None,
        };
        let mut terminator = String::new();
        while let Some(c) = self.peek()
            && (c.is_alphanumeric() || c == '_')
        {
            terminator.push(c);
            self.bump();
        }
        if let Some(q) = quote
            && self.peek() == Some(q)
        {
            self.bump();
        }

        self.heredocs.push(PendingHeredoc {
            token_index: self.tokens.len(),
            terminator,
            squiggly,
            dash,
            raw: quote == Some('\''),
        });
        self.push(
            TokenKind::Str {
                value: String::new(),
                interpolated: false,
            },
            start,
            line,
        );
    }

    /// Called right after a newline: consume each pending heredoc body.
    fn read_heredoc_bodies(&mut self) {
        for heredoc in std::mem::take(&mut self.heredocs) {
            let mut lines = Vec::new();
            while self.pos < self.src.len() {
                let line_end = self.rest().find('\n').map_or(self.src.len(), |i| self.pos + i);
                let text = &self.src[self.pos..line_end];
                let is_terminator = if heredoc.squiggly || heredoc.dash {
                    text.trim() == heredoc.terminator
                } else {
                    text.trim_end() == heredoc.terminator
                };
                while self.pos < line_end {
                    self.bump();
                }
                self.bump();
                if is_terminator {
                    break;
                }
                lines.push(text.to_string());
            }

            let body = if heredoc.squiggly { dedent(&lines) } else { lines.join("\n") };
            let interpolated = !heredoc.raw && body.contains("#{");
            if let Some(token) = self.tokens.get_mut(heredoc.token_index) {
                token.kind = TokenKind::Str {
                    value: body,
                    interpolated,
                };
            }
        }
    }
}

fn is_comparison(op: &str) -> bool {
    matches!(op, "==" | "!=" | ">=" | "<=" | "===")
}

fn is_percent_delimiter(c: char) -> bool {
    matches!(c, '(' | '[' | '{' | '<' | '|' | '!' | '/')
}

fn dedent(lines: &[String]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l.trim_start() })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tokenize `src`.
#[must_use]
pub fn tokenize(src: &str) -> Vec<Token> {
    Lexer::new(src).tokenize()
}
