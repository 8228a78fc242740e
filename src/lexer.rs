use crate::diagnostics::{Diagnostic, DiagnosticKind, SourceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Let,
    Const,
    Fn,
    Async,
    Await,
    Class,
    Extends,
    New,
    This,
    Super,
    Static,
    Return,
    If,
    Else,
    Elif,
    Switch,
    Case,
    Default,
    Loop,
    From,
    To,
    Step,
    In,
    Of,
    For,
    While,
    Do,
    Try,
    Catch,
    Finally,
    Throw,
    Break,
    Continue,
    Import,
    Export,
    As,
    Print,
    Input,
    Match,
    Is,
    Instanceof,
    Typeof,
    True,
    False,
    Null,
    Undefined,
}

impl Keyword {
    /// Contextual keywords double as plain names for members and object keys.
    pub fn is_contextual(self) -> bool {
        matches!(
            self,
            Keyword::From | Keyword::To | Keyword::Step | Keyword::Of | Keyword::As
        )
    }

    pub fn as_str(self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, kw)| *kw == self)
            .map(|(text, _)| *text)
            .unwrap_or("<keyword>")
    }
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("let", Keyword::Let),
    ("const", Keyword::Const),
    ("fn", Keyword::Fn),
    ("async", Keyword::Async),
    ("await", Keyword::Await),
    ("class", Keyword::Class),
    ("extends", Keyword::Extends),
    ("new", Keyword::New),
    ("this", Keyword::This),
    ("super", Keyword::Super),
    ("static", Keyword::Static),
    ("return", Keyword::Return),
    ("if", Keyword::If),
    ("else", Keyword::Else),
    ("elif", Keyword::Elif),
    ("switch", Keyword::Switch),
    ("case", Keyword::Case),
    ("default", Keyword::Default),
    ("loop", Keyword::Loop),
    ("from", Keyword::From),
    ("to", Keyword::To),
    ("step", Keyword::Step),
    ("in", Keyword::In),
    ("of", Keyword::Of),
    ("for", Keyword::For),
    ("while", Keyword::While),
    ("do", Keyword::Do),
    ("try", Keyword::Try),
    ("catch", Keyword::Catch),
    ("finally", Keyword::Finally),
    ("throw", Keyword::Throw),
    ("break", Keyword::Break),
    ("continue", Keyword::Continue),
    ("import", Keyword::Import),
    ("export", Keyword::Export),
    ("as", Keyword::As),
    ("print", Keyword::Print),
    ("input", Keyword::Input),
    ("match", Keyword::Match),
    ("is", Keyword::Is),
    ("instanceof", Keyword::Instanceof),
    ("typeof", Keyword::Typeof),
    ("true", Keyword::True),
    ("false", Keyword::False),
    ("null", Keyword::Null),
    ("undefined", Keyword::Undefined),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    /// Raw body of a back-quoted template; interpolations are left unparsed.
    Template,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    DotDot,
    DotDotEqual,
    Ellipsis,
    Colon,
    Semicolon,
    Question,
    QuestionDot,
    DoubleQuestion,
    FatArrow,
    PipeGreater,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    StarStarAssign,
    AmpersandAssign,
    PipeAssign,
    CaretAssign,
    ShiftLeftAssign,
    ShiftRightAssign,
    DoubleQuestionAssign,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    ShiftLeft,
    ShiftRight,
    DoubleAmpersand,
    DoublePipe,
    Bang,
    EqualEqual,
    BangEqual,
    EqualEqualEqual,
    BangEqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Newline,
    Eof,
}

/// Operators ordered longest first so the first prefix match wins.
const OPERATORS: &[(&str, TokenKind)] = &[
    ("**=", TokenKind::StarStarAssign),
    ("...", TokenKind::Ellipsis),
    ("..=", TokenKind::DotDotEqual),
    ("??=", TokenKind::DoubleQuestionAssign),
    ("<<=", TokenKind::ShiftLeftAssign),
    (">>=", TokenKind::ShiftRightAssign),
    ("===", TokenKind::EqualEqualEqual),
    ("!==", TokenKind::BangEqualEqual),
    ("?.", TokenKind::QuestionDot),
    ("??", TokenKind::DoubleQuestion),
    ("|>", TokenKind::PipeGreater),
    ("=>", TokenKind::FatArrow),
    ("==", TokenKind::EqualEqual),
    ("!=", TokenKind::BangEqual),
    ("<=", TokenKind::LessEqual),
    (">=", TokenKind::GreaterEqual),
    ("&&", TokenKind::DoubleAmpersand),
    ("||", TokenKind::DoublePipe),
    ("++", TokenKind::PlusPlus),
    ("--", TokenKind::MinusMinus),
    ("+=", TokenKind::PlusAssign),
    ("-=", TokenKind::MinusAssign),
    ("*=", TokenKind::StarAssign),
    ("/=", TokenKind::SlashAssign),
    ("%=", TokenKind::PercentAssign),
    ("&=", TokenKind::AmpersandAssign),
    ("|=", TokenKind::PipeAssign),
    ("^=", TokenKind::CaretAssign),
    ("<<", TokenKind::ShiftLeft),
    (">>", TokenKind::ShiftRight),
    ("**", TokenKind::StarStar),
    ("..", TokenKind::DotDot),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    (",", TokenKind::Comma),
    (".", TokenKind::Dot),
    (":", TokenKind::Colon),
    (";", TokenKind::Semicolon),
    ("?", TokenKind::Question),
    ("=", TokenKind::Assign),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("&", TokenKind::Ampersand),
    ("|", TokenKind::Pipe),
    ("^", TokenKind::Caret),
    ("~", TokenKind::Tilde),
    ("!", TokenKind::Bang),
    ("<", TokenKind::Less),
    (">", TokenKind::Greater),
];

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text for names and operators; the decoded value for strings.
    pub lexeme: String,
    pub span: SourceSpan,
}

impl Token {
    pub fn line(&self) -> usize {
        self.span.line
    }

    pub fn column(&self) -> usize {
        self.span.column
    }
}

/// Convert source text into tokens, ending with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Diagnostic> {
    Lexer::new(source).tokenize()
}

pub struct Lexer<'a> {
    source: &'a str,
    current: usize,
    line: usize,
    column: usize,
}

/// Start position of the token being scanned.
#[derive(Clone, Copy)]
struct Mark {
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            current: 0,
            line: 1,
            column: 1,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.current..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.current += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            offset: self.current,
            line: self.line,
            column: self.column,
        }
    }

    fn span_from(&self, mark: Mark) -> SourceSpan {
        SourceSpan::new(mark.offset, self.current, mark.line, mark.column)
    }

    fn error(&self, mark: Mark, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Lexer, message).with_span(self.span_from(mark))
    }

    fn collect_while<F>(&mut self, mut predicate: F)
    where
        F: FnMut(char) -> bool,
    {
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            self.bump();
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), Diagnostic> {
        loop {
            match (self.peek(), self.peek_nth(1)) {
                (Some(ch), _) if ch.is_whitespace() && ch != '\n' => {
                    self.bump();
                }
                (Some('#'), _) | (Some('/'), Some('/')) => {
                    self.collect_while(|ch| ch != '\n');
                }
                (Some('/'), Some('*')) => {
                    let mark = self.mark();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error(mark, "unterminated block comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn token(&self, kind: TokenKind, mark: Mark) -> Token {
        Token {
            kind,
            lexeme: self.source[mark.offset..self.current].to_string(),
            span: self.span_from(mark),
        }
    }

    fn identifier_or_keyword(&mut self, mark: Mark) -> Token {
        self.collect_while(|ch| ch.is_alphanumeric() || ch == '_' || ch == '$');
        let lexeme = &self.source[mark.offset..self.current];
        let kind = keyword_for(lexeme).unwrap_or(TokenKind::Identifier);
        self.token(kind, mark)
    }

    fn number_literal(&mut self, mark: Mark, first: char) -> Result<Token, Diagnostic> {
        if first == '0' {
            let radix = match self.peek() {
                Some('x' | 'X') => Some(16),
                Some('b' | 'B') => Some(2),
                Some('o' | 'O') => Some(8),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                self.collect_while(|ch| ch.is_ascii_alphanumeric() || ch == '_');
                let token = self.token(TokenKind::Number, mark);
                if parse_number(&token.lexeme).is_none() {
                    return Err(self.error(mark, format!("invalid base-{radix} literal")));
                }
                return Ok(token);
            }
        }

        self.collect_while(|ch| ch.is_ascii_digit() || ch == '_');
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|ch| ch.is_ascii_digit()) {
            self.bump();
            self.collect_while(|ch| ch.is_ascii_digit() || ch == '_');
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_nth(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_nth(digit_at).is_some_and(|ch| ch.is_ascii_digit()) {
                self.bump();
                if signed {
                    self.bump();
                }
                self.collect_while(|ch| ch.is_ascii_digit() || ch == '_');
            }
        }
        let token = self.token(TokenKind::Number, mark);
        if parse_number(&token.lexeme).is_none() {
            return Err(self.error(mark, format!("invalid number literal `{}`", token.lexeme)));
        }
        Ok(token)
    }

    fn string_literal(&mut self, mark: Mark, quote: char) -> Result<Token, Diagnostic> {
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(ch) if ch == quote => {
                    return Ok(Token {
                        kind: TokenKind::String,
                        lexeme: value,
                        span: self.span_from(mark),
                    });
                }
                Some('\\') => {
                    let escaped = self.escape(mark)?;
                    value.push(escaped);
                }
                Some('\n') | None => {
                    return Err(self.error(mark, "unterminated string literal"));
                }
                Some(ch) => value.push(ch),
            }
        }
    }

    fn escape(&mut self, mark: Mark) -> Result<char, Diagnostic> {
        let ch = self
            .bump()
            .ok_or_else(|| self.error(mark, "unterminated string literal"))?;
        let decoded = match ch {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'x' => self.hex_escape(mark, 2)?,
            'u' if self.peek() == Some('{') => {
                self.bump();
                let start = self.current;
                self.collect_while(|ch| ch.is_ascii_hexdigit());
                let digits = &self.source[start..self.current];
                if !self.match_next('}') {
                    return Err(self.error(mark, "unterminated unicode escape"));
                }
                decode_code_point(digits).ok_or_else(|| self.error(mark, "invalid unicode escape"))?
            }
            'u' => self.hex_escape(mark, 4)?,
            other => other,
        };
        Ok(decoded)
    }

    fn hex_escape(&mut self, mark: Mark, digits: usize) -> Result<char, Diagnostic> {
        let start = self.current;
        for _ in 0..digits {
            match self.peek() {
                Some(ch) if ch.is_ascii_hexdigit() => {
                    self.bump();
                }
                _ => return Err(self.error(mark, "invalid hex escape")),
            }
        }
        decode_code_point(&self.source[start..self.current])
            .ok_or_else(|| self.error(mark, "invalid hex escape"))
    }

    /// Scan a template body, balancing braces inside `${...}` segments.
    fn template_literal(&mut self, mark: Mark) -> Result<Token, Diagnostic> {
        let body_start = self.current;
        let mut depth = 0usize;
        loop {
            let ch = self
                .bump()
                .ok_or_else(|| self.error(mark, "unterminated template literal"))?;
            match ch {
                '\\' => {
                    self.bump();
                }
                '`' if depth == 0 => break,
                '$' if depth == 0 && self.peek() == Some('{') => {
                    self.bump();
                    depth = 1;
                }
                '{' if depth > 0 => depth += 1,
                '}' if depth > 0 => depth -= 1,
                quote @ ('"' | '\'') if depth > 0 => loop {
                    match self.bump() {
                        Some('\\') => {
                            self.bump();
                        }
                        Some(ch) if ch == quote => break,
                        Some(_) => {}
                        None => return Err(self.error(mark, "unterminated template literal")),
                    }
                },
                _ => {}
            }
        }
        let body = &self.source[body_start..self.current - 1];
        Ok(Token {
            kind: TokenKind::Template,
            lexeme: body.to_string(),
            span: self.span_from(mark),
        })
    }

    fn operator(&mut self, mark: Mark) -> Option<Token> {
        let rest = self.rest();
        let (text, kind) = OPERATORS.iter().find(|(text, _)| rest.starts_with(text))?;
        for _ in 0..text.chars().count() {
            self.bump();
        }
        Some(self.token(*kind, mark))
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let mark = self.mark();
            let ch = match self.peek() {
                Some(ch) => ch,
                None => {
                    tokens.push(self.token(TokenKind::Eof, mark));
                    break;
                }
            };

            let token = match ch {
                '\n' => {
                    self.bump();
                    self.token(TokenKind::Newline, mark)
                }
                ch if ch.is_alphabetic() || ch == '_' || ch == '$' => {
                    self.bump();
                    self.identifier_or_keyword(mark)
                }
                '0'..='9' => {
                    self.bump();
                    self.number_literal(mark, ch)?
                }
                '"' | '\'' => {
                    self.bump();
                    self.string_literal(mark, ch)?
                }
                '`' => {
                    self.bump();
                    self.template_literal(mark)?
                }
                _ => match self.operator(mark) {
                    Some(token) => token,
                    None => {
                        self.bump();
                        return Err(self.error(mark, format!("unexpected character `{ch}`")));
                    }
                },
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    KEYWORDS
        .iter()
        .find(|(text, _)| *text == ident)
        .map(|(_, keyword)| TokenKind::Keyword(*keyword))
}

fn decode_code_point(digits: &str) -> Option<char> {
    u32::from_str_radix(digits, 16).ok().and_then(char::from_u32)
}

/// Numeric value of a number token, honoring radix prefixes and `_` separators.
pub fn parse_number(lexeme: &str) -> Option<f64> {
    let cleaned = lexeme.replace('_', "");
    let prefixed = |prefix: [&str; 2]| {
        prefix
            .iter()
            .find_map(|p| cleaned.strip_prefix(p))
            .map(str::to_string)
    };
    let radix_value = |digits: String, radix: u32| {
        if digits.is_empty() {
            None
        } else {
            u64::from_str_radix(&digits, radix).ok().map(|n| n as f64)
        }
    };
    if let Some(digits) = prefixed(["0x", "0X"]) {
        return radix_value(digits, 16);
    }
    if let Some(digits) = prefixed(["0b", "0B"]) {
        return radix_value(digits, 2);
    }
    if let Some(digits) = prefixed(["0o", "0O"]) {
        return radix_value(digits, 8);
    }
    cleaned.parse::<f64>().ok()
}

/// Decode escape sequences in a literal segment of a template body.
pub(crate) fn unescape_template(raw: &str) -> Result<String, Diagnostic> {
    let mut lexer = Lexer::new(raw);
    let mark = lexer.mark();
    let mut value = String::new();
    while let Some(ch) = lexer.bump() {
        if ch == '\\' {
            let escaped = lexer.escape(mark)?;
            value.push(escaped);
        } else {
            value.push(ch);
        }
    }
    Ok(value)
}
