//! Lexical analysis: turns a unit's source into classified tokens.
//!
//! Tokens are produced lazily. The lexer keeps the current token and at most
//! one buffered lookahead token, which is all the grammar ever needs. It knows
//! nothing about the grammar beyond the keyword and symbol sets.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::error::{CompileError, CompileResult};

/// Characters that always form a token on their own.
pub const SYMBOLS: &[u8] = b"{}()[].,;+-*/&|<>=~";

/// Largest integer constant the language accepts.
pub const MAX_INT_CONST: u16 = 32767;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
  Class,
  Constructor,
  Function,
  Method,
  Field,
  Static,
  Var,
  Int,
  Char,
  Boolean,
  Void,
  True,
  False,
  Null,
  This,
  Let,
  Do,
  If,
  Else,
  While,
  Return,
}

impl Keyword {
  pub fn from_text(text: &str) -> Option<Self> {
    let keyword = match text {
      "class" => Self::Class,
      "constructor" => Self::Constructor,
      "function" => Self::Function,
      "method" => Self::Method,
      "field" => Self::Field,
      "static" => Self::Static,
      "var" => Self::Var,
      "int" => Self::Int,
      "char" => Self::Char,
      "boolean" => Self::Boolean,
      "void" => Self::Void,
      "true" => Self::True,
      "false" => Self::False,
      "null" => Self::Null,
      "this" => Self::This,
      "let" => Self::Let,
      "do" => Self::Do,
      "if" => Self::If,
      "else" => Self::Else,
      "while" => Self::While,
      "return" => Self::Return,
      _ => return None,
    };
    Some(keyword)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Class => "class",
      Self::Constructor => "constructor",
      Self::Function => "function",
      Self::Method => "method",
      Self::Field => "field",
      Self::Static => "static",
      Self::Var => "var",
      Self::Int => "int",
      Self::Char => "char",
      Self::Boolean => "boolean",
      Self::Void => "void",
      Self::True => "true",
      Self::False => "false",
      Self::Null => "null",
      Self::This => "this",
      Self::Let => "let",
      Self::Do => "do",
      Self::If => "if",
      Self::Else => "else",
      Self::While => "while",
      Self::Return => "return",
    }
  }
}

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Keyword(Keyword),
  Symbol(char),
  Identifier,
  IntConst(u16),
  /// Text holds the literal's contents without the quotes.
  StringConst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub text: String,
  /// Byte offset of the token's first character (the opening quote for strings).
  pub loc: usize,
}

impl Token {
  pub fn new(kind: TokenKind, text: impl Into<String>, loc: usize) -> Self {
    Self {
      kind,
      text: text.into(),
      loc,
    }
  }

  pub fn is_symbol(&self, symbol: char) -> bool {
    self.kind == TokenKind::Symbol(symbol)
  }

  pub fn keyword(&self) -> Option<Keyword> {
    match self.kind {
      TokenKind::Keyword(keyword) => Some(keyword),
      _ => None,
    }
  }

  /// Tag name used by the token dump.
  pub fn tag(&self) -> &'static str {
    match self.kind {
      TokenKind::Keyword(_) => "keyword",
      TokenKind::Symbol(_) => "symbol",
      TokenKind::Identifier => "identifier",
      TokenKind::IntConst(_) => "integerConstant",
      TokenKind::StringConst => "stringConstant",
    }
  }

  /// Token text with markup characters escaped.
  pub fn xml_text(&self) -> Cow<'_, str> {
    if !self.text.contains(['<', '>', '&', '"']) {
      return Cow::Borrowed(&self.text);
    }
    let mut escaped = String::with_capacity(self.text.len() + 8);
    for c in self.text.chars() {
      match c {
        '<' => escaped.push_str("&lt;"),
        '>' => escaped.push_str("&gt;"),
        '&' => escaped.push_str("&amp;"),
        '"' => escaped.push_str("&quot;"),
        _ => escaped.push(c),
      }
    }
    Cow::Owned(escaped)
  }
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>) -> String {
  match token {
    Some(Token {
      kind: TokenKind::StringConst,
      text,
      ..
    }) => format!("string constant \"{text}\""),
    Some(token) => format!("\"{}\"", token.text),
    None => "end of input".to_string(),
  }
}

fn is_symbol(byte: u8) -> bool {
  SYMBOLS.contains(&byte)
}

fn is_identifier(text: &str) -> bool {
  !text.is_empty()
    && text
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub struct Lexer<'a> {
  unit: &'a str,
  source: &'a str,
  cursor: usize,
  current: Option<Token>,
  /// `Some(None)` records that the lookahead already hit end of input.
  peeked: Option<Option<Token>>,
}

impl<'a> Lexer<'a> {
  /// Start before the first token; call [`Lexer::advance`] to load it.
  pub fn new(unit: &'a str, source: &'a str) -> Self {
    Self {
      unit,
      source,
      cursor: 0,
      current: None,
      peeked: None,
    }
  }

  pub fn unit(&self) -> &'a str {
    self.unit
  }

  pub fn source(&self) -> &'a str {
    self.source
  }

  /// Whether any input remains past the current token.
  pub fn has_more(&self) -> bool {
    match &self.peeked {
      Some(next) => next.is_some(),
      None => self.cursor < self.source.len(),
    }
  }

  pub fn current(&self) -> Option<&Token> {
    self.current.as_ref()
  }

  /// Make the next token current. Returns `false` once input is exhausted,
  /// in which case there is no current token.
  pub fn advance(&mut self) -> CompileResult<bool> {
    let next = match self.peeked.take() {
      Some(next) => next,
      None => self.scan()?,
    };
    self.current = next;
    Ok(self.current.is_some())
  }

  /// Look at the token after the current one without consuming it.
  pub fn peek(&mut self) -> CompileResult<Option<&Token>> {
    if self.peeked.is_none() {
      let next = self.scan()?;
      self.peeked = Some(next);
    }
    Ok(self.peeked.as_ref().and_then(Option::as_ref))
  }

  /// Render every remaining token as a `<tokens>` document.
  pub fn tokens_xml(&mut self) -> CompileResult<String> {
    let mut xml = String::from("<tokens>\n");
    while self.advance()? {
      if let Some(token) = self.current() {
        let tag = token.tag();
        let _ = writeln!(xml, "<{tag}> {} </{tag}>", token.xml_text());
      }
    }
    xml.push_str("</tokens>\n");
    Ok(xml)
  }

  fn error_at(&self, loc: usize, message: impl Into<String>) -> CompileError {
    CompileError::lexical(self.unit, self.source, loc, message)
  }

  fn scan(&mut self) -> CompileResult<Option<Token>> {
    self.skip_trivia()?;

    let bytes = self.source.as_bytes();
    let start = self.cursor;
    let Some(&c) = bytes.get(start) else {
      return Ok(None);
    };

    if c == b'"' {
      let body = start + 1;
      let Some(len) = self.source[body..].find('"') else {
        return Err(self.error_at(start, "unterminated string constant"));
      };
      self.cursor = body + len + 1;
      let text = &self.source[body..body + len];
      if let Some((offset, c)) = text
        .char_indices()
        .find(|&(_, c)| u32::from(c) > u32::from(MAX_INT_CONST))
      {
        return Err(self.error_at(
          body + offset,
          format!("character {c:?} in string constant is outside 0..={MAX_INT_CONST}"),
        ));
      }
      if text.chars().count() > usize::from(MAX_INT_CONST) {
        return Err(self.error_at(
          start,
          format!("string constant is longer than {MAX_INT_CONST} characters"),
        ));
      }
      return Ok(Some(Token::new(TokenKind::StringConst, text, start)));
    }

    if is_symbol(c) {
      self.cursor += 1;
      let text = &self.source[start..self.cursor];
      return Ok(Some(Token::new(TokenKind::Symbol(c as char), text, start)));
    }

    // A symbol, quote or whitespace ends the token and is left for the next scan.
    while let Some(&b) = bytes.get(self.cursor)
      && !b.is_ascii_whitespace()
      && !is_symbol(b)
      && b != b'"'
    {
      self.cursor += 1;
    }

    let text = &self.source[start..self.cursor];
    self.classify(text, start).map(Some)
  }

  fn classify(&self, text: &str, loc: usize) -> CompileResult<Token> {
    if let Some(keyword) = Keyword::from_text(text) {
      return Ok(Token::new(TokenKind::Keyword(keyword), text, loc));
    }

    if text.bytes().all(|b| b.is_ascii_digit()) {
      return match text.parse::<u16>() {
        Ok(value) if value <= MAX_INT_CONST => {
          Ok(Token::new(TokenKind::IntConst(value), text, loc))
        }
        _ => Err(self.error_at(
          loc,
          format!("integer constant {text} is out of range 0..={MAX_INT_CONST}"),
        )),
      };
    }

    if is_identifier(text) {
      return Ok(Token::new(TokenKind::Identifier, text, loc));
    }

    Err(self.error_at(loc, format!("invalid token \"{text}\"")))
  }

  fn skip_trivia(&mut self) -> CompileResult<()> {
    loop {
      let rest = &self.source[self.cursor..];
      let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
      self.cursor += rest.len() - trimmed.len();

      if trimmed.starts_with("/*") {
        let body = self.cursor + 2;
        let Some(end) = self.source[body..].find("*/") else {
          return Err(self.error_at(self.cursor, "unterminated block comment"));
        };
        self.cursor = body + end + 2;
      } else if trimmed.starts_with("//") {
        self.cursor = match trimmed.find('\n') {
          Some(end) => self.cursor + end + 1,
          None => self.source.len(),
        };
      } else {
        return Ok(());
      }
    }
  }
}
