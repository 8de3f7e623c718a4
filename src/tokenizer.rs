//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer is intentionally tiny – it knows nothing about semantics
//! beyond separating keywords from identifiers and capturing numeric
//! literals. Tokens carry byte spans into the source rather than owned
//! text; `token_text` recovers the lexeme when a later stage needs it.

use crate::error::{CompileError, CompileResult};

/// Reserved words of the hiasm language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
  Reg,
  Func,
  If,
  Else,
  While,
  For,
  Return,
  Asm,
}

impl Keyword {
  pub fn spelling(self) -> &'static str {
    match self {
      Self::Reg => "reg",
      Self::Func => "func",
      Self::If => "if",
      Self::Else => "else",
      Self::While => "while",
      Self::For => "for",
      Self::Return => "return",
      Self::Asm => "asm",
    }
  }
}

fn keyword_for(text: &str) -> Option<Keyword> {
  match text {
    "reg" => Some(Keyword::Reg),
    "func" => Some(Keyword::Func),
    "if" => Some(Keyword::If),
    "else" => Some(Keyword::Else),
    "while" => Some(Keyword::While),
    "for" => Some(Keyword::For),
    "return" => Some(Keyword::Return),
    "asm" => Some(Keyword::Asm),
    _ => None,
  }
}

/// Kinds of tokens recognised by the front-end. `Str` is the verbatim
/// payload of an `asm` statement; its span includes the quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Ident,
  Keyword(Keyword),
  Num,
  Punct,
  Str,
  Eof,
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub value: Option<i64>,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(kind: TokenKind, loc: usize, len: usize, value: Option<i64>) -> Self {
    Self {
      kind,
      value,
      loc,
      len,
    }
  }
}

fn is_ident_start(c: u8) -> bool {
  c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_part(c: u8) -> bool {
  c.is_ascii_alphanumeric() || c == b'_'
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if is_ident_start(c) {
      let start = i;
      i += 1;
      while i < bytes.len() && is_ident_part(bytes[i]) {
        i += 1;
      }
      let kind = match keyword_for(&input[start..i]) {
        Some(keyword) => TokenKind::Keyword(keyword),
        None => TokenKind::Ident,
      };
      tokens.push(Token::new(kind, start, i - start, None));
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      i += 1;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let text = &input[start..i];
      let value = text
        .parse::<i64>()
        .map_err(|err| CompileError::lexical(input, start, format!("invalid number: {err}")))?;
      tokens.push(Token::new(TokenKind::Num, start, i - start, Some(value)));
      continue;
    }

    // Inline-assembly payload: everything between the quotes, verbatim.
    if c == b'"' {
      let start = i;
      i += 1;
      while i < bytes.len() && bytes[i] != b'"' {
        i += 1;
      }
      if i >= bytes.len() {
        return Err(CompileError::lexical(
          input,
          start,
          "unterminated inline-assembly string",
        ));
      }
      i += 1;
      tokens.push(Token::new(TokenKind::Str, start, i - start, None));
      continue;
    }

    if matches!(
      c,
      b'{'
        | b'}'
        | b'('
        | b')'
        | b';'
        | b','
        | b'='
        | b'+'
        | b'-'
        | b'*'
        | b'/'
        | b'&'
        | b'@'
    ) {
      tokens.push(Token::new(TokenKind::Punct, i, 1, None));
      i += 1;
      continue;
    }

    let invalid_char = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::lexical(
      input,
      i,
      format!("unknown character: '{invalid_char}'"),
    ));
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0, None));
  Ok(tokens)
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Content of a `Str` token, without the surrounding quotes.
pub fn string_text<'a>(token: &Token, source: &'a str) -> &'a str {
  &source[token.loc + 1..token.loc + token.len - 1]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "EOF".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "EOF".to_string(),
  }
}
