//! Shared error utilities used across the compilation pipeline.
//!
//! Every fatal condition of a unit funnels into [`CompileError`]. Positional
//! variants quote the offending source line and point at the token with a
//! caret, so a failure reads the same whether it came from the lexer or the
//! compilation engine.

use std::io;
use std::path::PathBuf;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  /// Raw text that matches none of the token classes.
  #[snafu(display("{unit}:{line}:{column}: {message}\n{source_line}\n{marker}"))]
  Lexical {
    unit: String,
    line: usize,
    column: usize,
    source_line: String,
    marker: String,
    message: String,
  },

  /// The current token does not fit the production being compiled.
  #[snafu(display(
    "{unit}:{line}:{column}: expected {expected}, but got {found}\n{source_line}\n{marker}"
  ))]
  Syntax {
    unit: String,
    line: usize,
    column: usize,
    source_line: String,
    marker: String,
    expected: String,
    found: String,
  },

  #[snafu(display("{unit}: failed to emit VM code"))]
  Emit { unit: String, source: io::Error },

  #[snafu(display("failed to read {}", path.display()))]
  Read { path: PathBuf, source: io::Error },

  #[snafu(display("failed to write {}", path.display()))]
  Write { path: PathBuf, source: io::Error },
}

impl CompileError {
  /// Construct a lexical error anchored at a byte offset of the unit's source.
  pub fn lexical(unit: &str, source: &str, loc: usize, message: impl Into<String>) -> Self {
    let pos = Position::locate(source, loc);
    LexicalSnafu {
      unit,
      line: pos.line,
      column: pos.column,
      source_line: pos.source_line,
      marker: pos.marker,
      message: message.into(),
    }
    .build()
  }

  /// Construct a structural error for the token found at `loc`.
  pub fn syntax(
    unit: &str,
    source: &str,
    loc: usize,
    expected: impl Into<String>,
    found: impl Into<String>,
  ) -> Self {
    let pos = Position::locate(source, loc);
    SyntaxSnafu {
      unit,
      line: pos.line,
      column: pos.column,
      source_line: pos.source_line,
      marker: pos.marker,
      expected: expected.into(),
      found: found.into(),
    }
    .build()
  }

  /// One-based `(line, column)` for positional errors.
  pub fn location(&self) -> Option<(usize, usize)> {
    match self {
      Self::Lexical { line, column, .. } | Self::Syntax { line, column, .. } => {
        Some((*line, *column))
      }
      _ => None,
    }
  }
}

struct Position {
  line: usize,
  column: usize,
  source_line: String,
  marker: String,
}

impl Position {
  fn locate(source: &str, loc: usize) -> Self {
    let mut safe_loc = loc.min(source.len());
    while !source.is_char_boundary(safe_loc) {
      safe_loc -= 1;
    }

    let line_start = source[..safe_loc].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[safe_loc..]
      .find('\n')
      .map_or(source.len(), |i| safe_loc + i);
    let prefix = &source[line_start..safe_loc];

    // Tabs are kept in the marker so the caret lines up under the token.
    let mut marker: String = prefix
      .chars()
      .map(|c| if c == '\t' { '\t' } else { ' ' })
      .collect();
    marker.push('^');

    Self {
      line: source[..safe_loc].matches('\n').count() + 1,
      column: prefix.chars().count() + 1,
      source_line: source[line_start..line_end].trim_end_matches('\r').to_string(),
      marker,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::CompileError;

  #[test]
  fn syntax_error_points_at_the_token() {
    let source = "class Main {\n  let x;\n}\n";
    let loc = source.find("let").unwrap();
    let err = CompileError::syntax("Main.jack", source, loc, "\"function\"", "\"let\"");

    assert_eq!(err.location(), Some((2, 3)));
    assert_eq!(
      err.to_string(),
      "Main.jack:2:3: expected \"function\", but got \"let\"\n  let x;\n  ^"
    );
  }

  #[test]
  fn location_past_the_end_is_clamped() {
    let source = "class";
    let err = CompileError::lexical("A.jack", source, 99, "boom");
    assert_eq!(err.location(), Some((1, 6)));
  }

  #[test]
  fn marker_keeps_tabs() {
    let source = "\tlet #";
    let err = CompileError::lexical("A.jack", source, 5, "invalid token \"#\"");
    let CompileError::Lexical { marker, .. } = err else {
      panic!("expected a lexical error");
    };
    assert_eq!(marker, "\t    ^");
  }
}
