//! Shared error utilities used across the compilation pipeline.
//!
//! Only unrecoverable conditions travel through `CompileError`; semantic
//! diagnostics (undeclared names, type mismatches) accumulate on the
//! compiler context instead so a single run can report many of them.
//! Lexical and syntax errors point at the offending line with a caret.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("line {line}: {message}\n{source_line}\n{marker}"))]
  Lexical {
    line: usize,
    source_line: String,
    marker: String,
    message: String,
  },

  #[snafu(display("line {line}: {message}\n{source_line}\n{marker}"))]
  Syntax {
    line: usize,
    source_line: String,
    marker: String,
    message: String,
  },

  #[snafu(display("function '{function}': no registers available"))]
  Capacity { function: String },

  #[snafu(display("internal error: {message}"))]
  Structural { message: String },

  #[snafu(display("'{construct}' is not supported by the code generator"))]
  Unsupported { construct: String },
}

impl CompileError {
  /// Lexical error anchored at a byte offset in the source.
  pub fn lexical(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let (line, source_line, marker) = context_at(source, loc);
    Self::Lexical {
      line,
      source_line,
      marker,
      message: message.into(),
    }
  }

  /// Syntax error anchored at a byte offset in the source.
  pub fn syntax(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let (line, source_line, marker) = context_at(source, loc);
    Self::Syntax {
      line,
      source_line,
      marker,
      message: message.into(),
    }
  }
}

/// Locate the line containing `loc` and build a caret marker under its
/// column. `loc` may sit one past the end of the input (errors at EOF).
fn context_at(source: &str, loc: usize) -> (usize, String, String) {
  let safe_loc = loc.min(source.len());
  let line = source[..safe_loc].bytes().filter(|b| *b == b'\n').count() + 1;
  let start = source[..safe_loc].rfind('\n').map_or(0, |i| i + 1);
  let end = source[safe_loc..]
    .find('\n')
    .map_or(source.len(), |i| safe_loc + i);
  let column = source[start..safe_loc].chars().count();
  let marker = format!("{}^", " ".repeat(column));
  (line, source[start..end].to_string(), marker)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn marker_points_at_offending_column() {
    let source = "func f() {\n  reg int x $ 1;\n}\n";
    let loc = source.find('$').unwrap();
    let err = CompileError::lexical(source, loc, "unknown character: '$'");
    let text = err.to_string();
    assert!(text.starts_with("line 2:"), "got: {text}");
    assert!(text.contains("  reg int x $ 1;"));
    let marker_line = text.lines().last().unwrap();
    assert_eq!(marker_line.find('^'), Some(12));
  }

  #[test]
  fn loc_past_end_is_clamped() {
    let err = CompileError::syntax("func", 99, "expected \"(\"");
    assert!(err.to_string().contains("func"));
  }
}
