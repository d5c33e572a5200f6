//! Declared variable types.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
  Int,
  Char,
  Boolean,
  Class(String),
}

impl Type {
  pub fn class(name: impl Into<String>) -> Self {
    Self::Class(name.into())
  }

  /// Name as written in source; for objects this is the class that receives
  /// method calls made through the variable.
  pub fn name(&self) -> &str {
    match self {
      Self::Int => "int",
      Self::Char => "char",
      Self::Boolean => "boolean",
      Self::Class(name) => name,
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}
