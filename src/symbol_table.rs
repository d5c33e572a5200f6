//! Two-scope symbol table for variables.
//!
//! Static and field names live in the class scope for the whole unit;
//! argument and local names live in the subroutine scope and are dropped by
//! [`SymbolTable::start_subroutine`]. Every kind keeps its own running index
//! so entries map directly onto VM segment offsets.
//!
//! Names that are not found are assumed to be class or subroutine names,
//! which is why lookups return `Option` rather than an error.

use std::collections::HashMap;
use std::fmt;

use snafu::Snafu;

use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
  Static,
  Field,
  Argument,
  Local,
}

impl Kind {
  pub const ALL: [Kind; 4] = [Kind::Static, Kind::Field, Kind::Argument, Kind::Local];

  pub fn is_class_scope(self) -> bool {
    matches!(self, Kind::Static | Kind::Field)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Kind::Static => "static",
      Kind::Field => "field",
      Kind::Argument => "argument",
      Kind::Local => "var",
    }
  }

  fn slot(self) -> usize {
    match self {
      Kind::Static => 0,
      Kind::Field => 1,
      Kind::Argument => 2,
      Kind::Local => 3,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
  pub name: String,
  pub ty: Type,
  pub kind: Kind,
  pub index: u16,
}

#[derive(Debug, Snafu)]
pub enum DefineError {
  #[snafu(display("\"{name}\" is already declared as {kind} in this scope"))]
  Redeclared { name: String, kind: &'static str },
  #[snafu(display("no {kind} index is left for \"{name}\""))]
  IndexExhausted { name: String, kind: &'static str },
}

#[derive(Debug, Default)]
pub struct SymbolTable {
  class_scope: HashMap<String, Symbol>,
  subroutine_scope: HashMap<String, Symbol>,
  counts: [u16; 4],
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Forget the previous subroutine's arguments and locals.
  pub fn start_subroutine(&mut self) {
    self.subroutine_scope.clear();
    self.counts[Kind::Argument.slot()] = 0;
    self.counts[Kind::Local.slot()] = 0;
  }

  /// Declare `name` and return the index it was given.
  pub fn define(&mut self, name: &str, ty: Type, kind: Kind) -> Result<u16, DefineError> {
    let scope = if kind.is_class_scope() {
      &mut self.class_scope
    } else {
      &mut self.subroutine_scope
    };

    if let Some(existing) = scope.get(name) {
      return RedeclaredSnafu {
        name,
        kind: existing.kind.as_str(),
      }
      .fail();
    }

    let index = self.counts[kind.slot()];
    let Some(next) = index.checked_add(1) else {
      return IndexExhaustedSnafu {
        name,
        kind: kind.as_str(),
      }
      .fail();
    };
    self.counts[kind.slot()] = next;
    scope.insert(
      name.to_string(),
      Symbol {
        name: name.to_string(),
        ty,
        kind,
        index,
      },
    );
    Ok(index)
  }

  /// Resolve `name`, innermost scope first.
  pub fn lookup(&self, name: &str) -> Option<&Symbol> {
    self
      .subroutine_scope
      .get(name)
      .or_else(|| self.class_scope.get(name))
  }

  pub fn exists(&self, name: &str) -> bool {
    self.lookup(name).is_some()
  }

  pub fn type_of(&self, name: &str) -> Option<&Type> {
    self.lookup(name).map(|symbol| &symbol.ty)
  }

  pub fn kind_of(&self, name: &str) -> Option<Kind> {
    self.lookup(name).map(|symbol| symbol.kind)
  }

  pub fn index_of(&self, name: &str) -> Option<u16> {
    self.lookup(name).map(|symbol| symbol.index)
  }

  /// Number of variables of `kind` declared so far in its current scope.
  pub fn var_count(&self, kind: Kind) -> u16 {
    self.counts[kind.slot()]
  }
}

fn write_scope(
  f: &mut fmt::Formatter<'_>,
  title: &str,
  scope: &HashMap<String, Symbol>,
) -> fmt::Result {
  writeln!(f, "{title}")?;
  if scope.is_empty() {
    return writeln!(f, "  (none)");
  }
  let mut symbols: Vec<&Symbol> = scope.values().collect();
  symbols.sort_by_key(|symbol| (symbol.kind.slot(), symbol.index));
  for symbol in symbols {
    writeln!(
      f,
      "  {:<16} {:<8} {:<12} {}",
      symbol.name,
      symbol.kind.as_str(),
      symbol.ty,
      symbol.index
    )?;
  }
  Ok(())
}

impl fmt::Display for SymbolTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write_scope(f, "class scope:", &self.class_scope)?;
    write_scope(f, "subroutine scope:", &self.subroutine_scope)
  }
}

#[cfg(test)]
mod tests {
  use super::{DefineError, Kind, SymbolTable};
  use crate::ty::Type;
  use proptest::prelude::*;

  #[test]
  fn subroutine_scope_shadows_class_scope() {
    let mut table = SymbolTable::new();
    table.define("x", Type::Int, Kind::Field).unwrap();
    table.define("x", Type::Boolean, Kind::Local).unwrap();

    assert_eq!(table.kind_of("x"), Some(Kind::Local));
    assert_eq!(table.type_of("x"), Some(&Type::Boolean));

    table.start_subroutine();
    assert_eq!(table.kind_of("x"), Some(Kind::Field));
    assert_eq!(table.type_of("x"), Some(&Type::Int));
  }

  #[test]
  fn start_subroutine_drops_only_subroutine_names() {
    let mut table = SymbolTable::new();
    table.define("count", Type::Int, Kind::Static).unwrap();
    table.define("size", Type::Int, Kind::Field).unwrap();
    table.define("a", Type::Int, Kind::Argument).unwrap();
    table.define("i", Type::Int, Kind::Local).unwrap();

    table.start_subroutine();

    assert!(!table.exists("a"));
    assert!(!table.exists("i"));
    assert_eq!(table.index_of("a"), None);
    assert_eq!(table.var_count(Kind::Argument), 0);
    assert_eq!(table.var_count(Kind::Local), 0);
    assert_eq!(table.index_of("count"), Some(0));
    assert_eq!(table.index_of("size"), Some(0));
    assert_eq!(table.var_count(Kind::Field), 1);
  }

  #[test]
  fn implicit_receiver_takes_argument_zero() {
    let mut table = SymbolTable::new();
    table.start_subroutine();
    assert_eq!(
      table.define("this", Type::class("Point"), Kind::Argument).unwrap(),
      0
    );
    assert_eq!(table.define("dx", Type::Int, Kind::Argument).unwrap(), 1);
    assert_eq!(table.type_of("this"), Some(&Type::class("Point")));
  }

  #[test]
  fn redeclaration_in_same_scope_is_rejected() {
    let mut table = SymbolTable::new();
    table.define("x", Type::Int, Kind::Argument).unwrap();
    let err = table.define("x", Type::Int, Kind::Local).unwrap_err();
    assert_eq!(err.to_string(), "\"x\" is already declared as argument in this scope");
    assert_eq!(table.var_count(Kind::Local), 0);
  }

  #[test]
  fn running_out_of_indices_is_an_error() {
    let mut table = SymbolTable::new();
    table.counts[Kind::Local.slot()] = u16::MAX - 1;
    assert_eq!(table.define("last", Type::Int, Kind::Local).unwrap(), u16::MAX - 1);

    let err = table.define("extra", Type::Int, Kind::Local).unwrap_err();
    assert!(matches!(err, DefineError::IndexExhausted { .. }));
    assert_eq!(err.to_string(), "no var index is left for \"extra\"");
    assert!(!table.exists("extra"));
    assert_eq!(table.var_count(Kind::Local), u16::MAX);

    table.define("x", Type::Int, Kind::Argument).unwrap();
  }

  #[test]
  fn unknown_name_is_not_found() {
    let table = SymbolTable::new();
    assert!(table.lookup("Output").is_none());
    assert_eq!(table.kind_of("Output"), None);
  }

  #[test]
  fn display_lists_both_scopes() {
    let mut table = SymbolTable::new();
    table.define("size", Type::Int, Kind::Field).unwrap();
    let dump = table.to_string();
    assert!(dump.starts_with("class scope:\n  size"));
    assert!(dump.ends_with("subroutine scope:\n  (none)\n"));
  }

  fn kind() -> impl Strategy<Value = Kind> {
    prop::sample::select(Kind::ALL.to_vec())
  }

  proptest! {
    #[test]
    fn indices_are_dense_per_kind(kinds in prop::collection::vec(kind(), 0..64)) {
      let mut table = SymbolTable::new();
      let mut next = [0u16; 4];
      for (i, kind) in kinds.iter().enumerate() {
        let index = table.define(&format!("v{i}"), Type::Int, *kind).unwrap();
        prop_assert_eq!(index, next[kind.slot()]);
        next[kind.slot()] += 1;
      }
      for kind in Kind::ALL {
        prop_assert_eq!(table.var_count(kind), next[kind.slot()]);
      }
    }
  }
}
