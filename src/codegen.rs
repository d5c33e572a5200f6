//! Instruction emitter: renders VM commands from already-resolved operands.
//!
//! Every function here is pure and returns newline-terminated text; the
//! compilation engine decides when to write it. The module also owns the
//! fixed tables mapping storage kinds to segments and operators to opcodes.

use std::fmt;

use crate::symbol_table::Kind;
use crate::tokenizer::{Keyword, MAX_INT_CONST};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
  Constant,
  Argument,
  Local,
  Static,
  This,
  That,
  Pointer,
  Temp,
}

impl Segment {
  pub fn as_str(self) -> &'static str {
    match self {
      Segment::Constant => "constant",
      Segment::Argument => "argument",
      Segment::Local => "local",
      Segment::Static => "static",
      Segment::This => "this",
      Segment::That => "that",
      Segment::Pointer => "pointer",
      Segment::Temp => "temp",
    }
  }
}

impl From<Kind> for Segment {
  fn from(kind: Kind) -> Self {
    match kind {
      Kind::Static => Segment::Static,
      Kind::Field => Segment::This,
      Kind::Argument => Segment::Argument,
      Kind::Local => Segment::Local,
    }
  }
}

impl fmt::Display for Segment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Binary operators of the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  And,
  Or,
  Lt,
  Gt,
  Eq,
}

impl BinaryOp {
  pub fn from_symbol(symbol: char) -> Option<Self> {
    let op = match symbol {
      '+' => Self::Add,
      '-' => Self::Sub,
      '*' => Self::Mul,
      '/' => Self::Div,
      '&' => Self::And,
      '|' => Self::Or,
      '<' => Self::Lt,
      '>' => Self::Gt,
      '=' => Self::Eq,
      _ => return None,
    };
    Some(op)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Neg,
  Not,
}

impl UnaryOp {
  pub fn from_symbol(symbol: char) -> Option<Self> {
    match symbol {
      '-' => Some(Self::Neg),
      '~' => Some(Self::Not),
      _ => None,
    }
  }
}

pub fn push(segment: Segment, index: u16) -> String {
  format!("push {segment} {index}\n")
}

pub fn pop(segment: Segment, index: u16) -> String {
  format!("pop {segment} {index}\n")
}

/// Multiplication and division have no opcode and go through the runtime.
pub fn binary(op: BinaryOp) -> String {
  let code = match op {
    BinaryOp::Add => "add\n",
    BinaryOp::Sub => "sub\n",
    BinaryOp::Mul => "call Math.multiply 2\n",
    BinaryOp::Div => "call Math.divide 2\n",
    BinaryOp::And => "and\n",
    BinaryOp::Or => "or\n",
    BinaryOp::Lt => "lt\n",
    BinaryOp::Gt => "gt\n",
    BinaryOp::Eq => "eq\n",
  };
  code.to_string()
}

pub fn unary(op: UnaryOp) -> String {
  match op {
    UnaryOp::Neg => "neg\n".to_string(),
    UnaryOp::Not => "not\n".to_string(),
  }
}

pub fn label(name: &str) -> String {
  format!("label {name}\n")
}

pub fn goto(name: &str) -> String {
  format!("goto {name}\n")
}

pub fn if_goto(name: &str) -> String {
  format!("if-goto {name}\n")
}

pub fn call(class: &str, subroutine: &str, n_args: usize) -> String {
  format!("call {class}.{subroutine} {n_args}\n")
}

pub fn function(class: &str, subroutine: &str, n_locals: u16) -> String {
  format!("function {class}.{subroutine} {n_locals}\n")
}

pub fn ret() -> String {
  "return\n".to_string()
}

/// Build a string object at runtime, one `appendChar` per character.
///
/// `None` when the length or a character code does not fit a constant.
pub fn string_constant(text: &str) -> Option<String> {
  let mut code = push(Segment::Constant, constant(text.chars().count())?);
  code.push_str(&call("String", "new", 1));
  for c in text.chars() {
    code.push_str(&push(Segment::Constant, constant(u32::from(c))?));
    code.push_str(&call("String", "appendChar", 2));
  }
  Some(code)
}

fn constant(value: impl TryInto<u16>) -> Option<u16> {
  value.try_into().ok().filter(|&value| value <= MAX_INT_CONST)
}

/// Code for `true`, `false`, `null` and `this`; `None` for other keywords.
///
/// `true` is `~0` rather than `-1` so the output matches the reference
/// compiler instruction for instruction.
pub fn keyword_constant(keyword: Keyword) -> Option<String> {
  let code = match keyword {
    Keyword::True => "push constant 0\nnot\n",
    Keyword::False | Keyword::Null => "push constant 0\n",
    Keyword::This => "push pointer 0\n",
    _ => return None,
  };
  Some(code.to_string())
}
