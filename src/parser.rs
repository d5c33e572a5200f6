//! Compilation engine: recursive descent that emits VM code as it parses.
//!
//! There is no syntax tree. Each `compile_*` method is entered with the
//! current token at the start of its production, consumes exactly that
//! production, and writes code as soon as it is known. Output is append-only,
//! so anything a jump needs (labels, the receiver push) is settled before the
//! first instruction that depends on it is written.
//!
//! One token of lookahead is enough for the whole grammar: it is only needed
//! to tell a variable, an array element and a subroutine call apart when a
//! term starts with an identifier.

use std::io::Write;

use snafu::ResultExt;
use tracing::{debug, trace};

use crate::codegen::{self, BinaryOp, Segment, UnaryOp};
use crate::error::{CompileError, CompileResult, EmitSnafu};
use crate::symbol_table::{Kind, SymbolTable};
use crate::tokenizer::{Keyword, Lexer, Token, TokenKind, describe_token};
use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubroutineKind {
  Constructor,
  Function,
  Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Statement {
  Let,
  If,
  While,
  Do,
  Return,
}

impl Statement {
  fn from_keyword(keyword: Keyword) -> Option<Self> {
    match keyword {
      Keyword::Let => Some(Self::Let),
      Keyword::If => Some(Self::If),
      Keyword::While => Some(Self::While),
      Keyword::Do => Some(Self::Do),
      Keyword::Return => Some(Self::Return),
      _ => None,
    }
  }
}

pub struct CompilationEngine<'a, W: Write> {
  lexer: Lexer<'a>,
  symbols: SymbolTable,
  out: W,
  class_name: String,
  if_count: usize,
  while_count: usize,
}

impl<'a, W: Write> CompilationEngine<'a, W> {
  /// Prepare to compile `source`, loading its first token. The next call
  /// must be [`CompilationEngine::compile_class`].
  pub fn new(unit: &'a str, source: &'a str, out: W) -> CompileResult<Self> {
    let mut lexer = Lexer::new(unit, source);
    lexer.advance()?;
    Ok(Self {
      lexer,
      symbols: SymbolTable::new(),
      out,
      class_name: String::new(),
      if_count: 0,
      while_count: 0,
    })
  }

  /// `'class' className '{' classVarDec* subroutineDec* '}'`
  pub fn compile_class(&mut self) -> CompileResult<()> {
    self.eat_keyword(&[Keyword::Class])?;
    self.class_name = self.eat_identifier("a class name")?;
    debug!(class = %self.class_name, unit = self.lexer.unit(), "compiling class");
    self.eat_symbol('{')?;

    while matches!(self.current_keyword(), Some(Keyword::Static | Keyword::Field)) {
      self.compile_class_var_dec()?;
    }

    while matches!(
      self.current_keyword(),
      Some(Keyword::Constructor | Keyword::Function | Keyword::Method)
    ) {
      self.compile_subroutine()?;
    }

    self.eat_symbol('}')?;

    if self.lexer.current().is_some() {
      return Err(self.unexpected("end of input"));
    }
    Ok(())
  }

  /// `('static' | 'field') type varName (',' varName)* ';'`
  fn compile_class_var_dec(&mut self) -> CompileResult<()> {
    let kind = match self.eat_keyword(&[Keyword::Static, Keyword::Field])? {
      Keyword::Static => Kind::Static,
      _ => Kind::Field,
    };
    let ty = self.eat_type()?;
    self.declare_names(&ty, kind)?;
    self.eat_symbol(';')
  }

  /// `('constructor' | 'function' | 'method') ('void' | type) subroutineName
  /// '(' parameterList ')' subroutineBody`
  fn compile_subroutine(&mut self) -> CompileResult<()> {
    self.symbols.start_subroutine();
    self.if_count = 0;
    self.while_count = 0;

    let options = [Keyword::Constructor, Keyword::Function, Keyword::Method];
    let kind = match self.eat_keyword(&options)? {
      Keyword::Constructor => SubroutineKind::Constructor,
      Keyword::Function => SubroutineKind::Function,
      _ => SubroutineKind::Method,
    };

    if kind == SubroutineKind::Method {
      let receiver = Type::class(self.class_name.clone());
      self.define("this", receiver, Kind::Argument)?;
    }

    if self.current_keyword() == Some(Keyword::Void) {
      self.advance()?;
    } else {
      self.eat_type()?;
    }

    let name = self.eat_identifier("a subroutine name")?;
    self.eat_symbol('(')?;
    self.compile_parameter_list()?;
    self.eat_symbol(')')?;

    self.eat_symbol('{')?;
    while self.current_keyword() == Some(Keyword::Var) {
      self.compile_var_dec()?;
    }

    let n_locals = self.symbols.var_count(Kind::Local);
    debug!(
      class = %self.class_name,
      subroutine = %name,
      ?kind,
      n_locals,
      "compiling subroutine"
    );

    let mut code = codegen::function(&self.class_name, &name, n_locals);
    match kind {
      SubroutineKind::Method => {
        code.push_str(&codegen::push(Segment::Argument, 0));
        code.push_str(&codegen::pop(Segment::Pointer, 0));
      }
      SubroutineKind::Constructor => {
        let n_fields = self.symbols.var_count(Kind::Field);
        code.push_str(&codegen::push(Segment::Constant, n_fields));
        code.push_str(&codegen::call("Memory", "alloc", 1));
        code.push_str(&codegen::pop(Segment::Pointer, 0));
      }
      SubroutineKind::Function => {}
    }
    self.emit(&code)?;

    self.compile_statements()?;
    self.eat_symbol('}')?;

    trace!("symbols after {}.{}:\n{}", self.class_name, name, self.symbols);
    Ok(())
  }

  /// `((type varName) (',' type varName)*)?`
  fn compile_parameter_list(&mut self) -> CompileResult<()> {
    if self.at_symbol(')') {
      return Ok(());
    }

    loop {
      let ty = self.eat_type()?;
      self.declare_name(ty, Kind::Argument)?;
      if !self.at_symbol(',') {
        return Ok(());
      }
      self.advance()?;
    }
  }

  /// `'var' type varName (',' varName)* ';'`
  fn compile_var_dec(&mut self) -> CompileResult<()> {
    self.eat_keyword(&[Keyword::Var])?;
    let ty = self.eat_type()?;
    self.declare_names(&ty, Kind::Local)?;
    self.eat_symbol(';')
  }

  /// `statement*`
  fn compile_statements(&mut self) -> CompileResult<()> {
    while let Some(statement) = self.current_keyword().and_then(Statement::from_keyword) {
      match statement {
        Statement::Let => self.compile_let()?,
        Statement::If => self.compile_if()?,
        Statement::While => self.compile_while()?,
        Statement::Do => self.compile_do()?,
        Statement::Return => self.compile_return()?,
      }
    }
    Ok(())
  }

  /// `'let' varName ('[' expression ']')? '=' expression ';'`
  fn compile_let(&mut self) -> CompileResult<()> {
    self.eat_keyword(&[Keyword::Let])?;
    let (segment, index) = self.resolve_current()?;
    self.advance()?;

    let indexed = self.at_symbol('[');
    if indexed {
      self.advance()?;
      self.compile_expression()?;
      self.eat_symbol(']')?;
      let mut code = codegen::push(segment, index);
      code.push_str(&codegen::binary(BinaryOp::Add));
      self.emit(&code)?;
    }

    self.eat_symbol('=')?;
    self.compile_expression()?;
    self.eat_symbol(';')?;

    // Evaluating the value may rebind `that`, so the target address waits on
    // the stack until the value is computed.
    let code = if indexed {
      let mut code = codegen::pop(Segment::Temp, 0);
      code.push_str(&codegen::pop(Segment::Pointer, 1));
      code.push_str(&codegen::push(Segment::Temp, 0));
      code.push_str(&codegen::pop(Segment::That, 0));
      code
    } else {
      codegen::pop(segment, index)
    };
    self.emit(&code)
  }

  /// `'if' '(' expression ')' '{' statements '}' ('else' '{' statements '}')?`
  ///
  /// The condition is tested as-is and jumps to the true branch; compare
  /// [`CompilationEngine::compile_while`], which negates its condition.
  fn compile_if(&mut self) -> CompileResult<()> {
    let n = self.if_count;
    self.if_count += 1;
    let if_true = format!("IF_TRUE{n}");
    let if_false = format!("IF_FALSE{n}");
    let if_end = format!("IF_END{n}");

    self.eat_keyword(&[Keyword::If])?;
    self.eat_symbol('(')?;
    self.compile_expression()?;
    self.eat_symbol(')')?;

    let mut code = codegen::if_goto(&if_true);
    code.push_str(&codegen::goto(&if_false));
    code.push_str(&codegen::label(&if_true));
    self.emit(&code)?;

    self.eat_symbol('{')?;
    self.compile_statements()?;
    self.eat_symbol('}')?;

    if self.current_keyword() != Some(Keyword::Else) {
      return self.emit(&codegen::label(&if_false));
    }

    let mut code = codegen::goto(&if_end);
    code.push_str(&codegen::label(&if_false));
    self.emit(&code)?;

    self.advance()?;
    self.eat_symbol('{')?;
    self.compile_statements()?;
    self.eat_symbol('}')?;

    self.emit(&codegen::label(&if_end))
  }

  /// `'while' '(' expression ')' '{' statements '}'`
  fn compile_while(&mut self) -> CompileResult<()> {
    let n = self.while_count;
    self.while_count += 1;
    let top = format!("WHILE_EXP{n}");
    let exit = format!("WHILE_END{n}");

    self.emit(&codegen::label(&top))?;

    self.eat_keyword(&[Keyword::While])?;
    self.eat_symbol('(')?;
    self.compile_expression()?;
    self.eat_symbol(')')?;

    let mut code = codegen::unary(UnaryOp::Not);
    code.push_str(&codegen::if_goto(&exit));
    self.emit(&code)?;

    self.eat_symbol('{')?;
    self.compile_statements()?;
    self.eat_symbol('}')?;

    let mut code = codegen::goto(&top);
    code.push_str(&codegen::label(&exit));
    self.emit(&code)
  }

  /// `'do' subroutineCall ';'`
  fn compile_do(&mut self) -> CompileResult<()> {
    self.eat_keyword(&[Keyword::Do])?;
    self.compile_subroutine_call()?;
    self.eat_symbol(';')?;
    self.emit(&codegen::pop(Segment::Temp, 0))
  }

  /// `'return' expression? ';'`
  fn compile_return(&mut self) -> CompileResult<()> {
    self.eat_keyword(&[Keyword::Return])?;
    if self.at_symbol(';') {
      self.emit(&codegen::push(Segment::Constant, 0))?;
    } else {
      self.compile_expression()?;
    }
    self.eat_symbol(';')?;
    self.emit(&codegen::ret())
  }

  /// `term (op term)*`, evaluated strictly left to right.
  fn compile_expression(&mut self) -> CompileResult<()> {
    self.compile_term()?;

    while let Some(op) = self.current_binary_op() {
      self.advance()?;
      self.compile_term()?;
      self.emit(&codegen::binary(op))?;
    }
    Ok(())
  }

  /// `integerConstant | stringConstant | keywordConstant | varName |
  /// varName '[' expression ']' | subroutineCall | '(' expression ')' |
  /// unaryOp term`
  fn compile_term(&mut self) -> CompileResult<()> {
    let Some(token) = self.lexer.current() else {
      return Err(self.unexpected("a term"));
    };
    let kind = token.kind;

    match kind {
      TokenKind::IntConst(value) => {
        self.emit(&codegen::push(Segment::Constant, value))?;
        self.advance()
      }
      TokenKind::StringConst => {
        let Some(code) = codegen::string_constant(&token.text) else {
          return Err(self.unexpected("a string constant within the constant range"));
        };
        self.emit(&code)?;
        self.advance()
      }
      TokenKind::Keyword(keyword) => {
        let Some(code) = codegen::keyword_constant(keyword) else {
          return Err(self.unexpected("a term"));
        };
        self.emit(&code)?;
        self.advance()
      }
      TokenKind::Symbol('(') => {
        self.advance()?;
        self.compile_expression()?;
        self.eat_symbol(')')
      }
      TokenKind::Symbol(symbol) => {
        let Some(op) = UnaryOp::from_symbol(symbol) else {
          return Err(self.unexpected("a term"));
        };
        self.advance()?;
        self.compile_term()?;
        self.emit(&codegen::unary(op))
      }
      TokenKind::Identifier => match self.lexer.peek()?.map(|next| next.kind) {
        Some(TokenKind::Symbol('(' | '.')) => self.compile_subroutine_call(),
        Some(TokenKind::Symbol('[')) => self.compile_array_read(),
        _ => {
          let (segment, index) = self.resolve_current()?;
          self.emit(&codegen::push(segment, index))?;
          self.advance()
        }
      },
    }
  }

  /// `varName '[' expression ']'` as a value.
  fn compile_array_read(&mut self) -> CompileResult<()> {
    let (segment, index) = self.resolve_current()?;
    self.advance()?;
    self.eat_symbol('[')?;
    self.compile_expression()?;
    self.eat_symbol(']')?;

    let mut code = codegen::push(segment, index);
    code.push_str(&codegen::binary(BinaryOp::Add));
    code.push_str(&codegen::pop(Segment::Pointer, 1));
    code.push_str(&codegen::push(Segment::That, 0));
    self.emit(&code)
  }

  /// `subroutineName '(' expressionList ')' |
  /// (className | varName) '.' subroutineName '(' expressionList ')'`
  ///
  /// An undotted name is a method of this class called on `this`. A dotted
  /// name whose prefix is a variable is a method call on that object. Any
  /// other dotted name is a function or constructor of the named class and
  /// gets no receiver.
  fn compile_subroutine_call(&mut self) -> CompileResult<()> {
    let name = self.eat_identifier("a subroutine, class or variable name")?;

    let (class, subroutine, receivers) = if self.at_symbol('.') {
      self.advance()?;
      let subroutine = self.eat_identifier("a subroutine name")?;
      let receiver = self.symbols.lookup(&name).map(|symbol| {
        let segment = Segment::from(symbol.kind);
        (segment, symbol.index, symbol.ty.name().to_string())
      });
      match receiver {
        Some((segment, index, class)) => {
          self.emit(&codegen::push(segment, index))?;
          (class, subroutine, 1)
        }
        None => (name, subroutine, 0),
      }
    } else {
      self.emit(&codegen::push(Segment::Pointer, 0))?;
      (self.class_name.clone(), name, 1)
    };

    self.eat_symbol('(')?;
    let n_args = receivers + self.compile_expression_list()?;
    self.eat_symbol(')')?;

    self.emit(&codegen::call(&class, &subroutine, n_args))
  }

  /// `(expression (',' expression)*)?`, returning the number of expressions.
  fn compile_expression_list(&mut self) -> CompileResult<usize> {
    if self.at_symbol(')') {
      return Ok(0);
    }

    let mut count = 1;
    self.compile_expression()?;
    while self.at_symbol(',') {
      self.advance()?;
      self.compile_expression()?;
      count += 1;
    }
    Ok(count)
  }

  fn declare_names(&mut self, ty: &Type, kind: Kind) -> CompileResult<()> {
    self.declare_name(ty.clone(), kind)?;
    while self.at_symbol(',') {
      self.advance()?;
      self.declare_name(ty.clone(), kind)?;
    }
    Ok(())
  }

  fn declare_name(&mut self, ty: Type, kind: Kind) -> CompileResult<()> {
    let Some(token) = self.lexer.current() else {
      return Err(self.unexpected("a variable name"));
    };
    if token.kind != TokenKind::Identifier {
      return Err(self.unexpected("a variable name"));
    }
    let name = token.text.clone();
    self.define(&name, ty, kind)?;
    self.advance()
  }

  fn define(&mut self, name: &str, ty: Type, kind: Kind) -> CompileResult<u16> {
    self
      .symbols
      .define(name, ty, kind)
      .map_err(|err| self.unexpected(format!("a new variable name ({err})")))
  }

  /// Segment and index of the variable named by the current token.
  fn resolve_current(&self) -> CompileResult<(Segment, u16)> {
    self
      .lexer
      .current()
      .filter(|token| token.kind == TokenKind::Identifier)
      .and_then(|token| self.symbols.lookup(&token.text))
      .map(|symbol| (Segment::from(symbol.kind), symbol.index))
      .ok_or_else(|| self.unexpected("a declared variable"))
  }

  fn emit(&mut self, code: &str) -> CompileResult<()> {
    self.out.write_all(code.as_bytes()).context(EmitSnafu {
      unit: self.lexer.unit(),
    })
  }

  fn advance(&mut self) -> CompileResult<()> {
    self.lexer.advance()?;
    Ok(())
  }

  fn current_keyword(&self) -> Option<Keyword> {
    self.lexer.current().and_then(Token::keyword)
  }

  fn current_binary_op(&self) -> Option<BinaryOp> {
    match self.lexer.current()?.kind {
      TokenKind::Symbol(symbol) => BinaryOp::from_symbol(symbol),
      _ => None,
    }
  }

  fn at_symbol(&self, symbol: char) -> bool {
    self.lexer.current().is_some_and(|token| token.is_symbol(symbol))
  }

  fn eat_symbol(&mut self, symbol: char) -> CompileResult<()> {
    if !self.at_symbol(symbol) {
      return Err(self.unexpected(format!("\"{symbol}\"")));
    }
    self.advance()
  }

  fn eat_keyword(&mut self, options: &[Keyword]) -> CompileResult<Keyword> {
    match self.current_keyword() {
      Some(keyword) if options.contains(&keyword) => {
        self.advance()?;
        Ok(keyword)
      }
      _ => {
        let quoted: Vec<String> = options
          .iter()
          .map(|keyword| format!("\"{}\"", keyword.as_str()))
          .collect();
        let expected = match quoted.as_slice() {
          [single] => single.clone(),
          _ => format!("one of {}", quoted.join(", ")),
        };
        Err(self.unexpected(expected))
      }
    }
  }

  fn eat_identifier(&mut self, role: &str) -> CompileResult<String> {
    match self.lexer.current() {
      Some(token) if token.kind == TokenKind::Identifier => {
        let name = token.text.clone();
        self.advance()?;
        Ok(name)
      }
      _ => Err(self.unexpected(role)),
    }
  }

  /// `'int' | 'char' | 'boolean' | className`
  fn eat_type(&mut self) -> CompileResult<Type> {
    let ty = match self.lexer.current() {
      Some(token) => match token.kind {
        TokenKind::Keyword(Keyword::Int) => Type::Int,
        TokenKind::Keyword(Keyword::Char) => Type::Char,
        TokenKind::Keyword(Keyword::Boolean) => Type::Boolean,
        TokenKind::Identifier => Type::class(token.text.clone()),
        _ => return Err(self.unexpected("a type")),
      },
      None => return Err(self.unexpected("a type")),
    };
    self.advance()?;
    Ok(ty)
  }

  /// Structural error for the current token.
  fn unexpected(&self, expected: impl Into<String>) -> CompileError {
    let token = self.lexer.current();
    let loc = token.map_or(self.lexer.source().len(), |token| token.loc);
    CompileError::syntax(
      self.lexer.unit(),
      self.lexer.source(),
      loc,
      expected,
      describe_token(token),
    )
  }
}
