//! Recursive-descent parser producing the hiasm AST.
//!
//! One function node per `func` definition, each owning its parameter list
//! and body statements. Statement dispatch looks at the leading token (plus
//! one extra token of peek-ahead to tell declarations, assignments and
//! calls apart when a statement begins with an identifier). Expressions are
//! a single left-associative tier: hiasm gives `+ - * /` equal precedence.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Keyword, Token, TokenKind, describe_token, string_text, token_text};

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
}

/// A declared function parameter. Parameter types participate in call-site
/// checking; the names are never bound to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
  pub ty: String,
  pub name: String,
}

/// Expression and statement tree produced by the parser. Each node owns its
/// children; the code generator walks the tree without mutating it.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
  Function {
    name: String,
    params: Vec<Param>,
    body: Vec<AstNode>,
  },
  RegDecl {
    ty: String,
    name: String,
    init: Option<Box<AstNode>>,
  },
  VarDecl {
    ty: String,
    name: String,
    init: Option<Box<AstNode>>,
  },
  InlineAsm {
    text: String,
  },
  If {
    cond: Box<AstNode>,
    then_body: Vec<AstNode>,
    else_body: Option<Vec<AstNode>>,
  },
  While {
    cond: Box<AstNode>,
    body: Vec<AstNode>,
  },
  Assign {
    name: String,
    value: Box<AstNode>,
  },
  Call {
    callee: String,
    args: Vec<AstNode>,
  },
  /// Declared vocabulary without a lowering; the generator rejects it.
  Return {
    value: Option<Box<AstNode>>,
  },
  /// The value-discriminated pointer construct: `@alloc(n)`, `@free(p)`,
  /// or a dereferenced store `@p = expr`.
  PtrOp {
    name: String,
    arg: Box<AstNode>,
  },
  Binary {
    op: BinOp,
    lhs: Box<AstNode>,
    rhs: Box<AstNode>,
  },
  Num {
    value: i64,
  },
  Var {
    name: String,
  },
}

impl AstNode {
  pub fn number(value: i64) -> Self {
    Self::Num { value }
  }

  pub fn var(name: impl Into<String>) -> Self {
    Self::Var { name: name.into() }
  }

  pub fn binary(op: BinOp, lhs: AstNode, rhs: AstNode) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }
}

/// Parse a whole compilation unit: a (possibly empty) run of functions.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Vec<AstNode>> {
  let mut stream = TokenStream::new(tokens, source);
  let mut functions = Vec::new();

  while !stream.is_eof() {
    functions.push(parse_function(&mut stream)?);
  }

  Ok(functions)
}

fn parse_function(stream: &mut TokenStream) -> CompileResult<AstNode> {
  stream.expect_keyword(Keyword::Func)?;
  let (name, _) = stream.get_ident()?;
  stream.skip("(")?;

  let mut params = Vec::new();
  if !stream.equal(")") {
    loop {
      let (ty, _) = stream.get_ident()?;
      let (param_name, _) = stream.get_ident()?;
      params.push(Param {
        ty,
        name: param_name,
      });
      if !stream.equal(",") {
        break;
      }
    }
    stream.skip(")")?;
  }

  let body = parse_block(stream)?;
  Ok(AstNode::Function { name, params, body })
}

fn parse_block(stream: &mut TokenStream) -> CompileResult<Vec<AstNode>> {
  stream.skip("{")?;
  let mut stmts = Vec::new();

  while !stream.equal("}") {
    if stream.is_eof() {
      return Err(CompileError::syntax(
        stream.source,
        stream.source.len(),
        "expected \"}\" before end of input",
      ));
    }
    stmts.push(parse_statement(stream)?);
  }

  Ok(stmts)
}

fn parse_statement(stream: &mut TokenStream) -> CompileResult<AstNode> {
  match stream.peek().map(|token| token.kind) {
    Some(TokenKind::Keyword(Keyword::Reg)) => parse_reg_decl(stream),
    Some(TokenKind::Keyword(Keyword::Asm)) => parse_inline_asm(stream),
    Some(TokenKind::Keyword(Keyword::If)) => parse_if(stream),
    Some(TokenKind::Keyword(Keyword::While)) => parse_while(stream),
    Some(TokenKind::Keyword(Keyword::Return)) => parse_return(stream),
    Some(TokenKind::Keyword(Keyword::For)) => Err(CompileError::syntax(
      stream.source,
      stream.loc(),
      "for loops are not supported",
    )),
    Some(TokenKind::Punct) if stream.at("@") => parse_ptr_stmt(stream),
    Some(TokenKind::Ident) => parse_ident_statement(stream),
    _ => {
      let got = describe_token(stream.peek(), stream.source);
      Err(CompileError::syntax(
        stream.source,
        stream.loc(),
        format!("expected a statement, but got \"{got}\""),
      ))
    }
  }
}

/// A statement that starts with an identifier is a stack declaration
/// (`int x ...`), an assignment (`x = ...`) or a call (`x(...)`); the token
/// after the identifier decides which.
fn parse_ident_statement(stream: &mut TokenStream) -> CompileResult<AstNode> {
  if stream.second_is_ident() {
    return parse_var_decl(stream);
  }
  if stream.second_is_punct("=") {
    return parse_assign(stream);
  }
  if stream.second_is_punct("(") {
    return parse_call(stream);
  }

  let (loc, got) = match stream.second() {
    Some(token) => (token.loc, describe_token(Some(token), stream.source)),
    None => (stream.source.len(), "EOF".to_string()),
  };
  Err(CompileError::syntax(
    stream.source,
    loc,
    format!("expected a declaration, assignment or call, but got \"{got}\""),
  ))
}

fn parse_reg_decl(stream: &mut TokenStream) -> CompileResult<AstNode> {
  stream.expect_keyword(Keyword::Reg)?;
  let (ty, _) = stream.get_ident()?;
  let (name, _) = stream.get_ident()?;
  let init = parse_opt_initializer(stream)?;
  stream.skip(";")?;
  Ok(AstNode::RegDecl { ty, name, init })
}

fn parse_var_decl(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let (ty, _) = stream.get_ident()?;
  let (name, _) = stream.get_ident()?;
  let init = parse_opt_initializer(stream)?;
  stream.skip(";")?;
  Ok(AstNode::VarDecl { ty, name, init })
}

fn parse_opt_initializer(stream: &mut TokenStream) -> CompileResult<Option<Box<AstNode>>> {
  if stream.equal("=") {
    Ok(Some(Box::new(parse_expr(stream)?)))
  } else {
    Ok(None)
  }
}

fn parse_inline_asm(stream: &mut TokenStream) -> CompileResult<AstNode> {
  stream.expect_keyword(Keyword::Asm)?;
  let (text, _) = stream.get_string()?;
  stream.skip(";")?;
  Ok(AstNode::InlineAsm { text })
}

fn parse_if(stream: &mut TokenStream) -> CompileResult<AstNode> {
  stream.expect_keyword(Keyword::If)?;
  stream.skip("(")?;
  let cond = Box::new(parse_expr(stream)?);
  stream.skip(")")?;
  let then_body = parse_block(stream)?;
  let else_body = if stream.take_keyword(Keyword::Else) {
    Some(parse_block(stream)?)
  } else {
    None
  };
  Ok(AstNode::If {
    cond,
    then_body,
    else_body,
  })
}

fn parse_while(stream: &mut TokenStream) -> CompileResult<AstNode> {
  stream.expect_keyword(Keyword::While)?;
  stream.skip("(")?;
  let cond = Box::new(parse_expr(stream)?);
  stream.skip(")")?;
  let body = parse_block(stream)?;
  Ok(AstNode::While { cond, body })
}

fn parse_return(stream: &mut TokenStream) -> CompileResult<AstNode> {
  stream.expect_keyword(Keyword::Return)?;
  if stream.equal(";") {
    return Ok(AstNode::Return { value: None });
  }
  let value = parse_expr(stream)?;
  stream.skip(";")?;
  Ok(AstNode::Return {
    value: Some(Box::new(value)),
  })
}

fn parse_assign(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let (name, _) = stream.get_ident()?;
  stream.skip("=")?;
  let value = parse_expr(stream)?;
  stream.skip(";")?;
  Ok(AstNode::Assign {
    name,
    value: Box::new(value),
  })
}

fn parse_call(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let (callee, _) = stream.get_ident()?;
  stream.skip("(")?;

  let mut args = Vec::new();
  if !stream.equal(")") {
    loop {
      args.push(parse_expr(stream)?);
      if !stream.equal(",") {
        break;
      }
    }
    stream.skip(")")?;
  }

  stream.skip(";")?;
  Ok(AstNode::Call { callee, args })
}

/// `@alloc(size);`, `@free(ptr);` or the dereferenced store `@name = expr;`.
fn parse_ptr_stmt(stream: &mut TokenStream) -> CompileResult<AstNode> {
  stream.skip("@")?;
  let (name, _) = stream.get_ident()?;

  let arg = if name == "alloc" || name == "free" {
    stream.skip("(")?;
    let expr = parse_expr(stream)?;
    stream.skip(")")?;
    expr
  } else {
    stream.skip("=")?;
    parse_expr(stream)?
  };

  stream.skip(";")?;
  Ok(AstNode::PtrOp {
    name,
    arg: Box::new(arg),
  })
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let mut node = parse_term(stream)?;

  loop {
    let op = if stream.equal("+") {
      BinOp::Add
    } else if stream.equal("-") {
      BinOp::Sub
    } else if stream.equal("*") {
      BinOp::Mul
    } else if stream.equal("/") {
      BinOp::Div
    } else {
      break;
    };

    let rhs = parse_term(stream)?;
    node = AstNode::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_term(stream: &mut TokenStream) -> CompileResult<AstNode> {
  if stream.equal("(") {
    let node = parse_expr(stream)?;
    stream.skip(")")?;
    return Ok(node);
  }

  if matches!(
    stream.peek().map(|token| token.kind),
    Some(TokenKind::Ident)
  ) {
    let (name, _) = stream.get_ident()?;
    return Ok(AstNode::var(name));
  }

  let (value, _) = stream.get_number()?;
  Ok(AstNode::number(value))
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn second(&self) -> Option<&Token> {
    self.tokens.get(self.pos + 1)
  }

  /// Byte offset of the current token, for error anchoring.
  fn loc(&self) -> usize {
    self.peek().map_or(self.source.len(), |token| token.loc)
  }

  /// Non-consuming test for the current punctuator.
  fn at(&self, op: &str) -> bool {
    matches!(self.peek(), Some(token)
      if token.kind == TokenKind::Punct && token_text(token, self.source) == op)
  }

  fn second_is_ident(&self) -> bool {
    matches!(self.second(), Some(token) if token.kind == TokenKind::Ident)
  }

  fn second_is_punct(&self, op: &str) -> bool {
    matches!(self.second(), Some(token)
      if token.kind == TokenKind::Punct && token_text(token, self.source) == op)
  }

  /// Consume the current token if it matches the provided punctuator.
  fn equal(&mut self, op: &str) -> bool {
    if self.at(op) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s) {
      Ok(())
    } else {
      let (loc, got) = match self.tokens.get(self.pos) {
        Some(token) => (token.loc, describe_token(Some(token), self.source)),
        None => (self.source.len(), "EOF".to_string()),
      };
      Err(CompileError::syntax(
        self.source,
        loc,
        format!("expected \"{s}\", but got \"{got}\""),
      ))
    }
  }

  /// Consume the current token if it is the given keyword.
  fn take_keyword(&mut self, keyword: Keyword) -> bool {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Keyword(keyword)
    {
      self.pos += 1;
      return true;
    }
    false
  }

  fn expect_keyword(&mut self, keyword: Keyword) -> CompileResult<()> {
    if self.take_keyword(keyword) {
      Ok(())
    } else {
      let got = describe_token(self.peek(), self.source);
      Err(CompileError::syntax(
        self.source,
        self.loc(),
        format!("expected \"{}\", but got \"{got}\"", keyword.spelling()),
      ))
    }
  }

  /// Parse the current token as an identifier, returning its text and location.
  fn get_ident(&mut self) -> CompileResult<(String, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Ident
    {
      let text = token_text(token, self.source).to_string();
      let loc = token.loc;
      self.pos += 1;
      return Ok((text, loc));
    }

    let got = describe_token(self.peek(), self.source);
    Err(CompileError::syntax(
      self.source,
      self.loc(),
      format!("expected an identifier, but got \"{got}\""),
    ))
  }

  /// Parse the current token as an integer literal, returning its value and location.
  fn get_number(&mut self) -> CompileResult<(i64, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Num
    {
      let value = token.value.ok_or_else(|| CompileError::Structural {
        message: "numeric token missing value".to_string(),
      })?;
      let loc = token.loc;
      self.pos += 1;
      return Ok((value, loc));
    }

    let got = describe_token(self.peek(), self.source);
    Err(CompileError::syntax(
      self.source,
      self.loc(),
      format!("expected a number, but got \"{got}\""),
    ))
  }

  /// Parse the current token as an inline-assembly string, returning its
  /// content (quotes stripped) and location.
  fn get_string(&mut self) -> CompileResult<(String, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Str
    {
      let text = string_text(token, self.source).to_string();
      let loc = token.loc;
      self.pos += 1;
      return Ok((text, loc));
    }

    let got = describe_token(self.peek(), self.source);
    Err(CompileError::syntax(
      self.source,
      self.loc(),
      format!("expected inline-assembly text, but got \"{got}\""),
    ))
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), Some(TokenKind::Eof))
  }
}
