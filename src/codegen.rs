//! Code generation: lower the hiasm AST into 32-bit x86 assembly.
//!
//! One pre-order walk does everything – symbol resolution, type checking,
//! register allocation, frame layout and control-flow lowering. Emitted
//! text embeds label numbers, register names and frame offsets by value,
//! so the walk order is the output order and nothing can be revised after
//! it has been written. The accumulator for expression results is `eax`;
//! binary operations preserve the left operand on the machine stack while
//! the right one is evaluated.

use crate::error::{CompileError, CompileResult};
use crate::parser::{AstNode, BinOp, Param};
use crate::symbol::{DataType, Location, StorageKind, Symbol, SymbolTable, compatible};

/// The pool backing `reg` declarations. `eax` doubles as the accumulator.
const REG_NAMES: [&str; 4] = ["eax", "ebx", "ecx", "edx"];

/// Result of a completed traversal: the emitted text plus any semantic
/// diagnostics accumulated along the way.
#[derive(Debug)]
pub struct Compilation {
  pub asm: String,
  pub errors: Vec<String>,
}

/// Mutable compilation state, threaded by reference through the whole
/// traversal. Exactly one instance exists per compilation.
struct CompilerContext {
  symbols: SymbolTable,
  stack_offset: i32,
  label_counter: usize,
  reg_used: [bool; 4],
  current_func: String,
  errors: Vec<String>,
}

impl CompilerContext {
  fn new() -> Self {
    Self {
      symbols: SymbolTable::new(),
      stack_offset: 0,
      label_counter: 0,
      reg_used: [false; 4],
      current_func: String::new(),
      errors: Vec::new(),
    }
  }

  /// Fresh label number; labels are never reused across the compilation.
  fn next_label(&mut self) -> usize {
    let label = self.label_counter;
    self.label_counter += 1;
    label
  }

  /// First free slot of the pool. Occupancy is program-scoped: slots are
  /// never returned, so a fifth live `reg` declaration anywhere is fatal.
  fn alloc_register(&mut self) -> CompileResult<usize> {
    match self.reg_used.iter().position(|used| !used) {
      Some(reg) => {
        self.reg_used[reg] = true;
        Ok(reg)
      }
      None => Err(CompileError::Capacity {
        function: self.current_func.clone(),
      }),
    }
  }

  /// Record a semantic diagnostic; the traversal keeps going.
  fn error(&mut self, message: impl Into<String>) {
    self.errors.push(message.into());
  }
}

/// Emit assembly for a whole program.
pub fn generate(program: &[AstNode]) -> CompileResult<Compilation> {
  let mut ctx = CompilerContext::new();
  let mut asm = String::new();

  for function in program {
    gen_function(function, &mut ctx, &mut asm)?;
  }

  Ok(Compilation {
    asm,
    errors: ctx.errors,
  })
}

fn gen_function(node: &AstNode, ctx: &mut CompilerContext, asm: &mut String) -> CompileResult<()> {
  let AstNode::Function { name, params, body } = node else {
    return Err(CompileError::Structural {
      message: format!("expected a function at top level, got {node:?}"),
    });
  };

  ctx.current_func = name.clone();

  // The function itself goes into the flat table so call sites can check
  // argument counts and types; recursion resolves through this entry too.
  let param_types: Vec<DataType> = params.iter().map(|p| param_type(p, ctx)).collect();
  if !ctx.symbols.declare(
    name,
    Symbol::Function {
      params: param_types,
    },
  ) {
    ctx.error(format!("redeclaration of '{name}'"));
  }

  asm.push_str(&format!("{name}:\n"));
  asm.push_str("  push ebp\n");
  asm.push_str("  mov ebp, esp\n");

  // The reservation is emitted before any body statement, so the frame is
  // sized by a pre-scan rather than the running offset counter.
  let frame = frame_size(body);
  if frame > 0 {
    asm.push_str(&format!("  sub esp, {frame}\n"));
  }

  for stmt in body {
    gen_stmt(stmt, ctx, asm)?;
  }

  asm.push_str("  mov esp, ebp\n");
  asm.push_str("  pop ebp\n");
  asm.push_str("  ret\n\n");

  ctx.stack_offset = 0;
  Ok(())
}

fn param_type(param: &Param, ctx: &mut CompilerContext) -> DataType {
  match DataType::from_keyword(&param.ty) {
    Some(ty) => ty,
    None => {
      ctx.error(format!(
        "unknown type '{}' for parameter '{}'",
        param.ty, param.name
      ));
      DataType::Int
    }
  }
}

/// Bytes of frame space the body will consume: 4 per stack declaration,
/// including declarations nested in `if`/`while` bodies.
fn frame_size(body: &[AstNode]) -> i32 {
  body
    .iter()
    .map(|node| match node {
      AstNode::VarDecl { .. } => 4,
      AstNode::If {
        then_body,
        else_body,
        ..
      } => {
        frame_size(then_body)
          + else_body
            .as_ref()
            .map_or(0, |else_body| frame_size(else_body))
      }
      AstNode::While { body, .. } => frame_size(body),
      _ => 0,
    })
    .sum()
}

fn gen_stmt(node: &AstNode, ctx: &mut CompilerContext, asm: &mut String) -> CompileResult<()> {
  match node {
    AstNode::RegDecl { ty, name, init } => {
      let Some(decl_ty) = DataType::from_keyword(ty) else {
        ctx.error(format!("unknown type '{ty}' for '{name}'"));
        return Ok(());
      };
      // Duplicates are rejected before allocation so they never consume a
      // register slot.
      if ctx.symbols.contains(name) {
        ctx.error(format!("redeclaration of '{name}'"));
        return Ok(());
      }
      let reg = ctx.alloc_register()?;
      ctx.symbols.declare(
        name,
        Symbol::Data {
          storage: StorageKind::Register,
          ty: decl_ty,
          location: Location::Register(reg),
        },
      );
      if let Some(init) = init {
        check_type(
          decl_ty,
          infer_type(init, ctx),
          &format!("initializer of '{name}'"),
          ctx,
        );
        gen_expr(init, ctx, asm)?;
        asm.push_str(&format!("  mov {}, eax\n", REG_NAMES[reg]));
      }
      Ok(())
    }

    AstNode::VarDecl { ty, name, init } => {
      let Some(decl_ty) = DataType::from_keyword(ty) else {
        ctx.error(format!("unknown type '{ty}' for '{name}'"));
        return Ok(());
      };
      if ctx.symbols.contains(name) {
        ctx.error(format!("redeclaration of '{name}'"));
        return Ok(());
      }
      ctx.stack_offset += 4;
      let offset = ctx.stack_offset;
      let storage = if decl_ty.is_pointer() {
        StorageKind::Pointer
      } else {
        StorageKind::Stack
      };
      ctx.symbols.declare(
        name,
        Symbol::Data {
          storage,
          ty: decl_ty,
          location: Location::Frame(offset),
        },
      );
      if let Some(init) = init {
        check_type(
          decl_ty,
          infer_type(init, ctx),
          &format!("initializer of '{name}'"),
          ctx,
        );
        gen_expr(init, ctx, asm)?;
        asm.push_str(&format!("  mov [ebp - {offset}], eax\n"));
      }
      Ok(())
    }

    // The only point where unchecked text enters the output.
    AstNode::InlineAsm { text } => {
      asm.push_str(text);
      asm.push('\n');
      Ok(())
    }

    AstNode::If {
      cond,
      then_body,
      else_body,
    } => {
      let label_else = ctx.next_label();
      let label_end = ctx.next_label();

      gen_expr(cond, ctx, asm)?;
      asm.push_str("  cmp eax, 0\n");
      asm.push_str(&format!("  je .L{label_else}\n"));

      for stmt in then_body {
        gen_stmt(stmt, ctx, asm)?;
      }
      asm.push_str(&format!("  jmp .L{label_end}\n"));
      asm.push_str(&format!(".L{label_else}:\n"));

      if let Some(else_body) = else_body {
        for stmt in else_body {
          gen_stmt(stmt, ctx, asm)?;
        }
      }

      asm.push_str(&format!(".L{label_end}:\n"));
      Ok(())
    }

    AstNode::While { cond, body } => {
      let label_start = ctx.next_label();
      let label_end = ctx.next_label();

      asm.push_str(&format!(".L{label_start}:\n"));
      gen_expr(cond, ctx, asm)?;
      asm.push_str("  cmp eax, 0\n");
      asm.push_str(&format!("  je .L{label_end}\n"));

      for stmt in body {
        gen_stmt(stmt, ctx, asm)?;
      }
      asm.push_str(&format!("  jmp .L{label_start}\n"));
      asm.push_str(&format!(".L{label_end}:\n"));
      Ok(())
    }

    AstNode::Assign { name, value } => {
      let Some(symbol) = ctx.symbols.lookup(name).cloned() else {
        ctx.error(format!("undeclared variable '{name}'"));
        return Ok(());
      };
      let Symbol::Data { ty, location, .. } = symbol else {
        ctx.error(format!("'{name}' is not a variable"));
        return Ok(());
      };

      gen_expr(value, ctx, asm)?;
      check_type(
        ty,
        infer_type(value, ctx),
        &format!("assignment to '{name}'"),
        ctx,
      );

      match location {
        Location::Register(reg) => {
          asm.push_str(&format!("  mov {}, eax\n", REG_NAMES[reg]));
        }
        Location::Frame(offset) => {
          asm.push_str(&format!("  mov [ebp - {offset}], eax\n"));
        }
      }
      Ok(())
    }

    AstNode::Call { callee, args } => {
      let Some(symbol) = ctx.symbols.lookup(callee).cloned() else {
        ctx.error(format!("undeclared function '{callee}'"));
        return Ok(());
      };
      let Symbol::Function { params } = symbol else {
        ctx.error(format!("'{callee}' is not a function"));
        return Ok(());
      };

      if args.len() != params.len() {
        ctx.error(format!(
          "'{callee}' expects {} argument(s), got {}",
          params.len(),
          args.len()
        ));
      }

      // Arguments are evaluated and pushed left to right, then popped off
      // in one adjustment after the call.
      for (i, arg) in args.iter().enumerate() {
        if let Some(&param_ty) = params.get(i) {
          check_type(
            param_ty,
            infer_type(arg, ctx),
            &format!("argument {} of '{callee}'", i + 1),
            ctx,
          );
        }
        gen_expr(arg, ctx, asm)?;
        asm.push_str("  push eax\n");
      }

      asm.push_str(&format!("  call {callee}\n"));
      if !args.is_empty() {
        asm.push_str(&format!("  add esp, {}\n", 4 * args.len()));
      }
      Ok(())
    }

    AstNode::PtrOp { name, arg } => gen_ptr_op(name, arg, ctx, asm),

    AstNode::Return { .. } => Err(CompileError::Unsupported {
      construct: "return".to_string(),
    }),

    node => Err(CompileError::Structural {
      message: format!("expression node in statement position: {node:?}"),
    }),
  }
}

/// The pointer construct, discriminated on its name: the heap-grow
/// intrinsic, the deliberate `free` no-op, or a dereferenced store through
/// a frame-resident pointer cell.
fn gen_ptr_op(
  name: &str,
  arg: &AstNode,
  ctx: &mut CompilerContext,
  asm: &mut String,
) -> CompileResult<()> {
  match name {
    "alloc" => {
      // brk(0) to find the current break, then brk(break + size). The new
      // break is left in eax.
      gen_expr(arg, ctx, asm)?;
      asm.push_str("  push eax\n");
      asm.push_str("  mov eax, 45\n");
      asm.push_str("  xor ebx, ebx\n");
      asm.push_str("  int 0x80\n");
      asm.push_str("  pop ebx\n");
      asm.push_str("  add eax, ebx\n");
      asm.push_str("  mov ebx, eax\n");
      asm.push_str("  mov eax, 45\n");
      asm.push_str("  int 0x80\n");
      Ok(())
    }

    // Regions are never reclaimed.
    "free" => Ok(()),

    _ => {
      let Some(symbol) = ctx.symbols.lookup(name).cloned() else {
        ctx.error(format!("undeclared pointer '{name}'"));
        return Ok(());
      };
      match symbol {
        Symbol::Data {
          storage: StorageKind::Pointer,
          location: Location::Frame(offset),
          ..
        } => {
          gen_expr(arg, ctx, asm)?;
          asm.push_str("  mov ebx, eax\n");
          asm.push_str(&format!("  mov eax, [ebp - {offset}]\n"));
          asm.push_str("  mov [eax], ebx\n");
          Ok(())
        }
        _ => {
          ctx.error(format!("'{name}' is not a stack-resident pointer"));
          Ok(())
        }
      }
    }
  }
}

fn gen_expr(node: &AstNode, ctx: &mut CompilerContext, asm: &mut String) -> CompileResult<()> {
  match node {
    AstNode::Num { value } => {
      asm.push_str(&format!("  mov eax, {value}\n"));
      Ok(())
    }

    AstNode::Var { name } => {
      let Some(symbol) = ctx.symbols.lookup(name).cloned() else {
        ctx.error(format!("undeclared variable '{name}'"));
        return Ok(());
      };
      match symbol {
        Symbol::Data {
          location: Location::Register(reg),
          ..
        } => {
          asm.push_str(&format!("  mov eax, {}\n", REG_NAMES[reg]));
        }
        Symbol::Data {
          location: Location::Frame(offset),
          ..
        } => {
          asm.push_str(&format!("  mov eax, [ebp - {offset}]\n"));
        }
        Symbol::Function { .. } => {
          ctx.error(format!("'{name}' is not a variable"));
        }
      }
      Ok(())
    }

    AstNode::Binary { op, lhs, rhs } => {
      let lhs_ty = infer_type(lhs, ctx);
      let rhs_ty = infer_type(rhs, ctx);
      if lhs_ty.is_pointer() || rhs_ty.is_pointer() {
        ctx.error("pointer operand in arithmetic operation".to_string());
      } else if !compatible(lhs_ty, rhs_ty) {
        ctx.error(format!(
          "type mismatch in binary operation: {lhs_ty} vs {rhs_ty}"
        ));
      }

      gen_expr(lhs, ctx, asm)?;
      asm.push_str("  push eax\n");
      gen_expr(rhs, ctx, asm)?;
      asm.push_str("  pop ebx\n");
      match op {
        BinOp::Add => asm.push_str("  add eax, ebx\n"),
        BinOp::Sub => asm.push_str("  sub eax, ebx\n"),
        BinOp::Mul => asm.push_str("  imul eax, ebx\n"),
        BinOp::Div => {
          // Sign-extend the dividend into edx:eax first.
          asm.push_str("  cdq\n");
          asm.push_str("  idiv ebx\n");
        }
      }
      Ok(())
    }

    node => Err(CompileError::Structural {
      message: format!("statement node in expression position: {node:?}"),
    }),
  }
}

/// Best-effort data type of an expression. Unresolved names default to
/// `int` so one missing declaration does not cascade into spurious
/// mismatch reports.
fn infer_type(node: &AstNode, ctx: &CompilerContext) -> DataType {
  match node {
    AstNode::Var { name } => match ctx.symbols.lookup(name) {
      Some(Symbol::Data { ty, .. }) => *ty,
      _ => DataType::Int,
    },
    AstNode::Binary { lhs, rhs, .. } => {
      let lhs_ty = infer_type(lhs, ctx);
      let rhs_ty = infer_type(rhs, ctx);
      if lhs_ty.is_pointer() || rhs_ty.is_pointer() {
        DataType::Ptr
      } else {
        lhs_ty
      }
    }
    _ => DataType::Int,
  }
}

/// Record a diagnostic when `actual` cannot flow into `expected`.
fn check_type(expected: DataType, actual: DataType, context: &str, ctx: &mut CompilerContext) {
  if !compatible(expected, actual) {
    ctx.error(format!(
      "type mismatch for {context}: expected {expected}, got {actual}"
    ));
  }
}
