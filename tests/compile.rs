//! End-to-end tests driving the public `generate_assembly` entry point.

use hiasc::{Compilation, CompileError, generate_assembly};

fn compile(source: &str) -> Compilation {
  generate_assembly(source).expect("compilation should not hit a fatal error")
}

fn compile_clean(source: &str) -> String {
  let compilation = compile(source);
  assert!(
    compilation.errors.is_empty(),
    "unexpected diagnostics: {:?}",
    compilation.errors
  );
  compilation.asm
}

/// Numbers of the `.L{n}:` definitions, in emission order.
fn defined_labels(asm: &str) -> Vec<usize> {
  asm
    .lines()
    .filter_map(|line| line.strip_prefix(".L")?.strip_suffix(':')?.parse().ok())
    .collect()
}

#[test]
fn if_with_inline_asm_lowers_to_the_reference_shape() {
  let asm = compile_clean("func f() { reg int x = 1; if (x) { asm \"nop\"; } }");
  let expected = "\
f:
  push ebp
  mov ebp, esp
  mov eax, 1
  mov eax, eax
  mov eax, eax
  cmp eax, 0
  je .L0
nop
  jmp .L1
.L0:
.L1:
  mov esp, ebp
  pop ebp
  ret

";
  assert_eq!(asm, expected);
}

#[test]
fn empty_program_compiles_to_empty_output() {
  assert_eq!(compile_clean(""), "");
}

#[test]
fn labels_are_distinct_and_increase_across_functions() {
  let asm = compile_clean(
    "func f() { reg int x = 1; if (x) { } if (x) { } } \
     func g() { while (0) { } }",
  );
  let labels = defined_labels(&asm);
  assert_eq!(labels, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn nested_control_flow_never_reuses_a_label() {
  let asm = compile_clean("func f() { if (1) { if (2) { } while (3) { } } else { if (4) { } } }");
  let mut labels = defined_labels(&asm);
  let count = labels.len();
  labels.sort_unstable();
  labels.dedup();
  assert_eq!(labels.len(), count, "a label was emitted twice:\n{asm}");
  assert_eq!(count, 8);
}

#[test]
fn stack_offsets_restart_at_4_in_the_next_function() {
  let asm = compile_clean("func f() { int a = 1; int b = 2; } func g() { int c = 3; int d = 4; }");
  let f_body = &asm[..asm.find("g:").unwrap()];
  let g_body = &asm[asm.find("g:").unwrap()..];
  for body in [f_body, g_body] {
    assert!(body.contains("  sub esp, 8\n"));
    assert!(body.contains("  mov [ebp - 4], eax\n"));
    assert!(body.contains("  mov [ebp - 8], eax\n"));
  }
}

#[test]
fn register_identity_holds_for_the_rest_of_the_function() {
  let asm = compile_clean(
    "func f() { reg int a = 1; int spacer; reg int b = 2; b = a + b; a = b; }",
  );
  // a stays in eax and b stays in ebx through every later read and write.
  assert!(asm.contains("  mov eax, 2\n  mov ebx, eax\n"), "asm:\n{asm}");
  assert!(
    asm.contains("  mov eax, eax\n  push eax\n  mov eax, ebx\n  pop ebx\n  add eax, ebx\n  mov ebx, eax\n"),
    "asm:\n{asm}"
  );
  assert!(asm.ends_with("  mov eax, ebx\n  mov eax, eax\n  mov esp, ebp\n  pop ebp\n  ret\n\n"));
}

#[test]
fn register_occupancy_spans_the_whole_program() {
  // The pool is program-scoped: three registers in f leave one for g.
  let source = "func f() { reg int a; reg int b; reg int c; } \
                func g() { reg int d; reg int e; }";
  let err = generate_assembly(source).unwrap_err();
  assert!(matches!(err, CompileError::Capacity { ref function } if function == "g"));
}

#[test]
fn undeclared_call_records_one_error_and_emits_no_call() {
  let compilation = compile("func f() { missing(1, 2); }");
  assert_eq!(compilation.errors, vec!["undeclared function 'missing'"]);
  assert!(!compilation.asm.contains("call"));
}

#[test]
fn declared_call_is_checked_against_its_parameters() {
  let compilation = compile(
    "func g(int a, byte b) { } \
     func f() { ptr p; g(1, p); }",
  );
  assert_eq!(
    compilation.errors,
    vec!["type mismatch for argument 2 of 'g': expected byte, got ptr"]
  );
  assert!(compilation.asm.contains("  call g\n  add esp, 8\n"));
}

#[test]
fn byte_and_int_assignments_are_silent() {
  let compilation = compile(
    "func f() { reg byte b = 200; int x = 5; b = x; x = b; }",
  );
  assert!(compilation.errors.is_empty(), "{:?}", compilation.errors);
}

#[test]
fn pointer_assignment_mismatch_is_exactly_one_error() {
  let compilation = compile("func f() { ptr p; reg int x = 0; x = p; }");
  assert_eq!(
    compilation.errors,
    vec!["type mismatch for assignment to 'x': expected int, got ptr"]
  );
}

#[test]
fn semantic_errors_accumulate_across_one_run() {
  let compilation = compile(
    "func f() { x = 1; y = 2; missing(); reg int a; reg int a; }",
  );
  assert_eq!(
    compilation.errors,
    vec![
      "undeclared variable 'x'",
      "undeclared variable 'y'",
      "undeclared function 'missing'",
      "redeclaration of 'a'",
    ]
  );
}

#[test]
fn lexical_and_syntax_failures_are_fatal() {
  assert!(matches!(
    generate_assembly("func f() { reg int x = $1; }"),
    Err(CompileError::Lexical { .. })
  ));
  assert!(matches!(
    generate_assembly("func f() { for (x) { } }"),
    Err(CompileError::Syntax { .. })
  ));
  assert!(matches!(
    generate_assembly("func f() { return 1; }"),
    Err(CompileError::Unsupported { ref construct }) if construct == "return"
  ));
}

#[test]
fn heap_grow_and_pointer_store_round_out_the_surface() {
  let asm = compile_clean(
    "func f() { ptr p; @alloc(32); @free(p); @p = 7; }",
  );
  assert!(asm.contains("  int 0x80\n"));
  assert!(asm.contains("  mov [eax], ebx\n"));
}
