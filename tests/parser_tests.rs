//! Front-end behavior: grammar acceptance, parse errors, binding.

use ebs::builtins::BuiltinRegistry;
use ebs::{Diagnostic, Program};

fn parse(source: &str) -> Result<Program, Vec<Diagnostic>> {
    let builtins = BuiltinRegistry::standard();
    Program::parse(source, &builtins)
}

fn parse_err(source: &str) -> Vec<Diagnostic> {
    parse(source).expect_err("expected a parse failure")
}

#[test]
fn blocks_are_split_from_statements() {
    let program = parse(
        r#"
        helper(n: integer) return integer { return n + 1; }
        var x: integer = 1;
        print x;
        "#,
    )
    .unwrap();
    assert_eq!(program.blocks.len(), 1);
    assert!(program.blocks.contains_key("helper"));
    assert_eq!(program.statements.len(), 2);
}

#[test]
fn parse_is_deterministic() {
    let source = r#"
        pos typeof record { x:int, y:int };
        var p = pos { x: 1, y: 2 };
        loop(n: integer = 3) { while (n > 0) { n--; } }
        call loop();
    "#;
    let a = format!("{:?}", parse(source).unwrap().statements);
    let b = format!("{:?}", parse(source).unwrap().statements);
    assert_eq!(a, b);
}

#[test]
fn break_and_continue_need_a_loop() {
    let errs = parse_err("break;");
    assert!(errs[0].message.contains("'break' outside a loop"));
    let errs = parse_err("if (true) then continue;");
    assert!(errs[0].message.contains("'continue' outside a loop"));
    // Loops inside a block body count; the block boundary resets them.
    assert!(parse("f() { while (true) { break; } }").is_ok());
    let errs = parse_err("while (true) { g() { break; } }");
    assert!(errs[0].message.contains("'break' outside a loop"));
}

#[test]
fn return_needs_a_function() {
    let errs = parse_err("return 1;");
    assert!(errs[0].message.contains("'return' outside a function"));
    assert!(parse("f() return integer { return 1; }").is_ok());
}

#[test]
fn lex_errors_surface_as_diagnostics_with_lines() {
    let errs = parse_err("var a = 1;\nvar b = @;\n");
    assert!(errs.iter().any(|d| d.line == 2));
    assert_eq!(errs[0].kind, "PARSE_ERROR");
}

#[test]
fn bit_field_overlap_is_rejected_at_parse_time() {
    let errs = parse_err("flags typeof bitmap { a:0-2, b:2-4 };");
    assert!(errs[0].message.contains("overlap"));
    let errs = parse_err("flags typeof bitmap { a:0-8 };");
    assert!(errs[0].message.contains("exceeds"));
    // Intmap allows the full 32-bit range.
    assert!(parse("wide typeof intmap { a:0-15, b:16-31 };").is_ok());
    let errs = parse_err("wide typeof intmap { a:30-32 };");
    assert!(!errs.is_empty());
}

#[test]
fn duplicate_cursor_names_are_rejected() {
    let errs = parse_err(
        r#"
        cursor c = select * from t;
        cursor c = select * from u;
        "#,
    );
    assert!(errs[0].message.contains("already declared"));
}

#[test]
fn unknown_type_names_fail() {
    let errs = parse_err("var x: nothing = 1;");
    assert!(errs[0].message.contains("unknown type"));
}

#[test]
fn missing_mandatory_parameters_fail_at_bind_time() {
    let errs = parse_err(
        r#"
        greet(who: string) { print who; }
        call greet();
        "#,
    );
    assert!(errs[0].message.contains("Missing parameters"));
}

#[test]
fn too_many_positionals_fail_at_bind_time() {
    let errs = parse_err(
        r#"
        greet(who: string) { print who; }
        call greet("a", "b");
        "#,
    );
    assert!(errs[0].message.contains("Too many value parameters"));
}

#[test]
fn unknown_named_parameter_fails() {
    let errs = parse_err(
        r#"
        greet(who: string) { print who; }
        call greet(whom="a");
        "#,
    );
    assert!(errs[0].message.contains("unknown parameter 'whom'"));
}

#[test]
fn unknown_forced_builtin_fails() {
    let errs = parse_err("var x = #nope.missing(1);");
    assert!(errs[0].message.contains("unknown builtin"));
}

#[test]
fn unresolved_plain_calls_are_left_for_runtime() {
    // Unknown names might arrive via runtime import, so they parse.
    assert!(parse("call laterDefined(1);").is_ok());
}

#[test]
fn standard_raise_takes_at_most_one_parameter() {
    let errs = parse_err(r#"raise exception IO_ERROR("a", "b");"#);
    assert!(errs[0].message.contains("at most one message parameter"));
    assert!(parse(r#"raise exception CUSTOM("a", "b", 3);"#).is_ok());
}

#[test]
fn close_disambiguates_cursor_from_connection() {
    let program = parse(
        r#"
        cursor c = select * from t;
        close c;
        close db;
        "#,
    )
    .unwrap();
    let kinds: Vec<&str> = program
        .statements
        .iter()
        .map(|s| match s {
            ebs::syntax::Statement::CursorDecl { .. } => "decl",
            ebs::syntax::Statement::CloseCursor { .. } => "cursor",
            ebs::syntax::Statement::CloseConnection { .. } => "connection",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["decl", "cursor", "connection"]);
}

#[test]
fn json_slices_are_verbatim_source() {
    let program = parse(r#"var j: json = { "a": [1, 2], "b": "x" };"#).unwrap();
    match &program.statements[0] {
        ebs::syntax::Statement::VarDecl {
            init: Some(ebs::syntax::Expression::JsonLiteral { raw, .. }),
            ..
        } => {
            assert_eq!(raw, r#"{ "a": [1, 2], "b": "x" }"#);
        }
        other => panic!("unexpected statement shape: {other:?}"),
    }
}

#[test]
fn select_slices_run_to_the_semicolon() {
    let program = parse("cursor c = select id, name from users where id = :id;").unwrap();
    match &program.statements[0] {
        ebs::syntax::Statement::CursorDecl { sql, .. } => {
            assert_eq!(sql, "select id, name from users where id = :id");
        }
        other => panic!("unexpected statement shape: {other:?}"),
    }
}

#[test]
fn chained_comparisons_build_one_node() {
    let program = parse("var ok = 1 < 2 <= 3 < 4;").unwrap();
    match &program.statements[0] {
        ebs::syntax::Statement::VarDecl {
            init: Some(ebs::syntax::Expression::Chained { operands, ops, .. }),
            ..
        } => {
            assert_eq!(operands.len(), 4);
            assert_eq!(ops.len(), 3);
        }
        other => panic!("unexpected statement shape: {other:?}"),
    }
}

#[test]
fn normalized_calls_cover_every_formal() {
    let program = parse(
        r#"
        f(a: integer, b: integer = 2, c: string = "x") { print a; }
        call f(1);
        call f(a=5, c="y");
        "#,
    )
    .unwrap();
    for stmt in &program.statements {
        let ebs::syntax::Statement::Call(call) = stmt else {
            continue;
        };
        let normalized = call.normalized.as_ref().expect("bound call");
        assert_eq!(normalized.len(), 3);
    }
}

#[test]
fn garbage_inputs_error_without_panicking() {
    for source in [
        "var",
        "if (",
        "f(((",
        "1 + ;",
        "}{",
        "try {",
        "#",
        "a[",
        "x = = 2;",
        "cursor = ;",
        "flags typeof bitmap {",
        "foreach in x {}",
    ] {
        let result = parse(source);
        assert!(result.is_err(), "expected failure for {source:?}");
        let errs = result.unwrap_err();
        // Every diagnostic points at a line that exists.
        let lines = source.lines().count().max(1) as u32;
        for err in errs {
            assert!(err.line >= 1 && err.line <= lines);
        }
    }
}

#[test]
fn screen_redeclaration_sets_replace() {
    let program = parse(
        r#"
        screen s = { "a": 1 };
        screen s = { "a": 2 };
        "#,
    )
    .unwrap();
    let replaces: Vec<bool> = program
        .statements
        .iter()
        .filter_map(|s| match s {
            ebs::syntax::Statement::ScreenDecl { replace, .. } => Some(*replace),
            _ => None,
        })
        .collect();
    assert_eq!(replaces, vec![false, true]);
}
