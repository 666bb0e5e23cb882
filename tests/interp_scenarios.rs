//! End-to-end interpreter behavior over complete scripts.

use std::rc::Rc;

use ebs::builtins::BuiltinRegistry;
use ebs::host::recording::RecordingHost;
use ebs::interp::exception::ErrorKind;
use ebs::{Interpreter, Program};

fn run(source: &str) -> (Rc<RecordingHost>, Result<(), ebs::ScriptError>) {
    let builtins = BuiltinRegistry::standard();
    let program = Program::parse(source, &builtins).expect("script should parse");
    let host = Rc::new(RecordingHost::new());
    let mut interp = Interpreter::new(host.clone());
    let result = interp.run(&program);
    (host, result)
}

fn printed(source: &str) -> Vec<String> {
    let (host, result) = run(source);
    assert!(result.is_ok(), "script failed: {:?}", result.err());
    host.printed()
}

#[test]
fn chained_comparison_evaluates_middle_once() {
    let out = printed(
        r#"
        var i: integer = 5;
        var called: integer = 0;
        countOnce() return integer { called = called + 1; return 10; }
        if (1 < i < countOnce()) then print "ok";
        print called;
        "#,
    );
    assert_eq!(out, vec!["ok", "1"]);
}

#[test]
fn chained_comparison_short_circuits() {
    let out = printed(
        r#"
        var called: integer = 0;
        bump() return integer { called = called + 1; return 10; }
        if (3 < 2 < bump()) then print "unreachable"; else print "no";
        print called;
        "#,
    );
    // All operands evaluate once up front; the scan stops at the first
    // failing comparator.
    assert_eq!(out, vec!["no", "1"]);
}

#[test]
fn named_and_positional_parameters_with_defaults() {
    let out = printed(
        r#"
        greet(who: string, times: integer = 2) { print who; print times; }
        call greet("a", 5);
        call greet(who="b");
        "#,
    );
    assert_eq!(out, vec!["a", "5", "b", "2"]);
}

#[test]
fn mixing_positional_and_named_is_a_parse_error() {
    let builtins = BuiltinRegistry::standard();
    let err = Program::parse(
        r#"
        greet(who: string, times: integer = 2) { print who; }
        call greet("c", times=3);
        "#,
        &builtins,
    )
    .unwrap_err();
    assert!(err.iter().any(|d| d.kind == "PARSE_ERROR"
        && d.message.contains("mix positional and named")));
}

#[test]
fn bitmap_alias_cast_is_a_view_over_the_variable() {
    let out = printed(
        r#"
        flags typeof bitmap { ready:0, prio:1-3 };
        var raw: byte = 10;
        var v = flags(raw);
        print v.ready;
        print v.prio;
        v.prio = 7;
        print raw;
        "#,
    );
    assert_eq!(out, vec!["0", "5", "14"]);
}

#[test]
fn bit_field_write_out_of_range_is_a_type_error() {
    let (_, result) = run(
        r#"
        flags typeof bitmap { prio:1-3 };
        var raw: byte = 0;
        var v = flags(raw);
        v.prio = 8;
        "#,
    );
    assert_eq!(result.unwrap_err().kind, ErrorKind::Type);
}

#[test]
fn record_literals_with_unquoted_keys_nest() {
    let out = printed(
        r#"
        pos typeof record { x:int, y:int };
        piece typeof record { name:string, at:pos };
        var p = piece { name: "rook", at: pos { x:0, y:7 } };
        print p.at.y;
        print p.name;
        "#,
    );
    assert_eq!(out, vec!["7", "rook"]);
}

#[test]
fn record_fields_default_to_type_zero() {
    let out = printed(
        r#"
        pos typeof record { x:int, label:string };
        var p = pos { x: 3 };
        print p.label == "";
        print p.x;
        "#,
    );
    assert_eq!(out, vec!["true", "3"]);
}

#[test]
fn foreach_over_map_preserves_insertion_order() {
    let out = printed(
        r#"
        var m: map = { "a":1, "b":2, "c":3 };
        foreach k in m { print k; }
        "#,
    );
    assert_eq!(out, vec!["a", "b", "c"]);
}

#[test]
fn sorted_map_iterates_in_key_order() {
    let out = printed(
        r#"
        var m: sorted map = { "b":2, "a":1, "c":3 };
        foreach k in m { print k; }
        "#,
    );
    assert_eq!(out, vec!["a", "b", "c"]);
}

#[test]
fn reference_semantics_and_deep_copy() {
    let out = printed(
        r#"
        var a = [1, 2, 3];
        var b = a;
        b[0] = 9;
        print a[0];
        var c = sys.copy(a);
        c[0] = 5;
        print a[0];
        print c[0];
        "#,
    );
    assert_eq!(out, vec!["9", "9", "5"]);
}

#[test]
fn records_share_until_copied() {
    let out = printed(
        r#"
        pos typeof record { x:int, y:int };
        var p = pos { x: 1, y: 2 };
        moveRight(target: pos) { target.x = target.x + 1; }
        call moveRight(p);
        print p.x;
        "#,
    );
    assert_eq!(out, vec!["2"]);
}

#[test]
fn exception_matching_and_cleanup_order() {
    let out = printed(
        r#"
        try {
            raise exception TYPE_ERROR("bad type");
        } exceptions {
            when IO_ERROR(e) { print "io"; }
            when TYPE_ERROR(e) { print "type:"; print e.message; }
            when ANY_ERROR(e) { print "any"; }
        }
        "#,
    );
    assert_eq!(out, vec!["type:", "bad type"]);
}

#[test]
fn any_error_catches_standard_kinds_only() {
    let out = printed(
        r#"
        try {
            raise exception NUM_ERROR("overflow");
        } exceptions {
            when ANY_ERROR(e) { print e.name; }
        }
        "#,
    );
    assert_eq!(out, vec!["NUM_ERROR"]);

    let (_, result) = run(
        r#"
        try {
            raise exception BOOM("a", 2);
        } exceptions {
            when ANY_ERROR(e) { print "swallowed"; }
        }
        "#,
    );
    // A custom kind passes the ANY_ERROR handler untouched.
    assert!(matches!(result.unwrap_err().kind, ErrorKind::Custom(ref name) if name == "BOOM"));
}

#[test]
fn custom_exception_params_arrive_as_record_fields() {
    let out = printed(
        r#"
        try {
            raise exception BOOM("first", 42);
        } exceptions {
            when BOOM(e) { print e.name; print e.p1; print e.p2; }
        }
        "#,
    );
    assert_eq!(out, vec!["BOOM", "first", "42"]);
}

#[test]
fn nested_tries_match_innermost_first() {
    let out = printed(
        r#"
        try {
            try {
                raise exception IO_ERROR("inner");
            } exceptions {
                when IO_ERROR(e) { print "inner handler"; }
            }
            print "continues";
            raise exception IO_ERROR("outer");
        } exceptions {
            when IO_ERROR(e) { print "outer handler"; }
        }
        "#,
    );
    assert_eq!(out, vec!["inner handler", "continues", "outer handler"]);
}

#[test]
fn handlers_can_replace_the_exception() {
    let (host, result) = run(
        r#"
        try {
            raise exception IO_ERROR("first");
        } exceptions {
            when IO_ERROR(e) { raise exception DB_ERROR("second"); }
        }
        "#,
    );
    assert_eq!(result.unwrap_err().kind, ErrorKind::Db);
    assert!(host.printed().is_empty());
}

#[test]
fn unhandled_errors_report_kind_line_and_trace() {
    let (host, result) = run(
        r#"
        inner() { raise exception IO_ERROR("boom"); }
        outer() { call inner(); }
        call outer();
        "#,
    );
    assert!(result.is_err());
    let errors = host.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("IO_ERROR"));
    assert!(errors[0].contains("boom"));
    assert!(errors[0].contains("at inner("));
    assert!(errors[0].contains("at outer("));
}

#[test]
fn block_exceptions_clause_wraps_the_body() {
    let out = printed(
        r#"
        risky() { raise exception IO_ERROR("inside"); }
        exceptions {
            when IO_ERROR(e) { print "handled"; }
        }
        call risky();
        print "after";
        "#,
    );
    assert_eq!(out, vec!["handled", "after"]);
}

#[test]
fn integer_overflow_raises_num_error() {
    let (_, result) = run("print 2147483647 + 1;");
    assert_eq!(result.unwrap_err().kind, ErrorKind::Num);

    // Explicit widening avoids it.
    let out = printed("print long(2147483647) + 1;");
    assert_eq!(out, vec!["2147483648"]);
}

#[test]
fn division_by_zero_split_by_domain() {
    let (_, result) = run("print 1 / 0;");
    assert_eq!(result.unwrap_err().kind, ErrorKind::Num);

    let out = printed("print 1.0 / 0.0;");
    assert_eq!(out, vec!["inf"]);
}

#[test]
fn negative_index_raises_index_error() {
    let (_, result) = run("var a = [1, 2]; print a[0 - 1];");
    assert_eq!(result.unwrap_err().kind, ErrorKind::Index);
}

#[test]
fn foreach_over_empty_collection_is_a_noop() {
    let out = printed(
        r#"
        var a = [];
        foreach x in a { print x; }
        print "done";
        "#,
    );
    assert_eq!(out, vec!["done"]);
}

#[test]
fn loops_and_loop_control() {
    let out = printed(
        r#"
        var total: integer = 0;
        for (var i: integer = 0; i < 10; i++) {
            if (i == 3) then continue;
            if (i == 6) then break;
            total = total + i;
        }
        print total;
        var n: integer = 0;
        do { n++; } while (n < 3);
        print n;
        while (n < 5) { n++; }
        print n;
        "#,
    );
    // 0+1+2+4+5 = 12
    assert_eq!(out, vec!["12", "3", "5"]);
}

#[test]
fn truthiness_is_the_only_implicit_bool() {
    let out = printed(
        r#"
        if ("") then print "t1"; else print "f1";
        if ("x") then print "t2"; else print "f2";
        if (0) then print "t3"; else print "f3";
        if (0.0) then print "t4"; else print "f4";
        if (null) then print "t5"; else print "f5";
        if ([]) then print "t6"; else print "f6";
        pos typeof record { x:int };
        var p = pos { };
        if (p) then print "t7"; else print "f7";
        "#,
    );
    assert_eq!(out, vec!["f1", "t2", "f3", "f4", "f5", "f6", "t7"]);
}

#[test]
fn typeof_yields_type_names() {
    let out = printed(
        r#"
        print typeof 5;
        print typeof 5l;
        print typeof "x";
        print typeof typeof 0;
        print typeof [1];
        "#,
    );
    assert_eq!(out, vec!["integer", "long", "string", "string", "array"]);
}

#[test]
fn casts_truncate_and_parse() {
    let out = printed(
        r#"
        print integer(3.9);
        print double(integer(3.9));
        print long("42");
        print bool(2);
        print string(7) + "!";
        "#,
    );
    assert_eq!(out, vec!["3", "3", "42", "true", "7!"]);
}

#[test]
fn exponent_follows_the_promotion_rule() {
    let out = printed(
        r#"
        print 2 ^ 10;
        print typeof (2 ^ 10);
        print 2 ^ -1;
        print 4 ^ 0.5;
        "#,
    );
    assert_eq!(out, vec!["1024", "integer", "0.5", "2"]);
}

#[test]
fn multi_dimensional_arrays_are_row_major() {
    let out = printed(
        r#"
        var grid: array.integer[2, 3];
        grid[1, 2] = 42;
        grid[0, 0] = 7;
        print grid[1, 2];
        print grid[0, 0];
        print length(grid);
        "#,
    );
    assert_eq!(out, vec!["42", "7", "6"]);
}

#[test]
fn dates_lex_inside_quotes_and_compare() {
    let out = printed(
        r#"
        var d: date = '2024-03-01';
        var later: date = '2024-03-02 10:30';
        print d < later;
        print d;
        print later;
        "#,
    );
    assert_eq!(out, vec!["true", "2024-03-01", "2024-03-02 10:30:00"]);
}

#[test]
fn string_date_coercion_goes_through_iso() {
    let out = printed(
        r#"
        var d: date = "2024-12-25";
        var s: string = "";
        s = string(d);
        print s;
        "#,
    );
    assert_eq!(out, vec!["2024-12-25"]);
}

#[test]
fn json_literals_and_nested_writes() {
    let out = printed(
        r#"
        var j: json = { "a": 1, "b": { "c": [1, 2, 3] } };
        print j.a;
        print j.b.c[1];
        j.b.d = "new";
        print j.b.d;
        "#,
    );
    assert_eq!(out, vec!["1", "2", "new"]);
}

#[test]
fn screen_variables_route_through_the_host() {
    let source = r#"
        screen login = { "Title": "Sign in", "Fields": ["user"] };
        login.user = "ada";
        print login.user;
        show screen login;
    "#;
    let builtins = BuiltinRegistry::standard();
    let program = Program::parse(source, &builtins).expect("parse");
    let host = Rc::new(RecordingHost::new());
    let mut interp = Interpreter::new(host.clone());
    interp.run(&program).expect("run");
    assert!(host.screen_defined("login"));
    assert_eq!(host.printed(), vec!["ada"]);
    assert!(host
        .screen_var("login", "user")
        .map(|v| v.equals(&ebs::Value::Str("ada".into())))
        .unwrap_or(false));
}

#[test]
fn cancellation_unwinds_as_cancelled() {
    let source = r#"
        var i: integer = 0;
        while (true) { i++; }
    "#;
    let builtins = BuiltinRegistry::standard();
    let program = Program::parse(source, &builtins).expect("parse");
    let host = Rc::new(RecordingHost::new());
    host.cancel();
    let mut interp = Interpreter::new(host.clone());
    let err = interp.run(&program).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
}

#[test]
fn cancelled_is_catchable_like_any_standard_kind() {
    let source = r#"
        try {
            while (true) { print "spin"; }
        } exceptions {
            when ANY_ERROR(e) { print e.name; }
        }
    "#;
    let builtins = BuiltinRegistry::standard();
    let program = Program::parse(source, &builtins).expect("parse");
    let host = Rc::new(RecordingHost::new());
    host.cancel_after(2);
    let mut interp = Interpreter::new(host.clone());
    interp.run(&program).expect("handled");
    assert_eq!(host.printed(), vec!["spin", "spin", "CANCELLED"]);
}

#[test]
fn compound_assignment_and_increment() {
    let out = printed(
        r#"
        var x: integer = 10;
        x += 5;
        x -= 3;
        x *= 2;
        x /= 4;
        x++;
        print x;
        "#,
    );
    assert_eq!(out, vec!["7"]);
}

#[test]
fn string_concatenation_stringifies_either_side() {
    let out = printed(
        r#"
        print "n=" + 5;
        print 5 + "=n";
        print "a" + "b";
        "#,
    );
    assert_eq!(out, vec!["n=5", "5=n", "ab"]);
}

#[test]
fn const_assignment_fails() {
    let (_, result) = run("const k: integer = 1; k = 2;");
    assert_eq!(result.unwrap_err().kind, ErrorKind::Type);
}

#[test]
fn undefined_variable_is_a_name_error() {
    let (_, result) = run("print nothing;");
    assert_eq!(result.unwrap_err().kind, ErrorKind::Name);
}
