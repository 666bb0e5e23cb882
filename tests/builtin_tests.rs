//! Builtin families exercised from scripts, plus the invocation protocol.

use std::rc::Rc;

use ebs::builtins::BuiltinRegistry;
use ebs::host::recording::RecordingHost;
use ebs::interp::exception::ErrorKind;
use ebs::{Interpreter, Program, Value};

fn printed(source: &str) -> Vec<String> {
    let builtins = BuiltinRegistry::standard();
    let program = Program::parse(source, &builtins).expect("parse");
    let host = Rc::new(RecordingHost::new());
    let mut interp = Interpreter::new(host.clone());
    interp.run(&program).expect("run");
    host.printed()
}

#[test]
fn string_family() {
    let out = printed(
        r#"
        print string.concat("ab", "cd");
        print string.length("héllo");
        print string.substring("abcdef", 1, 3);
        print string.substring("abcdef", 3);
        print string.upper("abc") + string.lower("DEF");
        print string.trim("  x  ");
        print string.replace("a-b-c", "-", "+");
        print string.indexOf("hello", "llo");
        print string.contains("hello", "ell");
        print string.startsWith("hello", "he");
        print string.endsWith("hello", "lo");
        "#,
    );
    assert_eq!(
        out,
        vec!["abcd", "5", "bc", "def", "ABCdef", "x", "a+b+c", "2", "true", "true", "true"]
    );
}

#[test]
fn split_and_join_round_trip() {
    let out = printed(
        r#"
        var parts = string.split("a,b,c", ",");
        print length(parts);
        print array.join(parts, "-");
        "#,
    );
    assert_eq!(out, vec!["3", "a-b-c"]);
}

#[test]
fn array_family() {
    let out = printed(
        r#"
        var a = [3, 1, 2];
        call array.sort(a);
        print array.join(a, ",");
        call array.push(a, 9);
        print length(a);
        print array.pop(a);
        print array.indexOf(a, 2);
        print array.contains(a, 7);
        print array.join(array.slice(a, 1, 3), ",");
        call array.reverse(a);
        print array.join(a, ",");
        "#,
    );
    assert_eq!(
        out,
        vec!["1,2,3", "4", "9", "1", "false", "2,3", "3,2,1"]
    );
}

#[test]
fn sort_is_idempotent_and_push_grows_by_one() {
    let out = printed(
        r#"
        var a = [5, 3, 4];
        var before: integer = 0;
        before = length(a);
        call array.push(a, 1);
        print length(a) == before + 1;
        call array.sort(a);
        var once: string = "";
        once = array.join(a, ",");
        call array.sort(a);
        print array.join(a, ",") == once;
        "#,
    );
    assert_eq!(out, vec!["true", "true"]);
}

#[test]
fn byte_packing_round_trip() {
    let out = printed(
        r#"
        var bits = array.asBitmap(10);
        print bits[1];
        print bits[2];
        print array.asByte(bits);
        "#,
    );
    assert_eq!(out, vec!["true", "false", "10"]);
}

#[test]
fn queue_family_is_fifo() {
    let out = printed(
        r#"
        var q = queue.integer;
        call queue.enqueue(q, 1);
        call queue.enqueue(q, 2);
        call queue.enqueue(q, 3);
        print queue.size(q);
        print queue.peek(q);
        print queue.dequeue(q);
        print queue.dequeue(q);
        print queue.size(q);
        call queue.clear(q);
        print queue.size(q);
        "#,
    );
    assert_eq!(out, vec!["3", "1", "1", "2", "1", "0"]);
}

#[test]
fn dequeue_from_empty_queue_raises() {
    let builtins = BuiltinRegistry::standard();
    let program = Program::parse(
        "var q = queue.integer; print queue.dequeue(q);",
        &builtins,
    )
    .expect("parse");
    let host = Rc::new(RecordingHost::new());
    let mut interp = Interpreter::new(host);
    assert_eq!(interp.run(&program).unwrap_err().kind, ErrorKind::Index);
}

#[test]
fn map_family() {
    let out = printed(
        r#"
        var m: map = { "b": 2, "a": 1 };
        print array.join(map.keys(m), ",");
        print array.join(map.values(m), ",");
        print map.contains(m, "a");
        print map.remove(m, "b");
        print map.contains(m, "b");
        "#,
    );
    assert_eq!(out, vec!["b,a", "2,1", "true", "2", "false"]);
}

#[test]
fn json_round_trip_preserves_structure_and_order() {
    let out = printed(
        r#"
        var j: json = { "z": 1, "a": [true, null, "s"], "n": 2.5 };
        var k = json.parse(json.stringify(j));
        print j == k;
        print json.stringify(k);
        "#,
    );
    assert_eq!(out[0], "true");
    assert_eq!(out[1], r#"{"z":1, "a":[true, null, "s"], "n":2.5}"#);
}

#[test]
fn date_family_uses_the_host_clock() {
    let out = printed(
        r#"
        var today = date.now();
        print today;
        print date.year(today);
        print date.month(today);
        print date.addDays(today, 30);
        print date.diffDays(date.addDays(today, 10), today);
        print date.format(date.parse("2024-03-01"), "%d/%m/%Y");
        "#,
    );
    // RecordingHost pins the clock to 2024-06-01.
    assert_eq!(
        out,
        vec!["2024-06-01", "2024", "6", "2024-07-01", "10", "01/03/2024"]
    );
}

#[test]
fn math_family() {
    let out = printed(
        r#"
        print math.abs(0 - 5);
        print math.min(3, 7);
        print math.max(3, 7);
        print math.floor(2.7);
        print math.ceil(2.1);
        print math.round(2.5);
        print math.sqrt(9.0);
        print math.pow(2.0, 10.0);
        "#,
    );
    assert_eq!(out, vec!["5", "3", "7", "2", "3", "3", "3", "1024"]);
}

#[test]
fn sys_family_and_forced_builtin_syntax() {
    let out = printed(
        r#"
        print sys.typeOf(1.5);
        print #string.upper("hash");
        "#,
    );
    assert_eq!(out, vec!["double", "HASH"]);
}

#[test]
fn dynamic_custom_family_is_positional_only() {
    let mut builtins = BuiltinRegistry::standard();
    builtins.register_dynamic("double", |_interp, args, _line| {
        let n = args.first().and_then(Value::as_i64).unwrap_or(0);
        Ok(Some(Value::Long(n * 2)))
    });
    let program = Program::parse("print custom.double(21);", &builtins).expect("parse");
    let host = Rc::new(RecordingHost::new());
    let mut interp = Interpreter::with_builtins(host.clone(), {
        let mut registry = BuiltinRegistry::standard();
        registry.register_dynamic("double", |_interp, args, _line| {
            let n = args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(Some(Value::Long(n * 2)))
        });
        registry
    });
    interp.run(&program).expect("run");
    assert_eq!(host.printed(), vec!["42"]);

    let err = Program::parse("print custom.double(n=21);", &builtins).unwrap_err();
    assert!(err[0].message.contains("positional parameters only"));
}

#[test]
fn builtin_invocation_protocol() {
    let host = Rc::new(RecordingHost::new());
    let mut interp = Interpreter::new(host);

    let result = interp
        .call_builtin("string.upper", vec![Value::Str("abc".into())])
        .expect("invoke");
    assert!(matches!(result, Some(Value::Str(s)) if s == "ABC"));

    let err = interp.call_builtin("no.such", vec![]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Name);

    let signature = interp.builtin_signature("string.substring").expect("known");
    assert_eq!(signature.len(), 3);
    assert_eq!(signature[0].name, "text");
    assert!(interp.builtin_signature("no.such").is_none());
}
