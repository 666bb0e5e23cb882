//! Cursor and connection behavior against the in-memory connection.

use std::rc::Rc;

use ebs::builtins::BuiltinRegistry;
use ebs::host::recording::RecordingHost;
use ebs::interp::exception::ErrorKind;
use ebs::sql::memory::MemoryConnection;
use ebs::{Interpreter, Program, Value};

fn host_with_users() -> Rc<RecordingHost> {
    let host = Rc::new(RecordingHost::new());
    host.register_connection(
        "db",
        Box::new(MemoryConnection::new().with_table(
            "users",
            &["id", "name"],
            vec![
                vec![Value::Int(1), Value::Str("ada".into())],
                vec![Value::Int(2), Value::Str("grace".into())],
                vec![Value::Int(3), Value::Str("alan".into())],
            ],
        )),
    );
    host
}

fn run_with_users(source: &str) -> (Rc<RecordingHost>, Result<(), ebs::ScriptError>) {
    let builtins = BuiltinRegistry::standard();
    let program = Program::parse(source, &builtins).expect("parse");
    let host = host_with_users();
    let mut interp = Interpreter::new(host.clone());
    let result = interp.run(&program);
    (host, result)
}

#[test]
fn cursor_iterates_rows_as_records() {
    let (host, result) = run_with_users(
        r#"
        connect db = { "kind": "memory" };
        cursor cur = select id, name from users;
        open cur;
        while (cur.hasNext()) {
            var row = cur.next();
            print row.name;
        }
        close cur;
        "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
    assert_eq!(host.printed(), vec!["ada", "grace", "alan"]);
}

#[test]
fn cursor_parameters_bind_named_markers() {
    let (host, result) = run_with_users(
        r#"
        connect db = { "kind": "memory" };
        cursor cur = select name from users where id = :id;
        open cur(id=2);
        while (cur.hasNext()) { print cur.next().name; }
        close cur;
        open cur(3);
        while (cur.hasNext()) { print cur.next().name; }
        close cur;
        "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
    assert_eq!(host.printed(), vec!["grace", "alan"]);
}

#[test]
fn reopening_an_open_cursor_is_a_db_error() {
    let (_, result) = run_with_users(
        r#"
        connect db = { "kind": "memory" };
        cursor cur = select * from users;
        open cur;
        open cur;
        "#,
    );
    assert_eq!(result.unwrap_err().kind, ErrorKind::Db);
}

#[test]
fn opening_without_a_connection_is_a_db_error() {
    let builtins = BuiltinRegistry::standard();
    let program = Program::parse(
        r#"
        cursor cur = select * from users;
        open cur;
        "#,
        &builtins,
    )
    .expect("parse");
    let host = Rc::new(RecordingHost::new());
    let mut interp = Interpreter::new(host);
    let err = interp.run(&program).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Db);
    assert!(err.message.contains("no active connection"));
}

#[test]
fn exception_inside_try_closes_the_cursor_before_the_handler() {
    let (host, result) = run_with_users(
        r#"
        connect db = { "kind": "memory" };
        cursor cur = select * from users;
        try {
            open cur;
            raise exception IO_ERROR("boom");
        } exceptions {
            when IO_ERROR(e) { print "caught:"; print e.message; print sys.isOpen(cur); }
        }
        print sys.isOpen(cur);
        "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
    assert_eq!(host.printed(), vec!["caught:", "boom", "false", "false"]);
}

#[test]
fn use_block_closes_cursors_on_every_exit_path() {
    let (host, result) = run_with_users(
        r#"
        connect db = { "kind": "memory" };
        cursor cur = select * from users;
        probe() {
            use db {
                open cur;
                return;
            }
        }
        call probe();
        print sys.isOpen(cur);
        "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
    assert_eq!(host.printed(), vec!["false"]);
}

#[test]
fn select_expression_materializes_an_array() {
    let (host, result) = run_with_users(
        r#"
        connect db = { "kind": "memory" };
        var rows = select name from users;
        print length(rows);
        print rows[0].name;
        "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
    assert_eq!(host.printed(), vec!["3", "ada"]);
}

#[test]
fn close_of_closed_resources_warns_but_continues() {
    let (host, result) = run_with_users(
        r#"
        connect db = { "kind": "memory" };
        cursor cur = select * from users;
        close cur;
        close db;
        close db;
        print "still here";
        "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
    assert_eq!(host.printed(), vec!["still here"]);
    // The second `close db` lands on an already-closed connection.
    assert!(!host.output.borrow().is_empty());
}

#[test]
fn db_errors_carry_the_driver_message() {
    let (_, result) = run_with_users(
        r#"
        connect db = { "kind": "memory" };
        cursor cur = select * from missing_table;
        open cur;
        "#,
    );
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Db);
    assert!(err.message.contains("missing_table"));
}
