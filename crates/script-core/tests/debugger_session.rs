//! Integration coverage of the debugger's REPL-facing contract, driven
//! purely through the public `DebugSession` API (no forking involved).

use script_core::{DebugSession, SessionMode, Value};

#[test]
fn stepping_through_a_breakpoint_then_ending_the_session() {
    let mut session = DebugSession::new(64);
    session.start("set a 1\nset b 2\nreturn a\n", SessionMode::Sync);

    session.cmd_break("3");
    assert!(session.should_break(3));
    assert!(!session.should_break(1));

    session.cmd_print(Some(Value::Integer(1)));
    session.cmd_trace(&["native:dispatch".to_string(), "user_script:3".to_string()]);

    let logs = session.drain_logs();
    assert!(logs.iter().any(|l| l == "1"));
    assert!(logs.iter().any(|l| l == "user_script:3"));
    assert!(!logs.iter().any(|l| l.contains("native:dispatch")));

    let end_logs = session.end();
    assert_eq!(end_logs.last().unwrap(), "<endsession>");
    assert!(!session.is_active());
}

#[test]
fn breakpoint_capacity_is_enforced_across_the_whole_session() {
    let mut session = DebugSession::new(3);
    session.start("a\nb\nc\nd\ne\n", SessionMode::Sync);
    for line in 1..=4 {
        session.cmd_break(&line.to_string());
    }
    let logs = session.drain_logs();
    assert!(logs.iter().any(|l| l == "Too many breakpoints set."));
}

#[test]
fn maxlen_zero_then_nonzero_round_trips() {
    let mut session = DebugSession::new(64);
    session.start("x\n", SessionMode::Sync);
    session.cmd_maxlen(Some("0"));
    session.cmd_maxlen(Some("1024"));
    let logs = session.drain_logs();
    assert_eq!(
        logs,
        vec![
            "<value> replies are unlimited.".to_string(),
            "<value> replies are truncated at 1024 bytes.".to_string(),
        ]
    );
}
