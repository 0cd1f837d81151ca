mod test_utils;

use fakeredis::RespValue;
use test_utils::{bulk, error, int, run, simple, TestEnv};

#[test]
fn test_multi_exec() -> anyhow::Result<()> {
    let mut env = TestEnv::new();

    let test_cases = vec![
        (vec!["MULTI"], RespValue::ok()),
        (vec!["SET", "key", "1"], simple("QUEUED")),
        (vec!["INCR", "key"], simple("QUEUED")),
        (vec!["LPUSH", "key", "x"], simple("QUEUED")),
        (vec!["GET", "key"], simple("QUEUED")),
        (
            vec!["EXEC"],
            RespValue::Array(vec![
                RespValue::ok(),
                int(2),
                error("WRONGTYPE Operation against a key holding the wrong kind of value"),
                bulk("2"),
            ]),
        ),
        (vec!["EXEC"], error("ERR EXEC without MULTI")),
        (vec!["DISCARD"], error("ERR DISCARD without MULTI")),
    ];

    for (command, expected) in test_cases {
        assert_eq!(env.exec(&command)?, expected, "executing {:?}", command);
    }

    Ok(())
}

#[test]
fn test_empty_transaction() -> anyhow::Result<()> {
    let mut env = TestEnv::new();

    env.exec_ok(&["MULTI"]);
    assert_eq!(env.exec(&["EXEC"])?, RespValue::Array(vec![]));

    Ok(())
}

#[test]
fn test_discard() -> anyhow::Result<()> {
    let mut env = TestEnv::new();

    env.exec_ok(&["MULTI"]);
    env.exec(&["SET", "key", "v"])?;
    env.exec_ok(&["DISCARD"]);
    assert_eq!(env.exec(&["GET", "key"])?, RespValue::Null);
    assert_eq!(env.exec_err(&["EXEC"]), "ERR EXEC without MULTI");

    Ok(())
}

#[test]
fn test_nested_multi() -> anyhow::Result<()> {
    let mut env = TestEnv::new();

    env.exec_ok(&["MULTI"]);
    assert_eq!(env.exec_err(&["MULTI"]), "ERR MULTI calls can not be nested");
    env.exec(&["SET", "key", "v"])?;
    assert_eq!(env.exec(&["EXEC"])?, RespValue::Array(vec![RespValue::ok()]));

    Ok(())
}

#[test]
fn test_queuing_errors_abort_the_transaction() -> anyhow::Result<()> {
    let mut env = TestEnv::new();

    env.exec_ok(&["MULTI"]);
    env.exec(&["SET", "key", "v"])?;
    assert_eq!(env.exec_err(&["NOSUCHCOMMAND"]), "ERR unknown command 'NOSUCHCOMMAND'");
    assert_eq!(env.exec_err(&["GET"]), "ERR wrong number of arguments for 'get' command");
    assert_eq!(
        env.exec_err(&["EXEC"]),
        "EXECABORT Transaction discarded because of previous errors."
    );
    assert_eq!(env.exec(&["GET", "key"])?, RespValue::Null);

    env.exec_ok(&["MULTI"]);
    assert_eq!(
        env.exec_err(&["EXEC", "extra"]),
        "EXECABORT Transaction discarded because of: wrong number of arguments for 'exec' command"
    );
    assert_eq!(env.exec_err(&["EXEC"]), "ERR EXEC without MULTI");

    Ok(())
}

#[test]
fn test_watch() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    let mut other = env.connect();
    env.exec_ok(&["SET", "balance", "10"]);

    env.exec_ok(&["WATCH", "balance"]);
    env.exec_ok(&["MULTI"]);
    env.exec(&["INCRBY", "balance", "5"])?;
    assert_eq!(env.exec(&["EXEC"])?, RespValue::Array(vec![int(15)]), "untouched watch");

    env.exec_ok(&["WATCH", "balance"]);
    assert_eq!(run(&mut other, &["SET", "balance", "100"]), RespValue::ok());
    env.exec_ok(&["MULTI"]);
    env.exec(&["INCRBY", "balance", "5"])?;
    assert_eq!(env.exec(&["EXEC"])?, RespValue::Null, "the watched key changed");
    assert_eq!(env.exec(&["GET", "balance"])?, bulk("100"));

    env.exec_ok(&["MULTI"]);
    env.exec(&["INCRBY", "balance", "5"])?;
    assert_eq!(
        env.exec(&["EXEC"])?,
        RespValue::Array(vec![int(105)]),
        "EXEC clears the watches"
    );

    Ok(())
}

#[test]
fn test_watch_sees_deletes_and_expiry_changes() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    let mut other = env.connect();

    let changes = vec![
        vec!["DEL", "key"],
        vec!["EXPIRE", "key", "100"],
        vec!["RENAME", "key", "elsewhere"],
        vec!["FLUSHDB"],
        vec!["FLUSHALL"],
    ];

    for change in changes {
        env.exec_ok(&["SET", "key", "v"]);
        env.exec_ok(&["WATCH", "key"]);
        run(&mut other, &change);
        env.exec_ok(&["MULTI"]);
        env.exec(&["GET", "key"])?;
        assert_eq!(env.exec(&["EXEC"])?, RespValue::Null, "after {:?}", change);
    }

    Ok(())
}

#[test]
fn test_unwatch_and_reads() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    let mut other = env.connect();
    env.exec_ok(&["SET", "key", "v"]);

    env.exec_ok(&["WATCH", "key"]);
    run(&mut other, &["GET", "key"]);
    run(&mut other, &["SET", "unrelated", "v"]);
    env.exec_ok(&["MULTI"]);
    env.exec(&["GET", "key"])?;
    assert_eq!(
        env.exec(&["EXEC"])?,
        RespValue::Array(vec![bulk("v")]),
        "reads and other keys do not invalidate"
    );

    env.exec_ok(&["WATCH", "key"]);
    env.exec_ok(&["UNWATCH"]);
    run(&mut other, &["SET", "key", "changed"]);
    env.exec_ok(&["MULTI"]);
    env.exec(&["GET", "key"])?;
    assert_eq!(env.exec(&["EXEC"])?, RespValue::Array(vec![bulk("changed")]));

    env.exec_ok(&["MULTI"]);
    assert_eq!(env.exec_err(&["WATCH", "key"]), "ERR WATCH inside MULTI is not allowed");
    env.exec_ok(&["DISCARD"]);

    Ok(())
}

#[test]
fn test_watch_is_per_database() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    let mut other = env.connect();

    env.exec_ok(&["WATCH", "key"]);
    run(&mut other, &["SELECT", "1"]);
    run(&mut other, &["SET", "key", "v"]);
    env.exec_ok(&["MULTI"]);
    env.exec(&["PING"])?;
    assert_eq!(env.exec(&["EXEC"])?, RespValue::Array(vec![simple("PONG")]));

    Ok(())
}
