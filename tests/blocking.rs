mod test_utils;

use std::thread;
use std::time::{Duration, Instant};

use fakeredis::{ConnectionError, RespValue};
use test_utils::{array, bulk, int, run, TestEnv};

#[test]
fn test_blpop_returns_available_data_immediately() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.exec(&["RPUSH", "second", "a", "b"])?;

    assert_eq!(env.exec(&["BLPOP", "first", "second", "0"])?, array(&["second", "a"]));
    assert_eq!(env.exec(&["BRPOP", "first", "second", "0"])?, array(&["second", "b"]));
    assert_eq!(env.exec(&["EXISTS", "second"])?, int(0));

    Ok(())
}

#[test]
fn test_blpop_times_out() -> anyhow::Result<()> {
    let mut env = TestEnv::new();

    let started = Instant::now();
    assert_eq!(env.exec(&["BLPOP", "list", "1"])?, RespValue::Null);
    assert!(started.elapsed() >= Duration::from_millis(900), "returned after {:?}", started.elapsed());

    Ok(())
}

#[test]
fn test_blpop_wakes_up_on_push() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let mut waiter = env.connect();
    let mut pusher = env.connect();

    let handle = thread::spawn(move || run(&mut waiter, &["BLPOP", "list", "0"]));

    thread::sleep(Duration::from_millis(50));
    assert_eq!(run(&mut pusher, &["RPUSH", "list", "value"]), int(1));

    let reply = handle.join().expect("waiter thread panicked");
    assert_eq!(reply, array(&["list", "value"]));
    assert_eq!(run(&mut pusher, &["LLEN", "list"]), int(0));

    Ok(())
}

#[test]
fn test_blocked_clients_are_served_one_element_each() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let mut pusher = env.connect();

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let mut waiter = env.connect();
            thread::spawn(move || run(&mut waiter, &["BRPOP", "list", "5"]))
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    run(&mut pusher, &["RPUSH", "list", "a", "b", "c"]);

    let mut popped: Vec<RespValue> = handles
        .into_iter()
        .map(|handle| handle.join().expect("waiter thread panicked"))
        .collect();
    popped.sort_by_key(|reply| format!("{:?}", reply));
    assert_eq!(
        popped,
        vec![array(&["list", "a"]), array(&["list", "b"]), array(&["list", "c"])]
    );

    Ok(())
}

#[test]
fn test_brpoplpush() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    let mut waiter = env.connect();

    env.exec(&["RPUSH", "source", "a", "b"])?;
    assert_eq!(env.exec(&["BRPOPLPUSH", "source", "target", "0"])?, bulk("b"));

    let handle = thread::spawn(move || run(&mut waiter, &["BRPOPLPUSH", "empty", "target", "0"]));
    thread::sleep(Duration::from_millis(50));
    env.exec(&["LPUSH", "empty", "x"])?;

    assert_eq!(handle.join().expect("waiter thread panicked"), bulk("x"));
    assert_eq!(env.exec(&["LRANGE", "target", "0", "-1"])?, array(&["x", "b"]));
    assert_eq!(env.exec(&["BRPOPLPUSH", "missing", "target", "1"])?, RespValue::Null);

    Ok(())
}

#[test]
fn test_blocking_errors() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.exec_ok(&["SET", "string", "v"]);

    let test_cases = vec![
        (vec!["BLPOP", "list", "-1"], "ERR timeout is negative"),
        (vec!["BLPOP", "list", "soon"], "ERR timeout is negative"),
        (vec!["BRPOPLPUSH", "a", "b", "-1"], "ERR timeout is negative"),
        (
            vec!["BLPOP", "string", "0"],
            "WRONGTYPE Operation against a key holding the wrong kind of value",
        ),
        (vec!["BLPOP", "list"], "ERR wrong number of arguments for 'blpop' command"),
    ];

    for (command, expected) in test_cases {
        assert_eq!(env.exec_err(&command), expected, "executing {:?}", command);
    }

    Ok(())
}

#[test]
fn test_blpop_inside_transaction_does_not_block() -> anyhow::Result<()> {
    let mut env = TestEnv::new();

    env.exec_ok(&["MULTI"]);
    assert_eq!(env.exec(&["BLPOP", "list", "0"])?, test_utils::simple("QUEUED"));
    assert_eq!(env.exec(&["EXEC"])?, RespValue::Array(vec![RespValue::Null]));

    Ok(())
}

#[tokio::test]
async fn test_async_blpop_wakes_up_on_push() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let mut waiter = env.connect();
    let mut pusher = env.connect();

    let handle = tokio::spawn(async move { waiter.execute_async(["BLPOP", "list", "0"]).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pusher.execute_async(["LPUSH", "list", "value"]).await?, int(1));

    let reply = tokio::time::timeout(Duration::from_secs(5), handle).await???;
    assert_eq!(reply, array(&["list", "value"]));

    Ok(())
}

#[tokio::test]
async fn test_async_blpop_times_out() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let mut waiter = env.connect();

    let reply = waiter.execute_async(["BRPOP", "list", "1"]).await?;
    assert_eq!(reply, RespValue::Null);

    Ok(())
}

#[tokio::test]
async fn test_async_blpop_is_cancelled_by_close() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let mut waiter = env.connect();
    let close = waiter.close_handle();

    let handle = tokio::spawn(async move {
        let result = waiter.execute_async(["BLPOP", "list", "0"]).await;
        (result, waiter)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    close.close();

    let (result, mut waiter) = tokio::time::timeout(Duration::from_secs(5), handle).await??;
    assert_eq!(result, Err(ConnectionError::Cancelled));
    assert_eq!(waiter.execute(["PING"]), Err(ConnectionError::Closed));

    let mut other = env.connect();
    assert_eq!(run(&mut other, &["RPUSH", "list", "a"]), int(1));
    assert_eq!(run(&mut other, &["LLEN", "list"]), int(1), "a cancelled waiter pops nothing");

    Ok(())
}
