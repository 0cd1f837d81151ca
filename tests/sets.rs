mod test_utils;

use fakeredis::RespValue;
use test_utils::{array, bulk, int, sorted, TestEnv};

#[test]
fn test_membership() -> anyhow::Result<()> {
    let mut env = TestEnv::new();

    assert_eq!(env.exec(&["SADD", "set", "a", "b", "a"])?, int(2));
    assert_eq!(env.exec(&["SADD", "set", "b", "c"])?, int(1));

    let test_cases = vec![
        (vec!["SCARD", "set"], int(3)),
        (vec!["SCARD", "missing"], int(0)),
        (vec!["SISMEMBER", "set", "a"], int(1)),
        (vec!["SISMEMBER", "set", "z"], int(0)),
        (vec!["SISMEMBER", "missing", "a"], int(0)),
        (vec!["SREM", "set", "a", "z"], int(1)),
        (vec!["SMEMBERS", "missing"], array(&[])),
    ];
    for (command, expected) in test_cases {
        assert_eq!(env.exec(&command)?, expected, "executing {:?}", command);
    }
    assert_eq!(sorted(env.exec(&["SMEMBERS", "set"])?), vec!["b", "c"]);

    env.exec(&["SREM", "set", "b", "c"])?;
    assert_eq!(env.exec(&["EXISTS", "set"])?, int(0), "emptied sets are deleted");

    Ok(())
}

#[test]
fn test_algebra() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.exec(&["SADD", "first", "a", "b", "c", "d"])?;
    env.exec(&["SADD", "second", "c"])?;
    env.exec(&["SADD", "third", "a", "c", "e"])?;

    let test_cases = vec![
        (vec!["SDIFF", "first", "second", "third"], vec!["b", "d"]),
        (vec!["SINTER", "first", "second", "third"], vec!["c"]),
        (vec!["SINTER", "first", "missing"], vec![]),
        (vec!["SUNION", "first", "second", "third"], vec!["a", "b", "c", "d", "e"]),
        (vec!["SDIFF", "missing", "first"], vec![]),
    ];
    for (command, expected) in test_cases {
        assert_eq!(sorted(env.exec(&command)?), expected, "executing {:?}", command);
    }

    assert_eq!(env.exec(&["SDIFFSTORE", "out", "first", "third"])?, int(2));
    assert_eq!(sorted(env.exec(&["SMEMBERS", "out"])?), vec!["b", "d"]);
    assert_eq!(env.exec(&["SINTERSTORE", "out", "first", "third"])?, int(2));
    assert_eq!(sorted(env.exec(&["SMEMBERS", "out"])?), vec!["a", "c"]);
    assert_eq!(env.exec(&["SUNIONSTORE", "first", "first", "third"])?, int(5));
    assert_eq!(env.exec(&["SINTERSTORE", "out", "second", "missing"])?, int(0));
    assert_eq!(env.exec(&["EXISTS", "out"])?, int(0), "an empty result deletes the destination");

    env.exec_ok(&["SET", "string", "v"]);
    assert_eq!(
        env.exec_err(&["SUNION", "first", "string"]),
        "WRONGTYPE Operation against a key holding the wrong kind of value"
    );
    assert_eq!(env.exec(&["SUNIONSTORE", "string", "second"])?, int(1));
    assert_eq!(env.exec(&["TYPE", "string"])?, test_utils::simple("set"), "destinations are overwritten");

    Ok(())
}

#[test]
fn test_smove() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.exec(&["SADD", "source", "a", "b"])?;

    assert_eq!(env.exec(&["SMOVE", "source", "target", "a"])?, int(1));
    assert_eq!(env.exec(&["SMOVE", "source", "target", "z"])?, int(0));
    assert_eq!(env.exec(&["SMOVE", "missing", "target", "a"])?, int(0));
    assert_eq!(env.exec(&["SMOVE", "source", "target", "b"])?, int(1));
    assert_eq!(env.exec(&["EXISTS", "source"])?, int(0));
    assert_eq!(sorted(env.exec(&["SMEMBERS", "target"])?), vec!["a", "b"]);

    Ok(())
}

#[test]
fn test_random_members() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.exec(&["SADD", "set", "a", "b", "c"])?;

    let RespValue::BulkString(member) = env.exec(&["SRANDMEMBER", "set"])? else {
        panic!("SRANDMEMBER without a count returns one member");
    };
    assert!(["a", "b", "c"].contains(&std::str::from_utf8(&member)?));

    assert_eq!(sorted(env.exec(&["SRANDMEMBER", "set", "10"])?), vec!["a", "b", "c"]);
    assert_eq!(sorted(env.exec(&["SRANDMEMBER", "set", "-5"])?).len(), 5);
    assert_eq!(env.exec(&["SRANDMEMBER", "set", "0"])?, array(&[]));
    assert_eq!(env.exec(&["SRANDMEMBER", "missing"])?, RespValue::Null);
    assert_eq!(
        env.exec(&["SRANDMEMBER", "missing", "-9223372036854775807"])?,
        array(&[]),
        "a negative count against an empty set returns at once"
    );
    assert_eq!(env.exec(&["SCARD", "set"])?, int(3), "SRANDMEMBER does not remove");

    assert_eq!(sorted(env.exec(&["SPOP", "set", "2"])?).len(), 2);
    assert_eq!(env.exec(&["SCARD", "set"])?, int(1));
    let RespValue::BulkString(_) = env.exec(&["SPOP", "set"])? else {
        panic!("SPOP without a count returns one member");
    };
    assert_eq!(env.exec(&["EXISTS", "set"])?, int(0));
    assert_eq!(env.exec(&["SPOP", "set"])?, RespValue::Null);
    assert_eq!(env.exec_err(&["SPOP", "set", "-1"]), "ERR index out of range");

    Ok(())
}

#[test]
fn test_sscan() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.exec(&["SADD", "set", "c", "a", "b", "aa"])?;

    assert_eq!(
        env.exec(&["SSCAN", "set", "0"])?,
        RespValue::Array(vec![bulk("0"), array(&["a", "aa", "b", "c"])])
    );
    assert_eq!(
        env.exec(&["SSCAN", "set", "0", "MATCH", "a*", "COUNT", "3"])?,
        RespValue::Array(vec![bulk("3"), array(&["a", "aa"])])
    );

    Ok(())
}

#[test]
fn test_hyperloglog() -> anyhow::Result<()> {
    let mut env = TestEnv::new();

    assert_eq!(env.exec(&["PFADD", "first", "a", "b", "c"])?, int(1));
    assert_eq!(env.exec(&["PFADD", "first", "a"])?, int(0));
    assert_eq!(env.exec(&["PFADD", "first"])?, int(0));
    assert_eq!(env.exec(&["PFADD", "second", "c", "d"])?, int(1));
    assert_eq!(env.exec(&["PFCOUNT", "first"])?, int(3));
    assert_eq!(env.exec(&["PFCOUNT", "first", "second", "missing"])?, int(4));

    env.exec(&["PFADD", "merged", "z"])?;
    env.exec_ok(&["PFMERGE", "merged", "first", "second"]);
    assert_eq!(env.exec(&["PFCOUNT", "merged"])?, int(5));

    Ok(())
}
