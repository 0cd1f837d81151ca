//! The command table: name, argument signature and handler for every
//! supported command.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::commands::{
    command_dispatcher::{CommandContext, CommandResult},
    command_error::CommandError,
    connection, hashes, hyperloglog, keys, lists, pub_sub, scripting, server_admin, sets,
    signature::{
        key, key_or, Arg, ArgType, IntKind, MissingReply, Signature, BYTES, FLOAT, INT, KEY,
        LEX, SCORE,
    },
    sorted_sets, strings, transactions,
};
use crate::key_value_store::ValueKind::{Hash, List, Set, String as Str, ZSet};

pub type Handler = fn(&mut CommandContext<'_>, &[Arg]) -> Result<CommandResult, CommandError>;

pub struct CommandSpec {
    pub signature: Signature,
    /// Refused when called from a script.
    pub no_script: bool,
    pub handler: Handler,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("signature", &self.signature)
            .field("no_script", &self.no_script)
            .finish()
    }
}

const DB_INDEX: ArgType = ArgType::Int(IntKind::DbIndex);
const TIMEOUT: ArgType = ArgType::Int(IntKind::Timeout);
const BIT_OFFSET: ArgType = ArgType::Int(IntKind::BitOffset);
const BIT_VALUE: ArgType = ArgType::Int(IntKind::BitValue);

const STRING: ArgType = key(Str);
const LIST: ArgType = key(List);
const SET: ArgType = key(Set);
const HASH: ArgType = key(Hash);
const ZSET: ArgType = key(ZSet);

macro_rules! command {
    ($name:literal, [$($fixed:expr),*], [$($repeat:expr),*], $handler:path) => {
        command!($name, [$($fixed),*], [$($repeat),*], $handler, false)
    };
    ($name:literal, [$($fixed:expr),*], [$($repeat:expr),*], $handler:path, no_script) => {
        command!($name, [$($fixed),*], [$($repeat),*], $handler, true)
    };
    ($name:literal, [$($fixed:expr),*], [$($repeat:expr),*], $handler:path, $no_script:expr) => {
        CommandSpec {
            signature: Signature {
                name: $name,
                fixed: &[$($fixed),*],
                repeat: &[$($repeat),*],
            },
            no_script: $no_script,
            handler: $handler,
        }
    };
}

static COMMANDS: &[CommandSpec] = &[
    // connection
    command!("echo", [BYTES], [], connection::echo),
    command!("ping", [], [BYTES], connection::ping),
    command!("select", [DB_INDEX], [], connection::select),
    command!("swapdb", [DB_INDEX, DB_INDEX], [], connection::swapdb),
    // keys
    command!("del", [KEY], [KEY], keys::del),
    command!("unlink", [KEY], [KEY], keys::del),
    command!("exists", [KEY], [KEY], keys::exists),
    command!("expire", [KEY, INT], [], keys::expire),
    command!("expireat", [KEY, INT], [], keys::expireat),
    command!("pexpire", [KEY, INT], [], keys::pexpire),
    command!("pexpireat", [KEY, INT], [], keys::pexpireat),
    command!("ttl", [KEY], [], keys::ttl),
    command!("pttl", [KEY], [], keys::pttl),
    command!("type", [KEY], [], keys::key_type),
    command!("persist", [KEY], [], keys::persist),
    command!("keys", [BYTES], [], keys::keys),
    command!("move", [KEY, DB_INDEX], [], keys::move_key),
    command!("randomkey", [], [], keys::randomkey),
    command!("rename", [KEY, KEY], [], keys::rename),
    command!("renamenx", [KEY, KEY], [], keys::renamenx),
    command!("scan", [INT], [BYTES, BYTES], keys::scan),
    command!("sort", [KEY], [BYTES], keys::sort),
    // transactions
    command!("multi", [], [], transactions::multi, no_script),
    command!("discard", [], [], transactions::discard, no_script),
    command!("exec", [], [], transactions::exec, no_script),
    command!("watch", [KEY], [KEY], transactions::watch, no_script),
    command!("unwatch", [], [], transactions::unwatch, no_script),
    // strings
    command!("append", [STRING, BYTES], [], strings::append),
    command!("bitcount", [key_or(Str, MissingReply::Zero)], [BYTES], strings::bitcount),
    command!("decrby", [STRING, INT], [], strings::decrby),
    command!("decr", [STRING], [], strings::decr),
    command!("incrby", [STRING, INT], [], strings::incrby),
    command!("incr", [STRING], [], strings::incr),
    command!("incrbyfloat", [STRING, BYTES], [], strings::incrbyfloat),
    command!("get", [STRING], [], strings::get),
    command!("getbit", [STRING, BIT_OFFSET], [], strings::getbit),
    command!("setbit", [STRING, BIT_OFFSET, BIT_VALUE], [], strings::setbit),
    command!("getrange", [STRING, INT, INT], [], strings::getrange),
    command!("substr", [STRING, INT, INT], [], strings::getrange),
    command!("getset", [STRING, BYTES], [], strings::getset),
    command!("mget", [KEY], [KEY], strings::mget),
    command!("mset", [KEY, BYTES], [KEY, BYTES], strings::mset),
    command!("msetnx", [KEY, BYTES], [KEY, BYTES], strings::msetnx),
    command!("set", [KEY, BYTES], [BYTES], strings::set),
    command!("setex", [KEY, INT, BYTES], [], strings::setex),
    command!("psetex", [KEY, INT, BYTES], [], strings::psetex),
    command!("setnx", [KEY, BYTES], [], strings::setnx),
    command!("setrange", [STRING, INT, BYTES], [], strings::setrange),
    command!("strlen", [STRING], [], strings::strlen),
    // hashes
    command!("hdel", [HASH, BYTES], [BYTES], hashes::hdel),
    command!("hexists", [HASH, BYTES], [], hashes::hexists),
    command!("hget", [HASH, BYTES], [], hashes::hget),
    command!("hgetall", [HASH], [], hashes::hgetall),
    command!("hincrby", [HASH, BYTES, INT], [], hashes::hincrby),
    command!("hincrbyfloat", [HASH, BYTES, BYTES], [], hashes::hincrbyfloat),
    command!("hkeys", [HASH], [], hashes::hkeys),
    command!("hlen", [HASH], [], hashes::hlen),
    command!("hmget", [HASH, BYTES], [BYTES], hashes::hmget),
    command!("hmset", [HASH, BYTES, BYTES], [BYTES, BYTES], hashes::hmset),
    command!("hscan", [HASH, INT], [BYTES, BYTES], hashes::hscan),
    command!("hset", [HASH, BYTES, BYTES], [BYTES, BYTES], hashes::hset),
    command!("hsetnx", [HASH, BYTES, BYTES], [], hashes::hsetnx),
    command!("hstrlen", [HASH, BYTES], [], hashes::hstrlen),
    command!("hvals", [HASH], [], hashes::hvals),
    // lists
    command!("blpop", [BYTES, BYTES], [BYTES], lists::blpop, no_script),
    command!("brpop", [BYTES, BYTES], [BYTES], lists::brpop, no_script),
    command!("brpoplpush", [BYTES, BYTES, TIMEOUT], [], lists::brpoplpush, no_script),
    command!("lindex", [key_or(List, MissingReply::Nil), INT], [], lists::lindex),
    command!("linsert", [LIST, BYTES, BYTES, BYTES], [], lists::linsert),
    command!("llen", [LIST], [], lists::llen),
    command!("lpop", [KEY], [INT], lists::lpop),
    command!("lpush", [LIST, BYTES], [BYTES], lists::lpush),
    command!("lpushx", [LIST, BYTES], [BYTES], lists::lpushx),
    command!("lrange", [LIST, INT, INT], [], lists::lrange),
    command!("lrem", [LIST, INT, BYTES], [], lists::lrem),
    command!("lset", [LIST, INT, BYTES], [], lists::lset),
    command!("ltrim", [LIST, INT, INT], [], lists::ltrim),
    command!("rpop", [KEY], [INT], lists::rpop),
    command!("rpoplpush", [key_or(List, MissingReply::Nil), LIST], [], lists::rpoplpush),
    command!("rpush", [LIST, BYTES], [BYTES], lists::rpush),
    command!("rpushx", [LIST, BYTES], [BYTES], lists::rpushx),
    // sets
    command!("sadd", [SET, BYTES], [BYTES], sets::sadd),
    command!("scard", [SET], [], sets::scard),
    command!("sdiff", [SET], [SET], sets::sdiff),
    command!("sdiffstore", [KEY, SET], [SET], sets::sdiffstore),
    command!("sinter", [SET], [SET], sets::sinter),
    command!("sinterstore", [KEY, SET], [SET], sets::sinterstore),
    command!("sismember", [SET, BYTES], [], sets::sismember),
    command!("smembers", [SET], [], sets::smembers),
    command!("smove", [key_or(Set, MissingReply::Zero), SET, BYTES], [], sets::smove),
    command!("spop", [SET], [INT], sets::spop),
    command!("srandmember", [SET], [INT], sets::srandmember),
    command!("srem", [SET, BYTES], [BYTES], sets::srem),
    command!("sscan", [SET, INT], [BYTES, BYTES], sets::sscan),
    command!("sunion", [SET], [SET], sets::sunion),
    command!("sunionstore", [KEY, SET], [SET], sets::sunionstore),
    // hyperloglog
    command!("pfadd", [SET], [BYTES], hyperloglog::pfadd),
    command!("pfcount", [SET], [SET], hyperloglog::pfcount),
    command!("pfmerge", [SET, SET], [SET], hyperloglog::pfmerge),
    // sorted sets
    command!("zadd", [ZSET, BYTES, BYTES], [BYTES], sorted_sets::zadd),
    command!("zcard", [ZSET], [], sorted_sets::zcard),
    command!("zcount", [ZSET, SCORE, SCORE], [], sorted_sets::zcount),
    command!("zincrby", [ZSET, FLOAT, BYTES], [], sorted_sets::zincrby),
    command!("zlexcount", [ZSET, LEX, LEX], [], sorted_sets::zlexcount),
    command!("zrange", [ZSET, INT, INT], [BYTES], sorted_sets::zrange),
    command!("zrevrange", [ZSET, INT, INT], [BYTES], sorted_sets::zrevrange),
    command!("zrangebylex", [ZSET, LEX, LEX], [BYTES], sorted_sets::zrangebylex),
    command!("zrevrangebylex", [ZSET, LEX, LEX], [BYTES], sorted_sets::zrevrangebylex),
    command!("zrangebyscore", [ZSET, SCORE, SCORE], [BYTES], sorted_sets::zrangebyscore),
    command!("zrevrangebyscore", [ZSET, SCORE, SCORE], [BYTES], sorted_sets::zrevrangebyscore),
    command!("zrank", [ZSET, BYTES], [], sorted_sets::zrank),
    command!("zrevrank", [ZSET, BYTES], [], sorted_sets::zrevrank),
    command!("zrem", [ZSET, BYTES], [BYTES], sorted_sets::zrem),
    command!("zremrangebylex", [ZSET, LEX, LEX], [], sorted_sets::zremrangebylex),
    command!("zremrangebyscore", [ZSET, SCORE, SCORE], [], sorted_sets::zremrangebyscore),
    command!("zremrangebyrank", [ZSET, INT, INT], [], sorted_sets::zremrangebyrank),
    command!("zscan", [ZSET, INT], [BYTES, BYTES], sorted_sets::zscan),
    command!("zscore", [ZSET, BYTES], [], sorted_sets::zscore),
    command!("zunionstore", [KEY, INT, BYTES], [BYTES], sorted_sets::zunionstore),
    command!("zinterstore", [KEY, INT, BYTES], [BYTES], sorted_sets::zinterstore),
    // server
    command!("bgsave", [], [BYTES], server_admin::bgsave, no_script),
    command!("dbsize", [], [], server_admin::dbsize),
    command!("flushdb", [], [BYTES], server_admin::flushdb),
    command!("flushall", [], [BYTES], server_admin::flushall),
    command!("lastsave", [], [], server_admin::lastsave),
    command!("save", [], [], server_admin::save, no_script),
    command!("time", [], [], server_admin::time),
    // scripting
    command!("eval", [BYTES, INT], [BYTES], scripting::eval, no_script),
    command!("evalsha", [BYTES, INT], [BYTES], scripting::evalsha, no_script),
    command!("script", [BYTES], [BYTES], scripting::script, no_script),
    // pub/sub
    command!("psubscribe", [BYTES], [BYTES], pub_sub::psubscribe, no_script),
    command!("subscribe", [BYTES], [BYTES], pub_sub::subscribe, no_script),
    command!("punsubscribe", [], [BYTES], pub_sub::punsubscribe, no_script),
    command!("unsubscribe", [], [BYTES], pub_sub::unsubscribe, no_script),
    command!("publish", [BYTES, BYTES], [], pub_sub::publish),
];

/// Looks up a command by its lowercase name.
pub fn get(name: &str) -> Option<&'static CommandSpec> {
    static INDEX: OnceLock<HashMap<&'static str, &'static CommandSpec>> = OnceLock::new();
    INDEX
        .get_or_init(|| {
            COMMANDS
                .iter()
                .map(|spec| (spec.signature.name, spec))
                .collect()
        })
        .get(name)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique_and_lowercase() {
        let mut seen = std::collections::HashSet::new();
        for name in COMMANDS.iter().map(|spec| spec.signature.name) {
            assert_eq!(name, name.to_lowercase(), "command {} is not lowercase", name);
            assert!(seen.insert(name), "command {} registered twice", name);
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(get("get").map(|spec| spec.signature.fixed.len()), Some(1));
        assert!(get("exec").is_some_and(|spec| spec.no_script));
        assert!(get("GET").is_none());
        assert!(get("dump").is_none());
    }
}
