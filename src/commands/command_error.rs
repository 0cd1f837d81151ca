use thiserror::Error;

use crate::resp::RespValue;

/// Every failure a command can report back to the client.
///
/// The `Display` text of each variant is the exact error line sent on the
/// wire, so client code asserting on messages sees what a real server sends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("ERR syntax error")]
    Syntax,
    #[error("ERR value is not an integer or out of range")]
    InvalidInteger,
    #[error("ERR value is not a valid float")]
    InvalidFloat,
    #[error("ERR bit offset is not an integer or out of range")]
    InvalidBitOffset,
    #[error("ERR bit is not an integer or out of range")]
    InvalidBitValue,
    #[error("ERR DB index is out of range")]
    InvalidDbIndex,
    #[error("ERR timeout is negative")]
    NegativeTimeout,
    #[error("ERR min or max is not a float")]
    InvalidScoreBound,
    #[error("ERR min or max not a valid string range item")]
    InvalidLexBound,
    #[error("ERR invalid expire time in {0}")]
    InvalidExpireTime(String),
    #[error("ERR string exceeds maximum allowed size (512MB)")]
    StringTooLong,
    #[error("ERR offset is out of range")]
    OffsetOutOfRange,
    #[error("ERR index out of range")]
    IndexOutOfRange,
    #[error("ERR no such key")]
    NoSuchKey,
    #[error("ERR increment or decrement would overflow")]
    Overflow,
    #[error("ERR increment would produce NaN or Infinity")]
    NonFiniteIncrement,
    #[error("ERR resulting score is not a number (NaN)")]
    ScoreIsNaN,
    #[error("ERR One or more scores can't be converted into double")]
    SortFloat,
    #[error("ERR source and destination objects are the same")]
    SameObject,
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),
    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,
    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,
    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,
    #[error("ERR WATCH inside MULTI is not allowed")]
    WatchInsideMulti,
    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAbort,
    #[error("EXECABORT Transaction discarded because of: {0}")]
    ExecAbortBecause(String),
    #[error("NOSCRIPT No matching script. Please use EVAL.")]
    NoScript,
    #[error("ERR Number of keys can't be negative")]
    NegativeKeyCount,
    #[error("ERR Number of keys can't be greater than number of args")]
    TooManyKeys,
    #[error("ERR This Redis command is not allowed from scripts")]
    NotAllowedFromScripts,
    #[error("ERR Unknown {0} subcommand or wrong # of args.")]
    UnknownSubcommand(String),
    #[error("ERR only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT allowed in this context")]
    SubscribedContext,
    #[error("ERR at least 1 input key is needed for ZUNIONSTORE/ZINTERSTORE")]
    MissingStoreKeys,
    #[error("ERR ZADD allows either 'nx' or 'xx', not both")]
    ZAddNxAndXx,
    #[error("ERR INCR option supports a single increment-element pair")]
    ZAddIncrPairs,
    #[error("ERR Error running script (call to f_{sha}): @user_script:?: {message}")]
    ScriptFailed { sha: String, message: String },
    #[error("ERR Script attempted to set global variables: {0}")]
    ScriptGlobals(String),
    #[error("ERR scripting runtime is not configured")]
    ScriptingUnavailable,
    #[error("ERR Please specify at least one argument for this redis lib call")]
    EmptyScriptCall,
    #[error("ERR invalid glob pattern: {0}")]
    InvalidGlobPattern(String),
    #[error("ERR invalid command argument")]
    InvalidCommandArgument,
}

impl CommandError {
    /// Renders the error as an RESP error value.
    pub fn as_resp(&self) -> RespValue {
        RespValue::Error(self.to_string())
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.as_resp().encode()).into_owned()
    }

    /// `ERR x` errors raised by EXEC itself while a transaction is open are
    /// reported as `EXECABORT Transaction discarded because of: x`.
    pub fn into_exec_abort(self) -> CommandError {
        let message = self.to_string();
        match message.strip_prefix("ERR ") {
            Some(reason) => CommandError::ExecAbortBecause(reason.to_string()),
            None => self,
        }
    }
}
