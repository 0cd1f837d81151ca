//! Declarative argument signatures and the coercions they drive.
//!
//! A [`Signature`] lists fixed argument slots plus an optional repeating
//! tail. Applying it to raw fields checks arity, decodes every non-key
//! argument, then resolves key arguments into [`CommandItem`]s, short
//! circuiting when a declared key is missing and finally checking kinds.

use bytes::Bytes;

use crate::commands::command_error::CommandError;
use crate::commands::command_item::{KeyItems, KeyRef};
use crate::key_value_store::{Database, ValueKind};
use crate::resp::RespValue;
use crate::sorted_set::{LexBound, ScoreBound};

/// Upper bound on the size of a string value.
pub const MAX_STRING_SIZE: i64 = 512 * 1024 * 1024;

/// Integer slots with their own range and error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntKind {
    Any,
    BitOffset,
    BitValue,
    DbIndex,
    Timeout,
}

impl IntKind {
    /// Decodes and range-checks `value`, reporting this kind's own error.
    pub fn decode(&self, value: &[u8]) -> Result<i64, CommandError> {
        let (range, error) = match self {
            IntKind::Any => (i64::MIN..=i64::MAX, CommandError::InvalidInteger),
            IntKind::BitOffset => (0..=8 * MAX_STRING_SIZE - 1, CommandError::InvalidBitOffset),
            IntKind::BitValue => (0..=1, CommandError::InvalidBitValue),
            IntKind::DbIndex => (0..=i64::MAX, CommandError::InvalidDbIndex),
            IntKind::Timeout => (0..=i64::MAX, CommandError::NegativeTimeout),
        };
        match decode_int(value) {
            Ok(decoded) if range.contains(&decoded) => Ok(decoded),
            _ => Err(error),
        }
    }
}

/// What a command answers when a key declared with a missing return is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReply {
    Nil,
    Zero,
}

impl MissingReply {
    fn reply(&self) -> RespValue {
        match self {
            MissingReply::Nil => RespValue::Null,
            MissingReply::Zero => RespValue::Integer(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Bytes,
    Int(IntKind),
    Float,
    Score,
    Lex,
    Key {
        kind: Option<ValueKind>,
        missing: Option<MissingReply>,
    },
}

pub const BYTES: ArgType = ArgType::Bytes;
pub const INT: ArgType = ArgType::Int(IntKind::Any);
pub const FLOAT: ArgType = ArgType::Float;
pub const SCORE: ArgType = ArgType::Score;
pub const LEX: ArgType = ArgType::Lex;
pub const KEY: ArgType = ArgType::Key {
    kind: None,
    missing: None,
};

/// A key slot that must hold `kind` when present.
pub const fn key(kind: ValueKind) -> ArgType {
    ArgType::Key {
        kind: Some(kind),
        missing: None,
    }
}

/// A key slot that answers `missing` without running the command when absent.
pub const fn key_or(kind: ValueKind, missing: MissingReply) -> ArgType {
    ArgType::Key {
        kind: Some(kind),
        missing: Some(missing),
    }
}

/// A decoded argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Bytes(Bytes),
    Int(i64),
    Float(f64),
    Score(ScoreBound),
    Lex(LexBound),
    Key(KeyRef),
}

impl Arg {
    pub fn bytes(&self) -> Result<&Bytes, CommandError> {
        match self {
            Arg::Bytes(value) => Ok(value),
            _ => Err(CommandError::InvalidCommandArgument),
        }
    }

    pub fn int(&self) -> Result<i64, CommandError> {
        match self {
            Arg::Int(value) => Ok(*value),
            _ => Err(CommandError::InvalidCommandArgument),
        }
    }

    pub fn float(&self) -> Result<f64, CommandError> {
        match self {
            Arg::Float(value) => Ok(*value),
            _ => Err(CommandError::InvalidCommandArgument),
        }
    }

    pub fn score(&self) -> Result<ScoreBound, CommandError> {
        match self {
            Arg::Score(value) => Ok(*value),
            _ => Err(CommandError::InvalidCommandArgument),
        }
    }

    pub fn lex(&self) -> Result<&LexBound, CommandError> {
        match self {
            Arg::Lex(value) => Ok(value),
            _ => Err(CommandError::InvalidCommandArgument),
        }
    }

    pub fn key(&self) -> Result<KeyRef, CommandError> {
        match self {
            Arg::Key(value) => Ok(*value),
            _ => Err(CommandError::InvalidCommandArgument),
        }
    }
}

/// Collects every argument as raw bytes, e.g. for option lists.
pub fn bytes_args(args: &[Arg]) -> Result<Vec<Bytes>, CommandError> {
    args.iter().map(|arg| arg.bytes().cloned()).collect()
}

/// Result of applying a signature.
#[derive(Debug)]
pub enum Applied {
    Args(Vec<Arg>, KeyItems),
    ShortCircuit(RespValue),
}

#[derive(Debug)]
pub struct Signature {
    pub name: &'static str,
    pub fixed: &'static [ArgType],
    pub repeat: &'static [ArgType],
}

impl Signature {
    /// Rejects argument counts that can never fit the shape.
    pub fn check_arity(&self, args: &[Bytes]) -> Result<(), CommandError> {
        if args.len() != self.fixed.len() && (args.len() < self.fixed.len() || self.repeat.is_empty())
        {
            return Err(self.arity_error());
        }
        Ok(())
    }

    pub fn arity_error(&self) -> CommandError {
        CommandError::WrongArity(self.name.to_string())
    }

    /// Validates `args` and resolves key arguments against `db`.
    ///
    /// Keys are taken out of `db` into the returned [`KeyItems`], which must
    /// be committed or restored once the command finishes.
    pub fn apply(&self, args: &[Bytes], db: &mut Database) -> Result<Applied, CommandError> {
        self.check_arity(args)?;
        if !self.repeat.is_empty() && (args.len() - self.fixed.len()) % self.repeat.len() != 0 {
            return Err(self.arity_error());
        }

        let types: Vec<ArgType> = (0..args.len())
            .map(|index| match self.fixed.get(index) {
                Some(arg_type) => *arg_type,
                None => self.repeat[(index - self.fixed.len()) % self.repeat.len()],
            })
            .collect();

        let mut decoded = Vec::with_capacity(args.len());
        for (arg, arg_type) in args.iter().zip(&types) {
            decoded.push(match arg_type {
                ArgType::Bytes | ArgType::Key { .. } => None,
                ArgType::Int(kind) => Some(Arg::Int(kind.decode(arg)?)),
                ArgType::Float => Some(Arg::Float(decode_float(arg, FloatOptions::default())?)),
                ArgType::Score => Some(Arg::Score(decode_score_bound(arg)?)),
                ArgType::Lex => Some(Arg::Lex(decode_lex_bound(arg)?)),
            });
        }

        for (arg, arg_type) in args.iter().zip(&types) {
            if let ArgType::Key {
                missing: Some(missing),
                ..
            } = arg_type
            {
                if !db.contains_key(arg) {
                    return Ok(Applied::ShortCircuit(missing.reply()));
                }
            }
        }

        for (arg, arg_type) in args.iter().zip(&types) {
            if let ArgType::Key {
                kind: Some(kind), ..
            } = arg_type
            {
                if let Some(item) = db.get(arg) {
                    if item.value.kind() != *kind {
                        return Err(CommandError::WrongType);
                    }
                }
            }
        }

        let mut items = KeyItems::new();
        let resolved = args
            .iter()
            .zip(types)
            .zip(decoded)
            .map(|((arg, arg_type), decoded)| match (arg_type, decoded) {
                (_, Some(decoded)) => decoded,
                (ArgType::Key { .. }, None) => Arg::Key(items.resolve(db, arg)),
                (_, None) => Arg::Bytes(arg.clone()),
            })
            .collect();

        Ok(Applied::Args(resolved, items))
    }
}

/// Truncates at the first NUL byte, the way C string functions see the value.
pub fn null_terminate(value: &[u8]) -> &[u8] {
    match value.iter().position(|byte| *byte == 0) {
        Some(position) => &value[..position],
        None => value,
    }
}

/// Case-insensitive comparison of an option against its lowercase name.
pub fn casematch(value: &[u8], expected: &str) -> bool {
    null_terminate(value).eq_ignore_ascii_case(expected.as_bytes())
}

/// Decodes a signed 64-bit integer written in canonical form.
pub fn decode_int(value: &[u8]) -> Result<i64, CommandError> {
    let text = std::str::from_utf8(value).map_err(|_| CommandError::InvalidInteger)?;
    let decoded = text
        .parse::<i64>()
        .map_err(|_| CommandError::InvalidInteger)?;
    if decoded.to_string() != text {
        return Err(CommandError::InvalidInteger);
    }
    Ok(decoded)
}

/// Parsing variants used by different float call sites.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatOptions {
    pub allow_leading_whitespace: bool,
    pub allow_erange: bool,
    pub allow_empty: bool,
    pub crop_null: bool,
}

/// Decodes a float, rejecting NaN, trailing whitespace and literals that
/// overflow or underflow unless `allow_erange` is set.
pub fn decode_float(value: &[u8], options: FloatOptions) -> Result<f64, CommandError> {
    parse_float(value, options).ok_or(CommandError::InvalidFloat)
}

fn parse_float(value: &[u8], options: FloatOptions) -> Option<f64> {
    let mut value = value;
    if options.crop_null {
        value = null_terminate(value);
    }
    if options.allow_empty && value.is_empty() {
        return Some(0.0);
    }
    if !options.allow_leading_whitespace && value.first().is_some_and(|byte| is_space(*byte)) {
        return None;
    }
    if value.last().is_some_and(|byte| is_space(*byte)) {
        return None;
    }

    let text = std::str::from_utf8(value).ok()?;
    let parsed = text.trim_start_matches(|c: char| c.is_ascii() && is_space(c as u8)).parse::<f64>().ok()?;
    if parsed.is_nan() {
        return None;
    }
    if !options.allow_erange && (parsed.is_infinite() || parsed == 0.0) {
        let significant = value
            .iter()
            .take_while(|byte| !byte.is_ascii_alphabetic())
            .any(|byte| (b'1'..=b'9').contains(byte));
        if significant {
            return None;
        }
    }
    Some(parsed)
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Decodes a score bound such as `1.5`, `(1.5` or `-inf`.
pub fn decode_score_bound(value: &[u8]) -> Result<ScoreBound, CommandError> {
    let (exclusive, value) = match value.strip_prefix(b"(") {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let options = FloatOptions {
        allow_leading_whitespace: true,
        allow_erange: true,
        allow_empty: true,
        crop_null: true,
    };
    let value = parse_float(value, options).ok_or(CommandError::InvalidScoreBound)?;
    Ok(ScoreBound { value, exclusive })
}

/// Decodes a lexicographic bound: `-`, `+`, `[member` or `(member`.
pub fn decode_lex_bound(value: &[u8]) -> Result<LexBound, CommandError> {
    match value {
        b"-" => Ok(LexBound::Min),
        b"+" => Ok(LexBound::Max),
        [b'(', rest @ ..] => Ok(LexBound::Exclusive(Bytes::copy_from_slice(rest))),
        [b'[', rest @ ..] => Ok(LexBound::Inclusive(Bytes::copy_from_slice(rest))),
        _ => Err(CommandError::InvalidLexBound),
    }
}

/// Decodes a value for SORT, which tolerates padding and empty strings.
pub fn decode_sort_float(value: &[u8]) -> Result<f64, CommandError> {
    let options = FloatOptions {
        allow_leading_whitespace: true,
        allow_erange: false,
        allow_empty: true,
        crop_null: true,
    };
    parse_float(value, options).ok_or(CommandError::SortFloat)
}

/// Formats a float like C's `%.17g`, with `inf`/`-inf` for infinities.
pub fn format_float(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value.is_nan() {
        return "nan".to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:.16e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-4..17).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", strip_fraction_zeros(mantissa), sign, exponent.abs())
    } else {
        let decimals = (16 - exponent) as usize;
        strip_fraction_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

/// Formats a float in fixed point with up to 17 decimals, trailing zeros
/// removed. Used by INCRBYFLOAT and HINCRBYFLOAT.
pub fn format_float_human(value: f64) -> String {
    if value.is_infinite() {
        return format_float(value);
    }
    strip_fraction_zeros(&format!("{:.17}", value)).to_string()
}

fn strip_fraction_zeros(value: &str) -> &str {
    if value.contains('.') {
        value.trim_end_matches('0').trim_end_matches('.')
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_value_store::{Item, Value};
    use crate::commands::command_item::CommandItem;

    #[test]
    fn test_decode_int() {
        let test_cases: Vec<(&[u8], Result<i64, CommandError>)> = vec![
            (b"42", Ok(42)),
            (b"-7", Ok(-7)),
            (b"9223372036854775807", Ok(i64::MAX)),
            (b"9223372036854775808", Err(CommandError::InvalidInteger)),
            (b"+1", Err(CommandError::InvalidInteger)),
            (b"007", Err(CommandError::InvalidInteger)),
            (b" 1", Err(CommandError::InvalidInteger)),
            (b"-0", Err(CommandError::InvalidInteger)),
            (b"1.0", Err(CommandError::InvalidInteger)),
            (b"", Err(CommandError::InvalidInteger)),
        ];

        for (input, expected) in test_cases {
            assert_eq!(decode_int(input), expected, "decoding {:?}", input);
        }
    }

    #[test]
    fn test_decode_float() {
        let test_cases: Vec<(&[u8], Option<f64>)> = vec![
            (b"1.5", Some(1.5)),
            (b"-inf", Some(f64::NEG_INFINITY)),
            (b"+inf", Some(f64::INFINITY)),
            (b"1e3", Some(1000.0)),
            (b"0", Some(0.0)),
            (b"0.0e10", Some(0.0)),
            (b"nan", None),
            (b" 1", None),
            (b"1 ", None),
            (b"1e999", None),
            (b"1e-999", None),
            (b"abc", None),
            (b"", None),
        ];

        for (input, expected) in test_cases {
            assert_eq!(
                parse_float(input, FloatOptions::default()),
                expected,
                "decoding {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_decode_score_bound() {
        let test_cases: Vec<(&[u8], Result<ScoreBound, CommandError>)> = vec![
            (b"5", Ok(ScoreBound::inclusive(5.0))),
            (b"(5", Ok(ScoreBound::exclusive(5.0))),
            (b" 2", Ok(ScoreBound::inclusive(2.0))),
            (b"", Ok(ScoreBound::inclusive(0.0))),
            (b"(-inf", Ok(ScoreBound::exclusive(f64::NEG_INFINITY))),
            (b"1e999", Ok(ScoreBound::inclusive(f64::INFINITY))),
            (b"[5", Err(CommandError::InvalidScoreBound)),
            (b"nan", Err(CommandError::InvalidScoreBound)),
        ];

        for (input, expected) in test_cases {
            assert_eq!(decode_score_bound(input), expected, "decoding {:?}", input);
        }
    }

    #[test]
    fn test_decode_lex_bound() {
        assert_eq!(decode_lex_bound(b"-"), Ok(LexBound::Min));
        assert_eq!(decode_lex_bound(b"+"), Ok(LexBound::Max));
        assert_eq!(decode_lex_bound(b"[a"), Ok(LexBound::Inclusive(Bytes::from_static(b"a"))));
        assert_eq!(decode_lex_bound(b"(a"), Ok(LexBound::Exclusive(Bytes::from_static(b"a"))));
        assert_eq!(decode_lex_bound(b"a"), Err(CommandError::InvalidLexBound));
        assert_eq!(decode_lex_bound(b""), Err(CommandError::InvalidLexBound));
    }

    #[test]
    fn test_format_float() {
        let test_cases = vec![
            (1.0, "1"),
            (1.5, "1.5"),
            (-2.25, "-2.25"),
            (0.1, "0.10000000000000001"),
            (1.1, "1.1000000000000001"),
            (100.0, "100"),
            (1e17, "1e+17"),
            (1.5e-5, "1.5e-05"),
            (0.0001, "0.0001"),
            (123456789012345680.0, "1.2345678901234568e+17"),
            (f64::INFINITY, "inf"),
            (f64::NEG_INFINITY, "-inf"),
            (0.0, "0"),
        ];

        for (value, expected) in test_cases {
            assert_eq!(format_float(value), expected, "formatting {}", value);
        }
    }

    #[test]
    fn test_format_float_human() {
        let test_cases = vec![(10.5, "10.5"), (3.0, "3"), (5.0e3, "5000"), (0.0, "0")];

        for (value, expected) in test_cases {
            assert_eq!(format_float_human(value), expected, "formatting {}", value);
        }
    }

    #[test]
    fn test_apply_checks_arity_then_values_then_keys() {
        const SIGNATURE: Signature = Signature {
            name: "lindex",
            fixed: &[key_or(ValueKind::List, MissingReply::Nil), INT],
            repeat: &[],
        };
        let mut db = Database::new();
        db.set(Bytes::from_static(b"str"), Item::new(Value::String(Bytes::from_static(b"x"))));

        let args = |items: &[&'static str]| -> Vec<Bytes> {
            items.iter().map(|item| Bytes::from_static(item.as_bytes())).collect()
        };

        assert_eq!(
            SIGNATURE.apply(&args(&["missing"]), &mut db).err(),
            Some(CommandError::WrongArity("lindex".to_string()))
        );
        assert_eq!(
            SIGNATURE.apply(&args(&["missing", "x"]), &mut db).err(),
            Some(CommandError::InvalidInteger)
        );
        assert!(matches!(
            SIGNATURE.apply(&args(&["missing", "1"]), &mut db),
            Ok(Applied::ShortCircuit(RespValue::Null))
        ));
        assert_eq!(
            SIGNATURE.apply(&args(&["str", "1"]), &mut db).err(),
            Some(CommandError::WrongType)
        );
        assert!(db.contains_key(b"str"));
    }

    #[test]
    fn test_apply_resolves_repeated_keys_once() {
        const SIGNATURE: Signature = Signature {
            name: "rpoplpush",
            fixed: &[key(ValueKind::List), key(ValueKind::List)],
            repeat: &[],
        };
        let mut db = Database::new();
        let args = vec![Bytes::from_static(b"l"), Bytes::from_static(b"l")];

        let Ok(Applied::Args(resolved, items)) = SIGNATURE.apply(&args, &mut db) else {
            panic!("expected resolved arguments");
        };
        assert_eq!(resolved[0], resolved[1]);
        assert_eq!(items.len(), 1);
        let item: &CommandItem = items.get(resolved[0].key().unwrap());
        assert!(!item.exists());
    }
}
