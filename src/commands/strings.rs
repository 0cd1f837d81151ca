use std::ops::Range;

use bytes::{Bytes, BytesMut};

use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        command_item::CommandItem,
        signature::{
            casematch, decode_float, decode_int, format_float_human, Arg, FloatOptions,
            MAX_STRING_SIZE,
        },
        CommandError,
    },
    key_value_store::Value,
    resp::RespValue,
};

/// Largest expiry a server accepts, in milliseconds since the epoch.
const MAX_EXPIRE_MS: f64 = 9_223_372_036_854_775_808.0;

/// Resolves GETRANGE-style indices into a byte range. Negative indices count
/// from the end; a range that is negative and reversed is empty.
fn string_range(start: i64, end: i64, length: usize) -> Range<usize> {
    let length = length as i64;
    if start < 0 && end < 0 && start > end {
        return 0..0;
    }
    let start = if start < 0 { (start + length).max(0) } else { start };
    let end = if end < 0 { (end + length).max(0) } else { end };
    let end = end.min(length - 1) + 1;
    let start = start.min(length);
    start as usize..end.max(start) as usize
}

fn current(item: &CommandItem) -> Result<Bytes, CommandError> {
    Ok(item.as_string()?.cloned().unwrap_or_default())
}

pub fn append(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let suffix = args[1].bytes()?;
    let item = ctx.item(&args[0])?;
    let old = current(item)?;
    if (old.len() + suffix.len()) as i64 > MAX_STRING_SIZE {
        return Err(CommandError::StringTooLong);
    }

    let mut value = BytesMut::from(old.as_ref());
    value.extend_from_slice(suffix);
    let length = value.len();
    item.update(Value::String(value.freeze()));
    Ok(RespValue::Integer(length as i64).into())
}

pub fn bitcount(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    // The argument count is checked before the bounds are decoded.
    let bounds = match &args[1..] {
        [] => None,
        [start, end] => Some((decode_int(start.bytes()?)?, decode_int(end.bytes()?)?)),
        _ => return Err(CommandError::Syntax),
    };

    let value = current(ctx.item(&args[0])?)?;
    let selected = match bounds {
        Some((start, end)) => &value[string_range(start, end, value.len())],
        None => &value[..],
    };
    let ones: u32 = selected.iter().map(|byte| byte.count_ones()).sum();
    Ok(RespValue::Integer(ones as i64).into())
}

fn increment(item: &mut CommandItem, amount: i128) -> Result<CommandResult, CommandError> {
    let value = match item.as_string()? {
        Some(value) => decode_int(value)?,
        None => 0,
    };
    let result = i64::try_from(value as i128 + amount).map_err(|_| CommandError::Overflow)?;
    item.update(Value::String(Bytes::from(result.to_string())));
    Ok(RespValue::Integer(result).into())
}

pub fn incrby(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let amount = args[1].int()?;
    increment(ctx.item(&args[0])?, amount as i128)
}

pub fn incr(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    increment(ctx.item(&args[0])?, 1)
}

pub fn decrby(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let amount = args[1].int()?;
    increment(ctx.item(&args[0])?, -(amount as i128))
}

pub fn decr(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    increment(ctx.item(&args[0])?, -1)
}

pub fn incrbyfloat(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let amount = args[1].bytes()?.clone();
    let item = ctx.item(&args[0])?;
    let value = match item.as_string()? {
        Some(value) => decode_float(value, FloatOptions::default())?,
        None => 0.0,
    };
    let result = value + decode_float(&amount, FloatOptions::default())?;
    if !result.is_finite() {
        return Err(CommandError::NonFiniteIncrement);
    }

    let encoded = Bytes::from(format_float_human(result));
    item.update(Value::String(encoded.clone()));
    Ok(RespValue::BulkString(encoded).into())
}

pub fn get(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let value = ctx.item(&args[0])?.as_string()?.cloned();
    Ok(RespValue::optional_bulk(value).into())
}

pub fn getbit(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let offset = args[1].int()? as usize;
    let value = current(ctx.item(&args[0])?)?;
    let bit = match value.get(offset / 8) {
        Some(byte) => (byte >> (7 - offset % 8)) & 1,
        None => 0,
    };
    Ok(RespValue::Integer(bit as i64).into())
}

pub fn setbit(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let offset = args[1].int()? as usize;
    let bit = args[2].int()?;
    let item = ctx.item(&args[0])?;

    let mut value = match item.as_string()? {
        Some(value) => value.to_vec(),
        None => vec![0],
    };
    let index = offset / 8;
    if value.len() <= index {
        value.resize(index + 1, 0);
    }
    let mask = 1u8 << (7 - offset % 8);
    let old = i64::from(value[index] & mask != 0);
    if bit == 1 {
        value[index] |= mask;
    } else {
        value[index] &= !mask;
    }

    item.update(Value::String(Bytes::from(value)));
    Ok(RespValue::Integer(old).into())
}

pub fn getrange(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let (start, end) = (args[1].int()?, args[2].int()?);
    let value = current(ctx.item(&args[0])?)?;
    let range = string_range(start, end, value.len());
    Ok(RespValue::BulkString(value.slice(range)).into())
}

pub fn getset(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let value = args[1].bytes()?.clone();
    let item = ctx.item(&args[0])?;
    let old = item.as_string()?.cloned();
    item.set_value(Value::String(value));
    Ok(RespValue::optional_bulk(old).into())
}

/// MGET answers nil for keys holding something other than a string.
pub fn mget(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(match ctx.item(arg)?.value() {
            Some(Value::String(value)) => RespValue::BulkString(value.clone()),
            _ => RespValue::Null,
        });
    }
    Ok(RespValue::Array(values).into())
}

fn store_pairs(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<(), CommandError> {
    for pair in args.chunks(2) {
        let value = pair[1].bytes()?.clone();
        ctx.item(&pair[0])?.set_value(Value::String(value));
    }
    Ok(())
}

pub fn mset(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    store_pairs(ctx, args)?;
    Ok(RespValue::ok().into())
}

pub fn msetnx(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    for pair in args.chunks(2) {
        if ctx.item(&pair[0])?.exists() {
            return Ok(RespValue::Integer(0).into());
        }
    }
    store_pairs(ctx, args)?;
    Ok(RespValue::Integer(1).into())
}

#[derive(Debug, Default)]
struct SetOptions {
    nx: bool,
    xx: bool,
    ex: Option<i64>,
    px: Option<i64>,
    keep_ttl: bool,
    get: bool,
}

impl SetOptions {
    fn parse(args: &[Arg], now: f64) -> Result<Self, CommandError> {
        let mut options = SetOptions::default();
        let mut index = 0;
        while index < args.len() {
            let arg = args[index].bytes()?;
            let has_value = index + 1 < args.len();
            if casematch(arg, "nx") {
                options.nx = true;
            } else if casematch(arg, "xx") {
                options.xx = true;
            } else if casematch(arg, "ex") && has_value {
                let seconds = decode_int(args[index + 1].bytes()?)?;
                if seconds <= 0 || (now + seconds as f64) * 1000.0 >= MAX_EXPIRE_MS {
                    return Err(CommandError::InvalidExpireTime("set".to_string()));
                }
                options.ex = Some(seconds);
                index += 1;
            } else if casematch(arg, "px") && has_value {
                let millis = decode_int(args[index + 1].bytes()?)?;
                if millis <= 0 || now * 1000.0 + millis as f64 >= MAX_EXPIRE_MS {
                    return Err(CommandError::InvalidExpireTime("set".to_string()));
                }
                options.px = Some(millis);
                index += 1;
            } else if casematch(arg, "keepttl") {
                options.keep_ttl = true;
            } else if casematch(arg, "get") {
                options.get = true;
            } else {
                return Err(CommandError::Syntax);
            }
            index += 1;
        }

        let expiry_options =
            usize::from(options.ex.is_some()) + usize::from(options.px.is_some()) + usize::from(options.keep_ttl);
        if (options.nx && options.xx) || expiry_options > 1 || (options.nx && options.get) {
            return Err(CommandError::Syntax);
        }
        Ok(options)
    }
}

/// SET with NX, XX, EX, PX, KEEPTTL and GET.
pub fn set(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let now = ctx.now();
    let options = SetOptions::parse(&args[2..], now)?;
    let value = args[1].bytes()?.clone();
    let item = ctx.item(&args[0])?;

    let old = if options.get {
        item.as_string()?.cloned()
    } else {
        None
    };
    let reply = |stored: bool| -> CommandResult {
        if options.get {
            RespValue::optional_bulk(old.clone()).into()
        } else if stored {
            RespValue::ok().into()
        } else {
            RespValue::Null.into()
        }
    };

    if (options.nx && item.exists()) || (options.xx && !item.exists()) {
        return Ok(reply(false));
    }

    if options.keep_ttl {
        item.update(Value::String(value));
    } else {
        item.set_value(Value::String(value));
    }
    if let Some(seconds) = options.ex {
        item.set_expire_at(Some(now + seconds as f64));
    }
    if let Some(millis) = options.px {
        item.set_expire_at(Some(now + millis as f64 / 1000.0));
    }
    Ok(reply(true))
}

pub fn setex(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let now = ctx.now();
    let seconds = args[1].int()?;
    if seconds <= 0 || (now + seconds as f64) * 1000.0 >= MAX_EXPIRE_MS {
        return Err(CommandError::InvalidExpireTime("setex".to_string()));
    }
    let value = args[2].bytes()?.clone();
    let item = ctx.item(&args[0])?;
    item.set_value(Value::String(value));
    item.set_expire_at(Some(now + seconds as f64));
    Ok(RespValue::ok().into())
}

pub fn psetex(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let now = ctx.now();
    let millis = args[1].int()?;
    if millis <= 0 || now * 1000.0 + millis as f64 >= MAX_EXPIRE_MS {
        return Err(CommandError::InvalidExpireTime("psetex".to_string()));
    }
    let value = args[2].bytes()?.clone();
    let item = ctx.item(&args[0])?;
    item.set_value(Value::String(value));
    item.set_expire_at(Some(now + millis as f64 / 1000.0));
    Ok(RespValue::ok().into())
}

pub fn setnx(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let value = args[1].bytes()?.clone();
    let item = ctx.item(&args[0])?;
    if item.exists() {
        return Ok(RespValue::Integer(0).into());
    }
    item.set_value(Value::String(value));
    Ok(RespValue::Integer(1).into())
}

pub fn setrange(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let offset = args[1].int()?;
    let patch = args[2].bytes()?.clone();
    let item = ctx.item(&args[0])?;

    if offset < 0 {
        return Err(CommandError::OffsetOutOfRange);
    }
    let old = current(item)?;
    if patch.is_empty() {
        return Ok(RespValue::Integer(old.len() as i64).into());
    }
    if offset + patch.len() as i64 > MAX_STRING_SIZE {
        return Err(CommandError::StringTooLong);
    }

    let offset = offset as usize;
    let mut value = old.to_vec();
    if value.len() < offset + patch.len() {
        value.resize(offset + patch.len(), 0);
    }
    value[offset..offset + patch.len()].copy_from_slice(&patch);
    let length = value.len();
    item.update(Value::String(Bytes::from(value)));
    Ok(RespValue::Integer(length as i64).into())
}

pub fn strlen(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let length = current(ctx.item(&args[0])?)?.len();
    Ok(RespValue::Integer(length as i64).into())
}
