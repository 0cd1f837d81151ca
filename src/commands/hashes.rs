use bytes::Bytes;

use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        keys::{scan_page, scan_reply, ScanOptions},
        signature::{decode_float, decode_int, format_float_human, Arg, FloatOptions},
        CommandError,
    },
    resp::RespValue,
};

pub fn hdel(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let item = ctx.item(&args[0])?;
    let mut removed = 0;
    for field in &args[1..] {
        if item.as_hash()?.remove(field.bytes()?).is_some() {
            removed += 1;
        }
    }
    if removed > 0 {
        item.mark_updated();
    }
    Ok(RespValue::Integer(removed).into())
}

pub fn hexists(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let field = args[1].bytes()?;
    let exists = ctx.items.get_mut(args[0].key()?).as_hash()?.contains_key(field);
    Ok(RespValue::Integer(i64::from(exists)).into())
}

pub fn hget(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let field = args[1].bytes()?;
    let value = ctx.items.get_mut(args[0].key()?).as_hash()?.get(field).cloned();
    Ok(RespValue::optional_bulk(value).into())
}

pub fn hgetall(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let hash = ctx.item(&args[0])?.as_hash()?;
    let flat = hash
        .iter()
        .flat_map(|(field, value)| [field.clone(), value.clone()]);
    Ok(RespValue::bulk_array(flat).into())
}

pub fn hincrby(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let field = args[1].bytes()?.clone();
    let amount = args[2].int()?;
    let item = ctx.item(&args[0])?;
    let hash = item.as_hash()?;

    let current = match hash.get(&field) {
        Some(value) => decode_int(value)?,
        None => 0,
    };
    let result = current.checked_add(amount).ok_or(CommandError::Overflow)?;
    hash.insert(field, Bytes::from(result.to_string()));
    item.mark_updated();
    Ok(RespValue::Integer(result).into())
}

pub fn hincrbyfloat(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let field = args[1].bytes()?.clone();
    let amount = decode_float(args[2].bytes()?, FloatOptions::default())?;
    let item = ctx.item(&args[0])?;
    let hash = item.as_hash()?;

    let current = match hash.get(&field) {
        Some(value) => decode_float(value, FloatOptions::default())?,
        None => 0.0,
    };
    let result = current + amount;
    if !result.is_finite() {
        return Err(CommandError::NonFiniteIncrement);
    }

    let encoded = Bytes::from(format_float_human(result));
    hash.insert(field, encoded.clone());
    item.mark_updated();
    Ok(RespValue::BulkString(encoded).into())
}

pub fn hkeys(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let hash = ctx.item(&args[0])?.as_hash()?;
    Ok(RespValue::bulk_array(hash.keys().cloned()).into())
}

pub fn hlen(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let length = ctx.item(&args[0])?.as_hash()?.len();
    Ok(RespValue::Integer(length as i64).into())
}

pub fn hmget(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let hash = ctx.items.get_mut(args[0].key()?).as_hash()?;
    let mut values = Vec::with_capacity(args.len() - 1);
    for field in &args[1..] {
        values.push(RespValue::optional_bulk(hash.get(field.bytes()?).cloned()));
    }
    Ok(RespValue::Array(values).into())
}

/// Stores every field/value pair and returns how many fields were new.
fn store_fields(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<i64, CommandError> {
    let item = ctx.items.get_mut(args[0].key()?);
    let hash = item.as_hash()?;
    let mut created = 0;
    for pair in args[1..].chunks(2) {
        if hash
            .insert(pair[0].bytes()?.clone(), pair[1].bytes()?.clone())
            .is_none()
        {
            created += 1;
        }
    }
    item.mark_updated();
    Ok(created)
}

pub fn hmset(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    store_fields(ctx, args)?;
    Ok(RespValue::ok().into())
}

pub fn hset(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let created = store_fields(ctx, args)?;
    Ok(RespValue::Integer(created).into())
}

pub fn hsetnx(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let field = args[1].bytes()?;
    if ctx.items.get_mut(args[0].key()?).as_hash()?.contains_key(field) {
        return Ok(RespValue::Integer(0).into());
    }
    store_fields(ctx, args)?;
    Ok(RespValue::Integer(1).into())
}

pub fn hstrlen(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let field = args[1].bytes()?;
    let hash = ctx.items.get_mut(args[0].key()?).as_hash()?;
    let length = hash.get(field).map_or(0, Bytes::len);
    Ok(RespValue::Integer(length as i64).into())
}

pub fn hvals(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let hash = ctx.item(&args[0])?.as_hash()?;
    Ok(RespValue::bulk_array(hash.values().cloned()).into())
}

/// HSCAN walks fields in sorted order and returns field/value pairs.
pub fn hscan(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let cursor = args[1].int()?;
    let options = ScanOptions::parse(&args[2..])?;
    if options.type_name.is_some() {
        return Err(CommandError::Syntax);
    }

    let hash = ctx.item(&args[0])?.as_hash()?;
    let mut entries: Vec<(Bytes, Bytes)> = hash
        .iter()
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    entries.sort();

    let (next, page) = scan_page(entries, cursor, options.count, |(field, _)| {
        options.matches(field)
    });
    let flat = page.into_iter().flat_map(|(field, value)| [field, value]).collect();
    Ok(scan_reply(next, flat).into())
}
