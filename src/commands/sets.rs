use std::collections::HashSet;

use bytes::Bytes;
use rand::seq::{IndexedRandom, SliceRandom};

use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        keys::{scan_page, scan_reply, ScanOptions},
        signature::Arg,
        CommandError,
    },
    key_value_store::Value,
    resp::RespValue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SetOperation {
    Difference,
    Intersection,
    Union,
}

/// Combines the sets behind `sources` left to right. An intersection stops
/// as soon as one input is empty.
pub(super) fn combine(
    ctx: &mut CommandContext<'_>,
    sources: &[Arg],
    operation: SetOperation,
) -> Result<HashSet<Bytes>, CommandError> {
    let Some((first, rest)) = sources.split_first() else {
        return Ok(HashSet::new());
    };
    let mut result = ctx.item(first)?.as_set()?.clone();
    for source in rest {
        if operation == SetOperation::Intersection && result.is_empty() {
            break;
        }
        let other = ctx.item(source)?.as_set()?;
        match operation {
            SetOperation::Difference => result.retain(|member| !other.contains(member)),
            SetOperation::Intersection => result.retain(|member| other.contains(member)),
            SetOperation::Union => result.extend(other.iter().cloned()),
        }
    }
    Ok(result)
}

fn combine_reply(ctx: &mut CommandContext<'_>, args: &[Arg], operation: SetOperation) -> Result<CommandResult, CommandError> {
    let members = combine(ctx, args, operation)?;
    Ok(RespValue::bulk_array(members).into())
}

/// Stores the combination of `args[1..]` in `args[0]`, replacing whatever
/// it held, and returns its size.
pub(super) fn combine_store(
    ctx: &mut CommandContext<'_>,
    args: &[Arg],
    operation: SetOperation,
) -> Result<usize, CommandError> {
    let members = combine(ctx, &args[1..], operation)?;
    let length = members.len();
    ctx.item(&args[0])?.set_value(Value::Set(members));
    Ok(length)
}

fn store_reply(ctx: &mut CommandContext<'_>, args: &[Arg], operation: SetOperation) -> Result<CommandResult, CommandError> {
    let length = combine_store(ctx, args, operation)?;
    Ok(RespValue::Integer(length as i64).into())
}

/// Adds `members` and returns how many were new.
pub(super) fn add_members(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<usize, CommandError> {
    let item = ctx.item(&args[0])?;
    let set = item.as_set()?;
    let before = set.len();
    for member in &args[1..] {
        set.insert(member.bytes()?.clone());
    }
    let added = set.len() - before;
    item.mark_updated();
    Ok(added)
}

pub fn sadd(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let added = add_members(ctx, args)?;
    Ok(RespValue::Integer(added as i64).into())
}

pub fn scard(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let length = ctx.item(&args[0])?.as_set()?.len();
    Ok(RespValue::Integer(length as i64).into())
}

pub fn sdiff(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    combine_reply(ctx, args, SetOperation::Difference)
}

pub fn sdiffstore(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    store_reply(ctx, args, SetOperation::Difference)
}

pub fn sinter(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    combine_reply(ctx, args, SetOperation::Intersection)
}

pub fn sinterstore(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    store_reply(ctx, args, SetOperation::Intersection)
}

pub fn sunion(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    combine_reply(ctx, args, SetOperation::Union)
}

pub fn sunionstore(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    store_reply(ctx, args, SetOperation::Union)
}

pub fn sismember(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let member = args[1].bytes()?;
    let contains = ctx.items.get_mut(args[0].key()?).as_set()?.contains(member);
    Ok(RespValue::Integer(i64::from(contains)).into())
}

pub fn smembers(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let set = ctx.item(&args[0])?.as_set()?;
    Ok(RespValue::bulk_array(set.iter().cloned()).into())
}

pub fn smove(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let member = args[2].bytes()?.clone();
    let source = ctx.items.get_mut(args[0].key()?);
    if !source.as_set()?.remove(&member) {
        return Ok(RespValue::Integer(0).into());
    }
    source.mark_updated();

    let destination = ctx.items.get_mut(args[1].key()?);
    destination.as_set()?.insert(member);
    destination.mark_updated();
    Ok(RespValue::Integer(1).into())
}

/// Up to `count` distinct members, in random order.
fn sample(set: &HashSet<Bytes>, count: usize) -> Vec<Bytes> {
    let mut members: Vec<Bytes> = set.iter().cloned().collect();
    members.shuffle(&mut rand::rng());
    members.truncate(count);
    members
}

pub fn spop(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let count = match &args[1..] {
        [] => None,
        [count] => Some(count.int()?),
        _ => return Err(CommandError::Syntax),
    };
    let item = ctx.item(&args[0])?;
    let set = item.as_set()?;

    let Some(count) = count else {
        let popped = sample(set, 1).pop();
        if let Some(member) = &popped {
            set.remove(member);
            item.mark_updated();
        }
        return Ok(RespValue::optional_bulk(popped).into());
    };

    let count = usize::try_from(count).map_err(|_| CommandError::IndexOutOfRange)?;
    let popped = sample(set, count);
    for member in &popped {
        set.remove(member);
    }
    if !popped.is_empty() {
        item.mark_updated();
    }
    Ok(RespValue::bulk_array(popped).into())
}

/// SRANDMEMBER without a count returns one member. A positive count returns
/// distinct members, a negative one `-count` picks that may repeat.
pub fn srandmember(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let count = match &args[1..] {
        [] => None,
        [count] => Some(count.int()?),
        _ => return Err(CommandError::Syntax),
    };
    let set = ctx.item(&args[0])?.as_set()?;

    Ok(match count {
        None => RespValue::optional_bulk(sample(set, 1).pop()),
        Some(count) if count >= 0 => {
            RespValue::bulk_array(sample(set, usize::try_from(count).unwrap_or(usize::MAX)))
        }
        Some(_) if set.is_empty() => RespValue::Array(Vec::new()),
        Some(count) => {
            let members: Vec<Bytes> = set.iter().cloned().collect();
            let mut rng = rand::rng();
            let picks = (0..count.unsigned_abs())
                .filter_map(|_| members.choose(&mut rng).cloned())
                .collect::<Vec<_>>();
            RespValue::bulk_array(picks)
        }
    }
    .into())
}

pub fn srem(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let item = ctx.items.get_mut(args[0].key()?);
    let set = item.as_set()?;
    let mut removed = 0;
    for member in &args[1..] {
        if set.remove(member.bytes()?) {
            removed += 1;
        }
    }
    if removed > 0 {
        item.mark_updated();
    }
    Ok(RespValue::Integer(removed).into())
}

pub fn sscan(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let cursor = args[1].int()?;
    let options = ScanOptions::parse(&args[2..])?;
    if options.type_name.is_some() {
        return Err(CommandError::Syntax);
    }

    let mut members: Vec<Bytes> = ctx.item(&args[0])?.as_set()?.iter().cloned().collect();
    members.sort();
    let (next, page) = scan_page(members, cursor, options.count, |member| options.matches(member));
    Ok(scan_reply(next, page).into())
}
