use std::collections::VecDeque;

use bytes::Bytes;

use crate::{
    commands::{
        blocking::{BlockingKind, BlockingRequest},
        command_dispatcher::{CommandContext, CommandResult},
        signature::{bytes_args, casematch, Arg, IntKind},
        CommandError,
    },
    key_value_store::Value,
    resp::RespValue,
    sorted_set::fix_range,
};

/// Resolves a possibly negative index into a position inside `length`.
fn list_index(index: i64, length: usize) -> Option<usize> {
    let index = if index < 0 { index + length as i64 } else { index };
    usize::try_from(index).ok().filter(|index| *index < length)
}

/// Clamps a slice bound the way `value[start:stop]` treats it.
fn slice_bound(bound: i64, length: usize) -> usize {
    let length = length as i64;
    let bound = if bound < 0 { (bound + length).max(0) } else { bound.min(length) };
    bound as usize
}

/// Tries the request once and, if nothing is ready, asks the connection to
/// wait. Inside EXEC a blocking command never waits.
fn block(ctx: &mut CommandContext<'_>, request: BlockingRequest) -> Result<CommandResult, CommandError> {
    if let Some(reply) = request.attempt(ctx.state, true)? {
        return Ok(reply.into());
    }
    if ctx.session.in_exec {
        return Ok(RespValue::Null.into());
    }
    Ok(CommandResult::Block(request))
}

fn blocking_pop(ctx: &mut CommandContext<'_>, args: &[Arg], left: bool) -> Result<CommandResult, CommandError> {
    let Some((timeout, keys)) = args.split_last() else {
        return Err(CommandError::WrongArity(if left { "blpop" } else { "brpop" }.to_string()));
    };
    let timeout = IntKind::Timeout.decode(timeout.bytes()?)?;
    let kind = BlockingKind::Pop {
        keys: bytes_args(keys)?,
        left,
    };
    block(ctx, BlockingRequest::new(kind, timeout, ctx.db_index))
}

pub fn blpop(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    blocking_pop(ctx, args, true)
}

pub fn brpop(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    blocking_pop(ctx, args, false)
}

pub fn brpoplpush(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let kind = BlockingKind::PopPush {
        source: args[0].bytes()?.clone(),
        destination: args[1].bytes()?.clone(),
    };
    let request = BlockingRequest::new(kind, args[2].int()?, ctx.db_index);
    block(ctx, request)
}

pub fn lindex(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let index = args[1].int()?;
    let list = ctx.item(&args[0])?.as_list()?;
    let element = list_index(index, list.len()).and_then(|index| list.get(index).cloned());
    Ok(RespValue::optional_bulk(element).into())
}

pub fn linsert(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let position = args[1].bytes()?;
    let before = casematch(position, "before");
    if !before && !casematch(position, "after") {
        return Err(CommandError::Syntax);
    }
    let pivot = args[2].bytes()?;
    let value = args[3].bytes()?.clone();

    let item = ctx.item(&args[0])?;
    if !item.exists() {
        return Ok(RespValue::Integer(0).into());
    }
    let list = item.as_list()?;
    let Some(index) = list.iter().position(|element| element == pivot) else {
        return Ok(RespValue::Integer(-1).into());
    };
    list.insert(if before { index } else { index + 1 }, value);
    let length = list.len();
    item.mark_updated();
    Ok(RespValue::Integer(length as i64).into())
}

pub fn llen(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let length = ctx.item(&args[0])?.as_list()?.len();
    Ok(RespValue::Integer(length as i64).into())
}

/// LPOP and RPOP. Without a count a single element is returned, with one
/// an array of up to `count` elements in pop order.
fn list_pop(ctx: &mut CommandContext<'_>, args: &[Arg], left: bool) -> Result<CommandResult, CommandError> {
    let count = match &args[1..] {
        [] => None,
        [count] => Some(count.int()?),
        _ => return Err(CommandError::Syntax),
    };
    match count {
        Some(count) if count < 0 => return Err(CommandError::IndexOutOfRange),
        Some(0) => return Ok(RespValue::Null.into()),
        _ => {}
    }

    let item = ctx.item(&args[0])?;
    if !item.exists() {
        return Ok(RespValue::Null.into());
    }
    let list = item.as_list()?;
    let take = count.map_or(1, |count| usize::try_from(count).unwrap_or(usize::MAX));
    let mut popped = Vec::new();
    while popped.len() < take {
        let element = if left { list.pop_front() } else { list.pop_back() };
        match element {
            Some(element) => popped.push(element),
            None => break,
        }
    }
    item.mark_updated();

    Ok(match count {
        None => RespValue::optional_bulk(popped.into_iter().next()),
        Some(_) => RespValue::bulk_array(popped),
    }
    .into())
}

pub fn lpop(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    list_pop(ctx, args, true)
}

pub fn rpop(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    list_pop(ctx, args, false)
}

fn push(ctx: &mut CommandContext<'_>, args: &[Arg], left: bool, only_existing: bool) -> Result<CommandResult, CommandError> {
    let item = ctx.item(&args[0])?;
    if only_existing && !item.exists() {
        return Ok(RespValue::Integer(0).into());
    }
    let list = item.as_list()?;
    for value in &args[1..] {
        let value = value.bytes()?.clone();
        if left {
            list.push_front(value);
        } else {
            list.push_back(value);
        }
    }
    let length = list.len();
    item.mark_updated();
    Ok(RespValue::Integer(length as i64).into())
}

pub fn lpush(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    push(ctx, args, true, false)
}

pub fn lpushx(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    push(ctx, args, true, true)
}

pub fn rpush(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    push(ctx, args, false, false)
}

pub fn rpushx(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    push(ctx, args, false, true)
}

pub fn lrange(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let (start, stop) = (args[1].int()?, args[2].int()?);
    let list = ctx.item(&args[0])?.as_list()?;
    let elements: Vec<Bytes> = match fix_range(start, stop, list.len()) {
        Some((start, stop)) => list.range(start..stop).cloned().collect(),
        None => Vec::new(),
    };
    Ok(RespValue::bulk_array(elements).into())
}

/// LREM removes the first `count` matches, the last `-count` matches, or
/// every match when `count` is 0.
pub fn lrem(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let count = args[1].int()?;
    let value = args[2].bytes()?;
    let item = ctx.items.get_mut(args[0].key()?);
    let list = item.as_list()?;

    let found: Vec<usize> = list
        .iter()
        .enumerate()
        .filter(|(_, element)| *element == value)
        .map(|(index, _)| index)
        .collect();
    let limit = usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX);
    let selected = match count {
        0 => &found[..],
        count if count > 0 => &found[..limit.min(found.len())],
        _ => &found[found.len().saturating_sub(limit)..],
    };

    for index in selected.iter().rev() {
        list.remove(*index);
    }
    if !selected.is_empty() {
        item.mark_updated();
    }
    Ok(RespValue::Integer(selected.len() as i64).into())
}

pub fn lset(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let index = args[1].int()?;
    let value = args[2].bytes()?.clone();
    let item = ctx.item(&args[0])?;
    if !item.exists() {
        return Err(CommandError::NoSuchKey);
    }

    let list = item.as_list()?;
    let index = list_index(index, list.len()).ok_or(CommandError::IndexOutOfRange)?;
    list[index] = value;
    item.mark_updated();
    Ok(RespValue::ok().into())
}

pub fn ltrim(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let (start, stop) = (args[1].int()?, args[2].int()?);
    let item = ctx.item(&args[0])?;
    if !item.exists() {
        return Ok(RespValue::ok().into());
    }

    let list = item.as_list()?;
    let length = list.len();
    let start = slice_bound(start, length);
    let stop = if stop == -1 {
        length
    } else {
        slice_bound(stop.saturating_add(1), length)
    };
    if stop.saturating_sub(start) != length {
        let kept: VecDeque<Bytes> = if start < stop {
            list.range(start..stop).cloned().collect()
        } else {
            VecDeque::new()
        };
        item.update(Value::List(kept));
    }
    Ok(RespValue::ok().into())
}

pub fn rpoplpush(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let (source, destination) = (args[0].key()?, args[1].key()?);

    let source = ctx.items.get_mut(source);
    let Some(element) = source.as_list()?.pop_back() else {
        return Ok(RespValue::Null.into());
    };
    source.mark_updated();

    let destination = ctx.items.get_mut(destination);
    destination.as_list()?.push_front(element.clone());
    destination.mark_updated();
    Ok(RespValue::BulkString(element).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_index() {
        let test_cases = vec![
            ((0, 3), Some(0)),
            ((2, 3), Some(2)),
            ((3, 3), None),
            ((-1, 3), Some(2)),
            ((-3, 3), Some(0)),
            ((-4, 3), None),
            ((0, 0), None),
        ];

        for ((index, length), expected) in test_cases {
            assert_eq!(list_index(index, length), expected, "index {} of {}", index, length);
        }
    }

    #[test]
    fn test_slice_bound() {
        assert_eq!(slice_bound(1, 5), 1);
        assert_eq!(slice_bound(9, 5), 5);
        assert_eq!(slice_bound(-2, 5), 3);
        assert_eq!(slice_bound(-9, 5), 0);
    }
}
