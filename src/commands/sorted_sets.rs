use std::collections::{HashMap, HashSet};

use bytes::Bytes;

use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        command_item::CommandItem,
        keys::{scan_page, scan_reply, ScanOptions},
        signature::{casematch, decode_float, decode_int, format_float, Arg, FloatOptions},
        CommandError,
    },
    key_value_store::Value,
    resp::RespValue,
    sorted_set::SortedSet,
};

/// Renders members, interleaved with their scores when asked to.
fn scored_reply(items: Vec<(Bytes, f64)>, with_scores: bool) -> RespValue {
    let mut reply = Vec::with_capacity(items.len() * if with_scores { 2 } else { 1 });
    for (member, score) in items {
        reply.push(RespValue::BulkString(member));
        if with_scores {
            reply.push(RespValue::bulk(format_float(score)));
        }
    }
    RespValue::Array(reply)
}

/// Applies a `LIMIT offset count` window. Any negative offset skips
/// everything and a negative count means no limit.
fn limit<T>(items: Vec<T>, offset: i64, count: i64) -> Vec<T> {
    if offset < 0 {
        return Vec::new();
    }
    let remaining = items
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX));
    match usize::try_from(count) {
        Ok(count) => remaining.take(count).collect(),
        Err(_) => remaining.collect(),
    }
}

fn increment(item: &mut CommandItem, member: Bytes, amount: f64) -> Result<RespValue, CommandError> {
    let zset = item.as_zset()?;
    let score = match zset.score(&member) {
        Some(current) => current + amount,
        None => amount,
    };
    if score.is_nan() {
        return Err(CommandError::ScoreIsNaN);
    }
    zset.add(member, score);
    item.mark_updated();
    Ok(RespValue::bulk(format_float(score)))
}

#[derive(Debug, Default)]
struct ZAddFlags {
    ch: bool,
    nx: bool,
    xx: bool,
    incr: bool,
}

/// ZADD takes its flags first; the first argument that is not a flag starts
/// the score/member pairs.
pub fn zadd(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let mut flags = ZAddFlags::default();
    let mut start = 1;
    while let Some(arg) = args.get(start) {
        let arg = arg.bytes()?;
        if casematch(arg, "ch") {
            flags.ch = true;
        } else if casematch(arg, "nx") {
            flags.nx = true;
        } else if casematch(arg, "xx") {
            flags.xx = true;
        } else if casematch(arg, "incr") {
            flags.incr = true;
        } else {
            break;
        }
        start += 1;
    }

    if flags.nx && flags.xx {
        return Err(CommandError::ZAddNxAndXx);
    }
    let elements = &args[start..];
    if elements.is_empty() || elements.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    if flags.incr && elements.len() != 2 {
        return Err(CommandError::ZAddIncrPairs);
    }

    let mut pairs = Vec::with_capacity(elements.len() / 2);
    for pair in elements.chunks(2) {
        let score = decode_float(pair[0].bytes()?, FloatOptions::default())?;
        pairs.push((score, pair[1].bytes()?.clone()));
    }

    let item = ctx.item(&args[0])?;
    if flags.incr {
        let (amount, member) = pairs.swap_remove(0);
        let present = item.as_zset()?.contains(&member);
        if (flags.nx && present) || (flags.xx && !present) {
            return Ok(RespValue::Null.into());
        }
        return Ok(increment(item, member, amount)?.into());
    }

    let zset = item.as_zset()?;
    let old_length = zset.len();
    let mut changed = 0;
    for (score, member) in pairs {
        let current = zset.score(&member);
        if (flags.nx && current.is_some()) || (flags.xx && current.is_none()) {
            continue;
        }
        if current != Some(score) {
            zset.add(member, score);
            changed += 1;
        }
    }
    let added = zset.len() - old_length;
    if changed > 0 {
        item.mark_updated();
    }

    let reply = if flags.ch { changed } else { added as i64 };
    Ok(RespValue::Integer(reply).into())
}

pub fn zcard(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let length = ctx.item(&args[0])?.as_zset()?.len();
    Ok(RespValue::Integer(length as i64).into())
}

pub fn zcount(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let (min, max) = (args[1].score()?, args[2].score()?);
    let count = ctx.item(&args[0])?.as_zset()?.count_by_score(&min, &max);
    Ok(RespValue::Integer(count as i64).into())
}

pub fn zincrby(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let amount = args[1].float()?;
    let member = args[2].bytes()?.clone();
    Ok(increment(ctx.item(&args[0])?, member, amount)?.into())
}

pub fn zlexcount(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let (min, max) = (args[1].lex()?.clone(), args[2].lex()?.clone());
    let count = ctx.item(&args[0])?.as_zset()?.lex_count(&min, &max);
    Ok(RespValue::Integer(count as i64).into())
}

fn range_by_rank(ctx: &mut CommandContext<'_>, args: &[Arg], reverse: bool) -> Result<CommandResult, CommandError> {
    let (start, stop) = (args[1].int()?, args[2].int()?);
    let mut with_scores = false;
    for arg in &args[3..] {
        if !casematch(arg.bytes()?, "withscores") {
            return Err(CommandError::Syntax);
        }
        with_scores = true;
    }

    let items = ctx.item(&args[0])?.as_zset()?.range_by_rank(start, stop, reverse);
    Ok(scored_reply(items, with_scores).into())
}

pub fn zrange(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    range_by_rank(ctx, args, false)
}

pub fn zrevrange(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    range_by_rank(ctx, args, true)
}

/// ZRANGEBYLEX and ZREVRANGEBYLEX. The reversed form takes `max` first.
fn range_by_lex(ctx: &mut CommandContext<'_>, args: &[Arg], reverse: bool) -> Result<CommandResult, CommandError> {
    let (first, second) = (args[1].lex()?.clone(), args[2].lex()?.clone());
    let (min, max) = if reverse { (second, first) } else { (first, second) };

    let (offset, count) = match &args[3..] {
        [] => (0, -1),
        [option, offset, count] if casematch(option.bytes()?, "limit") => {
            (decode_int(offset.bytes()?)?, decode_int(count.bytes()?)?)
        }
        _ => return Err(CommandError::Syntax),
    };

    let members = ctx.item(&args[0])?.as_zset()?.range_by_lex(&min, &max, reverse);
    Ok(RespValue::bulk_array(limit(members, offset, count)).into())
}

pub fn zrangebylex(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    range_by_lex(ctx, args, false)
}

pub fn zrevrangebylex(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    range_by_lex(ctx, args, true)
}

/// ZRANGEBYSCORE and ZREVRANGEBYSCORE. The reversed form takes `max` first.
fn range_by_score(ctx: &mut CommandContext<'_>, args: &[Arg], reverse: bool) -> Result<CommandResult, CommandError> {
    let (first, second) = (args[1].score()?, args[2].score()?);
    let (min, max) = if reverse { (second, first) } else { (first, second) };

    let mut with_scores = false;
    let (mut offset, mut count) = (0, -1);
    let options = &args[3..];
    let mut index = 0;
    while index < options.len() {
        let option = options[index].bytes()?;
        if casematch(option, "withscores") {
            with_scores = true;
            index += 1;
        } else if casematch(option, "limit") && index + 2 < options.len() {
            offset = decode_int(options[index + 1].bytes()?)?;
            count = decode_int(options[index + 2].bytes()?)?;
            index += 3;
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let items = ctx.item(&args[0])?.as_zset()?.range_by_score(&min, &max, reverse);
    Ok(scored_reply(limit(items, offset, count), with_scores).into())
}

pub fn zrangebyscore(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    range_by_score(ctx, args, false)
}

pub fn zrevrangebyscore(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    range_by_score(ctx, args, true)
}

pub fn zrank(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let member = args[1].bytes()?;
    let rank = ctx.items.get_mut(args[0].key()?).as_zset()?.rank(member);
    Ok(match rank {
        Some(rank) => RespValue::Integer(rank as i64),
        None => RespValue::Null,
    }
    .into())
}

pub fn zrevrank(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let member = args[1].bytes()?;
    let zset = ctx.items.get_mut(args[0].key()?).as_zset()?;
    Ok(match zset.rank(member) {
        Some(rank) => RespValue::Integer((zset.len() - 1 - rank) as i64),
        None => RespValue::Null,
    }
    .into())
}

fn remove_members<'a>(item: &mut CommandItem, members: impl IntoIterator<Item = &'a [u8]>) -> Result<i64, CommandError> {
    let zset = item.as_zset()?;
    let mut removed = 0;
    for member in members {
        if zset.remove(member) {
            removed += 1;
        }
    }
    if removed > 0 {
        item.mark_updated();
    }
    Ok(removed)
}

pub fn zrem(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let members = args[1..]
        .iter()
        .map(|arg| arg.bytes().map(|member| member.as_ref()))
        .collect::<Result<Vec<&[u8]>, _>>()?;
    let removed = remove_members(ctx.items.get_mut(args[0].key()?), members)?;
    Ok(RespValue::Integer(removed).into())
}

pub fn zremrangebylex(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let (min, max) = (args[1].lex()?.clone(), args[2].lex()?.clone());
    let item = ctx.item(&args[0])?;
    let members = item.as_zset()?.range_by_lex(&min, &max, false);
    let removed = remove_members(item, members.iter().map(|member| member.as_ref()))?;
    Ok(RespValue::Integer(removed).into())
}

pub fn zremrangebyscore(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let (min, max) = (args[1].score()?, args[2].score()?);
    let item = ctx.item(&args[0])?;
    let members = item.as_zset()?.range_by_score(&min, &max, false);
    let removed = remove_members(item, members.iter().map(|(member, _)| member.as_ref()))?;
    Ok(RespValue::Integer(removed).into())
}

pub fn zremrangebyrank(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let (start, stop) = (args[1].int()?, args[2].int()?);
    let item = ctx.item(&args[0])?;
    let members = item.as_zset()?.range_by_rank(start, stop, false);
    let removed = remove_members(item, members.iter().map(|(member, _)| member.as_ref()))?;
    Ok(RespValue::Integer(removed).into())
}

/// ZSCAN walks members in member order and returns member/score pairs.
pub fn zscan(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let cursor = args[1].int()?;
    let options = ScanOptions::parse(&args[2..])?;
    if options.type_name.is_some() {
        return Err(CommandError::Syntax);
    }

    let entries: Vec<(Bytes, f64)> = ctx
        .item(&args[0])?
        .as_zset()?
        .items()
        .map(|(member, score)| (member.clone(), score))
        .collect();
    let (next, page) = scan_page(entries, cursor, options.count, |(member, _)| {
        options.matches(member)
    });
    let flat = page
        .into_iter()
        .flat_map(|(member, score)| [member, Bytes::from(format_float(score))])
        .collect();
    Ok(scan_reply(next, flat).into())
}

pub fn zscore(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let member = args[1].bytes()?;
    let score = ctx.items.get_mut(args[0].key()?).as_zset()?.score(member);
    Ok(RespValue::optional_bulk(score.map(|score| Bytes::from(format_float(score)))).into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Sum,
    Min,
    Max,
}

/// Reads a ZUNIONSTORE/ZINTERSTORE input. Plain sets count as sorted sets
/// where every member scores 1.
fn input_members(value: Option<&Value>) -> Result<Vec<(Bytes, f64)>, CommandError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::ZSet(zset)) => Ok(zset
            .items()
            .map(|(member, score)| (member.clone(), score))
            .collect()),
        Some(Value::Set(set)) => {
            let mut members: Vec<(Bytes, f64)> = set.iter().map(|member| (member.clone(), 1.0)).collect();
            members.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(members)
        }
        Some(value) if value.is_empty_collection() => Ok(Vec::new()),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn union_or_intersection(ctx: &mut CommandContext<'_>, args: &[Arg], union: bool) -> Result<CommandResult, CommandError> {
    let numkeys = args[1].int()?;
    let rest = &args[2..];
    if numkeys < 1 {
        return Err(CommandError::MissingStoreKeys);
    }
    let numkeys = usize::try_from(numkeys).map_err(|_| CommandError::Syntax)?;
    if numkeys > rest.len() {
        return Err(CommandError::Syntax);
    }

    let mut inputs = Vec::with_capacity(numkeys);
    for source in &rest[..numkeys] {
        let handle = ctx.resolve(source.bytes()?);
        inputs.push(input_members(ctx.items.get(handle).value())?);
    }

    let mut weights = vec![1.0; numkeys];
    let mut aggregate = Aggregate::Sum;
    let mut index = numkeys;
    while index < rest.len() {
        let option = rest[index].bytes()?;
        if casematch(option, "weights") && index + numkeys < rest.len() {
            for (weight, arg) in weights.iter_mut().zip(&rest[index + 1..=index + numkeys]) {
                *weight = decode_float(arg.bytes()?, FloatOptions::default())?;
            }
            index += numkeys + 1;
        } else if casematch(option, "aggregate") && index + 1 < rest.len() {
            let name = rest[index + 1].bytes()?;
            aggregate = if casematch(name, "sum") {
                Aggregate::Sum
            } else if casematch(name, "min") {
                Aggregate::Min
            } else if casematch(name, "max") {
                Aggregate::Max
            } else {
                return Err(CommandError::Syntax);
            };
            index += 2;
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let mut members: HashSet<Bytes> = inputs[0].iter().map(|(member, _)| member.clone()).collect();
    for input in &inputs[1..] {
        let other: HashSet<&Bytes> = input.iter().map(|(member, _)| member).collect();
        if union {
            members.extend(other.into_iter().cloned());
        } else {
            members.retain(|member| other.contains(member));
        }
    }

    // Smaller inputs are folded in first, which fixes the order of the
    // floating point additions.
    let mut weighted: Vec<(Vec<(Bytes, f64)>, f64)> = inputs.into_iter().zip(weights).collect();
    weighted.sort_by_key(|(input, _)| input.len());

    let mut scores: HashMap<Bytes, f64> = HashMap::new();
    for (input, weight) in weighted {
        for (member, score) in input {
            let mut score = score * weight;
            if union && score.is_nan() {
                score = 0.0;
            }
            if !members.contains(&member) {
                continue;
            }
            if let Some(old) = scores.get(&member) {
                score = match aggregate {
                    Aggregate::Sum => score + old,
                    Aggregate::Min => old.min(score),
                    Aggregate::Max => old.max(score),
                };
            }
            if score.is_nan() {
                score = 0.0;
            }
            scores.insert(member, score);
        }
    }

    let mut result = SortedSet::new();
    for (member, score) in scores {
        result.add(member, score);
    }
    let length = result.len();
    ctx.item(&args[0])?.set_value(Value::ZSet(result));
    Ok(RespValue::Integer(length as i64).into())
}

pub fn zunionstore(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    union_or_intersection(ctx, args, true)
}

pub fn zinterstore(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    union_or_intersection(ctx, args, false)
}
