use std::cmp::Ordering;

use bytes::{Bytes, BytesMut};
use rand::seq::IndexedRandom;

use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        command_item::CommandItem,
        signature::{casematch, decode_int, decode_sort_float, Arg},
        CommandError,
    },
    glob::GlobPattern,
    key_value_store::{Item, Value},
    resp::RespValue,
};

pub fn del(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let mut deleted = 0;
    for arg in args {
        let item = ctx.item(arg)?;
        if item.exists() {
            item.delete();
            deleted += 1;
        }
    }
    Ok(RespValue::Integer(deleted).into())
}

/// Counts every argument naming an existing key, repeats included.
pub fn exists(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let mut found = 0;
    for arg in args {
        if ctx.item(arg)?.exists() {
            found += 1;
        }
    }
    Ok(RespValue::Integer(found).into())
}

fn set_expiry(item: &mut CommandItem, expire_at: f64) -> RespValue {
    if !item.exists() {
        return RespValue::Integer(0);
    }
    item.set_expire_at(Some(expire_at));
    RespValue::Integer(1)
}

pub fn expire(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let expire_at = ctx.now() + args[1].int()? as f64;
    Ok(set_expiry(ctx.item(&args[0])?, expire_at).into())
}

pub fn expireat(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let expire_at = args[1].int()? as f64;
    Ok(set_expiry(ctx.item(&args[0])?, expire_at).into())
}

pub fn pexpire(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let expire_at = ctx.now() + args[1].int()? as f64 / 1000.0;
    Ok(set_expiry(ctx.item(&args[0])?, expire_at).into())
}

pub fn pexpireat(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let expire_at = args[1].int()? as f64 / 1000.0;
    Ok(set_expiry(ctx.item(&args[0])?, expire_at).into())
}

/// Remaining time to live scaled by `scale`: -2 for a missing key, -1 for a
/// key without expiry.
fn time_to_live(ctx: &mut CommandContext<'_>, arg: &Arg, scale: f64) -> Result<CommandResult, CommandError> {
    let now = ctx.now();
    let item = ctx.item(arg)?;
    let ttl = match (item.exists(), item.expire_at()) {
        (false, _) => -2,
        (true, None) => -1,
        (true, Some(expire_at)) => remaining(expire_at, now, scale),
    };
    Ok(RespValue::Integer(ttl).into())
}

/// Rounds halfway cases to even, so 2.5 seconds left reads as 2.
fn remaining(expire_at: f64, now: f64, scale: f64) -> i64 {
    ((expire_at - now) * scale).round_ties_even() as i64
}

pub fn ttl(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    time_to_live(ctx, &args[0], 1.0)
}

pub fn pttl(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    time_to_live(ctx, &args[0], 1000.0)
}

pub fn key_type(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let name = ctx
        .item(&args[0])?
        .kind()
        .map(|kind| kind.type_name())
        .unwrap_or("none");
    Ok(RespValue::SimpleString(name.to_string()).into())
}

pub fn persist(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let item = ctx.item(&args[0])?;
    if !item.exists() || item.expire_at().is_none() {
        return Ok(RespValue::Integer(0).into());
    }
    item.set_expire_at(None);
    Ok(RespValue::Integer(1).into())
}

pub fn keys(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let pattern = GlobPattern::compile(args[0].bytes()?)?;
    let keys = ctx
        .db()
        .iter_keys()
        .into_iter()
        .filter(|key| pattern.matches(key));
    Ok(RespValue::bulk_array(keys).into())
}

/// MOVE copies the value and its expiry into another database, then deletes
/// the source. Nothing happens when the target already holds the key.
pub fn move_key(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let target = ctx.database_index(args[1].int()?)?;
    if target == ctx.db_index {
        return Err(CommandError::SameObject);
    }

    let item = ctx.items.get_mut(args[0].key()?);
    let key = item.key().clone();
    if !item.exists() || ctx.state.database(target).contains_key(&key) {
        return Ok(RespValue::Integer(0).into());
    }

    let expire_at = item.expire_at();
    let Some(value) = item.take_value() else {
        return Ok(RespValue::Integer(0).into());
    };
    let database = ctx.state.database(target);
    database.set(key.clone(), Item { value, expire_at });
    let invalidated = database.notify(&key);
    ctx.state.invalidate_watches(invalidated);
    Ok(RespValue::Integer(1).into())
}

pub fn randomkey(ctx: &mut CommandContext<'_>, _: &[Arg]) -> Result<CommandResult, CommandError> {
    let keys = ctx.db().iter_keys();
    let key = keys.choose(&mut rand::rng()).cloned();
    Ok(RespValue::optional_bulk(key).into())
}

fn rename_items(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<(), CommandError> {
    let (source, target) = (args[0].key()?, args[1].key()?);
    if let Some((source, target)) = ctx.items.pair_mut(source, target) {
        let expire_at = source.expire_at();
        if let Some(value) = source.take_value() {
            target.set_value(value);
            target.set_expire_at(expire_at);
        }
    }
    Ok(())
}

pub fn rename(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    if !ctx.item(&args[0])?.exists() {
        return Err(CommandError::NoSuchKey);
    }
    rename_items(ctx, args)?;
    Ok(RespValue::ok().into())
}

pub fn renamenx(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    if !ctx.item(&args[0])?.exists() {
        return Err(CommandError::NoSuchKey);
    }
    if ctx.item(&args[1])?.exists() {
        return Ok(RespValue::Integer(0).into());
    }
    rename_items(ctx, args)?;
    Ok(RespValue::Integer(1).into())
}

/// Options shared by SCAN, HSCAN, SSCAN and ZSCAN.
#[derive(Debug)]
pub(super) struct ScanOptions {
    pub pattern: Option<GlobPattern>,
    pub count: usize,
    pub type_name: Option<Bytes>,
}

impl ScanOptions {
    /// Parses `MATCH pattern`, `COUNT n` and `TYPE name` pairs.
    pub fn parse(args: &[Arg]) -> Result<Self, CommandError> {
        let mut options = ScanOptions {
            pattern: None,
            count: 10,
            type_name: None,
        };
        for pair in args.chunks(2) {
            let [option, value] = pair else {
                return Err(CommandError::Syntax);
            };
            let (option, value) = (option.bytes()?, value.bytes()?);
            if casematch(option, "match") {
                options.pattern = Some(GlobPattern::compile(value)?);
            } else if casematch(option, "count") {
                options.count = usize::try_from(decode_int(value)?)
                    .ok()
                    .filter(|count| *count > 0)
                    .ok_or(CommandError::Syntax)?;
            } else if casematch(option, "type") {
                options.type_name = Some(value.clone());
            } else {
                return Err(CommandError::Syntax);
            }
        }
        Ok(options)
    }

    pub fn matches(&self, name: &[u8]) -> bool {
        self.pattern
            .as_ref()
            .map_or(true, |pattern| pattern.matches(name))
    }
}

/// Returns one page of `entries`, which must be sorted by name, starting at
/// `cursor`. The next cursor is 0 once the end has been reached.
pub(super) fn scan_page<T>(
    entries: Vec<T>,
    cursor: i64,
    count: usize,
    keep: impl Fn(&T) -> bool,
) -> (usize, Vec<T>) {
    let cursor = usize::try_from(cursor).unwrap_or(0);
    if cursor >= entries.len() {
        return (0, Vec::new());
    }
    let next = cursor.saturating_add(count);
    let next_cursor = if next >= entries.len() { 0 } else { next };
    let page = entries
        .into_iter()
        .skip(cursor)
        .take(count)
        .filter(|entry| keep(entry))
        .collect();
    (next_cursor, page)
}

/// Renders a scan page as `[cursor, [items...]]`.
pub(super) fn scan_reply(cursor: usize, items: Vec<Bytes>) -> RespValue {
    RespValue::Array(vec![
        RespValue::bulk(cursor.to_string()),
        RespValue::bulk_array(items),
    ])
}

pub fn scan(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let options = ScanOptions::parse(&args[1..])?;
    let database = ctx.db();
    let mut keys = database.iter_keys();
    keys.sort();

    let types: Vec<(Bytes, &'static str)> = keys
        .into_iter()
        .map(|key| {
            let type_name = database
                .get(&key)
                .map(|item| item.value.kind().type_name())
                .unwrap_or("none");
            (key, type_name)
        })
        .collect();

    let (cursor, page) = scan_page(types, args[0].int()?, options.count, |(key, type_name)| {
        options.matches(key)
            && options
                .type_name
                .as_ref()
                .map_or(true, |wanted| casematch(wanted, type_name))
    });
    Ok(scan_reply(cursor, page.into_iter().map(|(key, _)| key).collect()).into())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Resolves a SORT `BY`/`GET` pattern for one element: `#` is the element
/// itself, the first `*` is replaced by the element, and a trailing
/// `->field` reads a hash field instead of a string.
fn lookup_key(ctx: &mut CommandContext<'_>, element: &Bytes, pattern: &[u8]) -> Option<Bytes> {
    if pattern == b"#" {
        return Some(element.clone());
    }
    let star = pattern.iter().position(|byte| *byte == b'*')?;
    let (prefix, mut suffix) = (&pattern[..star], &pattern[star + 1..]);

    let mut field = None;
    if suffix.len() > 2 {
        if let Some(arrow) = find(&suffix[..suffix.len() - 1], b"->") {
            field = Some(&suffix[arrow + 2..]);
            suffix = &suffix[..arrow];
        }
    }

    let mut key = BytesMut::with_capacity(prefix.len() + element.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(element);
    key.extend_from_slice(suffix);
    let handle = ctx.resolve(&key.freeze());

    match (ctx.items.get(handle).value(), field) {
        (Some(Value::Hash(hash)), Some(field)) => hash.get(field).cloned(),
        (Some(Value::String(value)), None) => Some(value.clone()),
        _ => None,
    }
}

#[derive(Debug)]
struct SortOptions {
    descending: bool,
    alpha: bool,
    limit: Option<(i64, i64)>,
    store: Option<Bytes>,
    by: Option<Bytes>,
    get: Vec<Bytes>,
}

impl SortOptions {
    fn parse(args: &[Arg]) -> Result<Self, CommandError> {
        let mut options = SortOptions {
            descending: false,
            alpha: false,
            limit: None,
            store: None,
            by: None,
            get: Vec::new(),
        };
        let mut index = 0;
        while index < args.len() {
            let arg = args[index].bytes()?;
            let remaining = args.len() - index - 1;
            if casematch(arg, "asc") {
                options.descending = false;
            } else if casematch(arg, "desc") {
                options.descending = true;
            } else if casematch(arg, "alpha") {
                options.alpha = true;
            } else if casematch(arg, "limit") && remaining >= 2 {
                let offset = decode_int(args[index + 1].bytes()?).map_err(|_| CommandError::Syntax)?;
                let count = decode_int(args[index + 2].bytes()?).map_err(|_| CommandError::Syntax)?;
                options.limit = Some((offset, count));
                index += 2;
            } else if casematch(arg, "store") && remaining >= 1 {
                options.store = Some(args[index + 1].bytes()?.clone());
                index += 1;
            } else if casematch(arg, "by") && remaining >= 1 {
                options.by = Some(args[index + 1].bytes()?.clone());
                index += 1;
            } else if casematch(arg, "get") && remaining >= 1 {
                options.get.push(args[index + 1].bytes()?.clone());
                index += 1;
            } else {
                return Err(CommandError::Syntax);
            }
            index += 1;
        }
        Ok(options)
    }

    /// Half-open slice of `length` elements selected by LIMIT.
    fn window(&self, length: usize) -> (usize, usize) {
        let (offset, count) = self.limit.unwrap_or((0, -1));
        let start = usize::try_from(offset).unwrap_or(0);
        if start >= length {
            return (0, 0);
        }
        let end = match usize::try_from(count) {
            Ok(count) => start.saturating_add(count).min(length),
            Err(_) => length,
        };
        (start, end)
    }
}

#[derive(Debug)]
enum SortKey {
    Alpha(Option<Bytes>),
    Numeric(f64, Bytes),
}

impl SortKey {
    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Alpha(first), SortKey::Alpha(second)) => first.cmp(second),
            (SortKey::Numeric(first, first_element), SortKey::Numeric(second, second_element)) => first
                .total_cmp(second)
                .then_with(|| first_element.cmp(second_element)),
            _ => Ordering::Equal,
        }
    }
}

pub fn sort(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let source = args[0].key()?;
    let elements: Vec<Bytes> = match ctx.items.get(source).value() {
        None => Vec::new(),
        Some(Value::List(list)) => list.iter().cloned().collect(),
        Some(Value::Set(set)) => set.iter().cloned().collect(),
        Some(Value::ZSet(zset)) => zset.iter().map(|(member, _)| member.clone()).collect(),
        Some(_) => return Err(CommandError::WrongType),
    };
    let is_ordered = matches!(
        ctx.items.get(source).value(),
        Some(Value::List(_)) | Some(Value::ZSet(_))
    );
    let options = SortOptions::parse(&args[1..])?;

    // A BY pattern without `*` turns sorting off.
    let sorted = options.by.as_ref().map_or(true, |by| by.contains(&b'*'));
    let by = options.by.clone().unwrap_or_else(|| Bytes::from_static(b"#"));
    let mut elements = elements;
    if sorted {
        let mut keyed = Vec::with_capacity(elements.len());
        for element in elements {
            let value = lookup_key(ctx, &element, &by);
            let key = if options.alpha {
                SortKey::Alpha(value)
            } else {
                let score = match value {
                    Some(value) => decode_sort_float(&value)?,
                    None => 0.0,
                };
                SortKey::Numeric(score, element.clone())
            };
            keyed.push((key, element));
        }
        keyed.sort_by(|(first, _), (second, _)| {
            if options.descending {
                second.compare(first)
            } else {
                first.compare(second)
            }
        });
        elements = keyed.into_iter().map(|(_, element)| element).collect();
    } else if is_ordered && options.descending {
        elements.reverse();
    }

    let (start, end) = options.window(elements.len());
    let get = if options.get.is_empty() {
        vec![Bytes::from_static(b"#")]
    } else {
        options.get.clone()
    };

    let mut rows = Vec::new();
    for element in &elements[start..end] {
        for pattern in &get {
            rows.push(lookup_key(ctx, element, pattern));
        }
    }

    match &options.store {
        Some(store) => {
            let list = rows.into_iter().map(Option::unwrap_or_default).collect();
            let destination = ctx.resolve(store);
            let item = ctx.items.get_mut(destination);
            item.set_value(Value::List(list));
            let stored = item.as_list()?.len();
            Ok(RespValue::Integer(stored as i64).into())
        }
        None => Ok(RespValue::Array(rows.into_iter().map(RespValue::optional_bulk).collect()).into()),
    }
}
