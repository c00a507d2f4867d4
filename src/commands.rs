use thiserror::Error;
use tracing::trace;

use crate::bitset::Bitset;
use crate::keyspace::{Entry, KeySpace, WrongType};
use crate::node::SetOp;

//-------------------------------------

/// RESP-shaped replies; the host encodes these onto the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    Ok,
    Integer(i64),
    Bulk(String),
    Array(Vec<Reply>),
    Nil,
}

/// Client errors.  The display strings are the wire-level error replies;
/// tests match on their fragments.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum CmdError {
    #[error("ERR invalid element value")]
    InvalidElement,

    #[error("ERR bit offset is not an integer or out of range")]
    BadOffset,

    #[error("ERR bit value must be 0 or 1")]
    BadBit,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR syntax error")]
    Syntax,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR wrong number of arguments for '{0}' command")]
    Arity(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),
}

impl From<WrongType> for CmdError {
    fn from(_: WrongType) -> Self {
        CmdError::WrongType
    }
}

type CmdResult = Result<Reply, CmdError>;

//-------------------------------------

#[derive(Copy, Clone, Eq, PartialEq)]
enum RangeUnit {
    Bit,
    Byte,
}

fn parse_element(s: &str) -> Result<u64, CmdError> {
    match s.parse::<i64>() {
        Ok(v) if v >= 0 => Ok(v as u64),
        _ => Err(CmdError::InvalidElement),
    }
}

fn parse_elements(args: &[&str]) -> Result<Vec<u64>, CmdError> {
    args.iter().map(|s| parse_element(s)).collect()
}

fn parse_offset(s: &str) -> Result<u64, CmdError> {
    match s.parse::<i64>() {
        Ok(v) if v >= 0 => Ok(v as u64),
        _ => Err(CmdError::BadOffset),
    }
}

fn parse_index(s: &str) -> Result<i64, CmdError> {
    s.parse::<i64>().map_err(|_| CmdError::NotAnInteger)
}

fn parse_unit(s: &str) -> Result<RangeUnit, CmdError> {
    if s.eq_ignore_ascii_case("bit") {
        Ok(RangeUnit::Bit)
    } else if s.eq_ignore_ascii_case("byte") {
        Ok(RangeUnit::Byte)
    } else {
        Err(CmdError::Syntax)
    }
}

fn parse_setop(s: &str) -> Result<SetOp, CmdError> {
    if s.eq_ignore_ascii_case("or") {
        Ok(SetOp::Or)
    } else if s.eq_ignore_ascii_case("and") {
        Ok(SetOp::And)
    } else if s.eq_ignore_ascii_case("xor") {
        Ok(SetOp::Xor)
    } else {
        Err(CmdError::Syntax)
    }
}

//-------------------------------------

/// Resolves a COUNT range to inclusive bit bounds.  A negative start
/// clamps to zero; a negative end counts back from the last set bit.
/// Returns None when the range is empty.
fn count_bounds(max: u64, start: i64, end: i64, unit: RangeUnit) -> Option<(u64, u64)> {
    let total: i128 = match unit {
        RangeUnit::Bit => max as i128 + 1,
        RangeUnit::Byte => (max / 8) as i128 + 1,
    };

    let s = if start < 0 { 0 } else { start as i128 };
    let e = if end < 0 { total + end as i128 } else { end as i128 };
    if e < 0 || s > e {
        return None;
    }

    to_bit_bounds(s, e, unit)
}

/// Resolves a POS range to inclusive bit bounds.  Both ends count back
/// from the last set bit when negative.
fn pos_bounds(max: u64, start: i64, end: i64, unit: RangeUnit) -> Option<(u64, u64)> {
    let total: i128 = match unit {
        RangeUnit::Bit => max as i128 + 1,
        RangeUnit::Byte => (max / 8) as i128 + 1,
    };

    let s = if start < 0 {
        (total + start as i128).max(0)
    } else {
        start as i128
    };
    let e = if end < 0 { total + end as i128 } else { end as i128 };
    if e < 0 || s > e {
        return None;
    }

    to_bit_bounds(s, e, unit)
}

fn to_bit_bounds(s: i128, e: i128, unit: RangeUnit) -> Option<(u64, u64)> {
    let cap = u64::MAX as i128;
    match unit {
        RangeUnit::Bit => Some((s.min(cap) as u64, e.min(cap) as u64)),
        RangeUnit::Byte => Some(((s * 8).min(cap) as u64, (e * 8 + 7).min(cap) as u64)),
    }
}

//-------------------------------------

/// Parses and executes one command.  `args[0]` is the command name,
/// matched case-insensitively.  Nothing is mutated on any error path.
pub fn dispatch(ks: &mut KeySpace, args: &[&str]) -> CmdResult {
    let Some(&name) = args.first() else {
        return Err(CmdError::Syntax);
    };
    let cmd = name.to_ascii_lowercase();
    let tail = &args[1..];
    trace!(cmd = %cmd, nr_args = tail.len(), "dispatch");

    match cmd.as_str() {
        "bits.insert" => cmd_insert(ks, &cmd, tail),
        "bits.remove" => cmd_remove(ks, &cmd, tail),
        "bits.get" | "bits.contains" => cmd_get(ks, &cmd, tail),
        "bits.set" => cmd_set(ks, &cmd, tail),
        "bits.count" => cmd_count(ks, &cmd, tail),
        "bits.size" => cmd_size(ks, &cmd, tail),
        "bits.clear" => cmd_clear(ks, &cmd, tail),
        "bits.min" => cmd_extreme(ks, &cmd, tail, true),
        "bits.max" => cmd_extreme(ks, &cmd, tail, false),
        "bits.successor" => cmd_adjacent(ks, &cmd, tail, true),
        "bits.predecessor" => cmd_adjacent(ks, &cmd, tail, false),
        "bits.toarray" => cmd_toarray(ks, &cmd, tail),
        "bits.pos" => cmd_pos(ks, &cmd, tail),
        "bits.op" => cmd_op(ks, &cmd, tail),
        "bits.info" => cmd_info(ks, &cmd, tail),
        _ => Err(CmdError::UnknownCommand(name.to_string())),
    }
}

fn arity(ok: bool, cmd: &str) -> Result<(), CmdError> {
    if ok {
        Ok(())
    } else {
        Err(CmdError::Arity(cmd.to_string()))
    }
}

fn cmd_insert(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    arity(tail.len() >= 2, cmd)?;
    let elems = parse_elements(&tail[1..])?;
    let b = ks.bits_entry(tail[0])?;
    let added = elems.into_iter().filter(|&x| b.insert(x)).count();
    Ok(Reply::Integer(added as i64))
}

fn cmd_remove(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    arity(tail.len() >= 2, cmd)?;
    let elems = parse_elements(&tail[1..])?;
    match ks.bits_mut(tail[0])? {
        Some(b) => {
            let removed = elems.into_iter().filter(|&x| b.remove(x)).count();
            Ok(Reply::Integer(removed as i64))
        }
        None => Ok(Reply::Integer(0)),
    }
}

fn cmd_get(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    arity(tail.len() == 2, cmd)?;
    let x = parse_offset(tail[1])?;
    let present = ks.bits(tail[0])?.is_some_and(|b| b.contains(x));
    Ok(Reply::Integer(present as i64))
}

fn cmd_set(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    arity(tail.len() == 3, cmd)?;
    let x = parse_offset(tail[1])?;
    let bit = match tail[2].parse::<i64>() {
        Ok(0) => false,
        Ok(1) => true,
        _ => return Err(CmdError::BadBit),
    };

    match ks.bits_mut(tail[0])? {
        Some(b) => Ok(Reply::Integer(b.set(x, bit) as i64)),
        None => {
            // setting a bit on an absent key creates it; clearing one
            // stays a no-op
            if bit {
                ks.bits_entry(tail[0])?.insert(x);
            }
            Ok(Reply::Integer(0))
        }
    }
}

fn cmd_count(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    let (start, end, unit) = match tail.len() {
        1 => {
            let n = ks.bits(tail[0])?.map_or(0, |b| b.count());
            return Ok(Reply::Integer(n as i64));
        }
        3 => (parse_index(tail[1])?, parse_index(tail[2])?, RangeUnit::Bit),
        4 => (
            parse_index(tail[1])?,
            parse_index(tail[2])?,
            parse_unit(tail[3])?,
        ),
        _ => return Err(CmdError::Arity(cmd.to_string())),
    };

    let n = match ks.bits(tail[0])? {
        None => 0,
        Some(b) => match b.max() {
            None => 0,
            Some(max) => match count_bounds(max, start, end, unit) {
                Some((lo, hi)) => b.count_range(lo, hi),
                None => 0,
            },
        },
    };
    Ok(Reply::Integer(n as i64))
}

fn cmd_size(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    arity(tail.len() == 1, cmd)?;
    let n = ks.bits(tail[0])?.map_or(0, |b| b.count());
    Ok(Reply::Integer(n as i64))
}

fn cmd_clear(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    arity(tail.len() == 1, cmd)?;
    if let Some(b) = ks.bits_mut(tail[0])? {
        b.clear();
    }
    Ok(Reply::Ok)
}

fn cmd_extreme(ks: &mut KeySpace, cmd: &str, tail: &[&str], min: bool) -> CmdResult {
    arity(tail.len() == 1, cmd)?;
    let found = ks
        .bits(tail[0])?
        .and_then(|b| if min { b.min() } else { b.max() });
    Ok(found.map_or(Reply::Nil, |x| Reply::Integer(x as i64)))
}

fn cmd_adjacent(ks: &mut KeySpace, cmd: &str, tail: &[&str], forward: bool) -> CmdResult {
    arity(tail.len() == 2, cmd)?;
    let x = parse_element(tail[1])?;
    let found = ks.bits(tail[0])?.and_then(|b| {
        if forward {
            b.successor(x)
        } else {
            b.predecessor(x)
        }
    });
    Ok(found.map_or(Reply::Nil, |v| Reply::Integer(v as i64)))
}

fn cmd_toarray(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    arity(tail.len() == 1, cmd)?;
    let vals = ks.bits(tail[0])?.map_or_else(Vec::new, |b| b.to_vec());
    Ok(Reply::Array(
        vals.into_iter().map(|x| Reply::Integer(x as i64)).collect(),
    ))
}

fn cmd_pos(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    let range = match tail.len() {
        2 => None,
        4 => Some((parse_index(tail[2])?, parse_index(tail[3])?, RangeUnit::Bit)),
        5 => Some((
            parse_index(tail[2])?,
            parse_index(tail[3])?,
            parse_unit(tail[4])?,
        )),
        _ => return Err(CmdError::Arity(cmd.to_string())),
    };

    let bit = match tail[1].parse::<i64>() {
        Ok(0) => false,
        Ok(1) => true,
        _ => return Err(CmdError::BadBit),
    };

    let Some(b) = ks.bits(tail[0])? else {
        return Ok(Reply::Integer(if bit { -1 } else { 0 }));
    };
    let Some(max) = b.max() else {
        return Ok(Reply::Integer(if bit { -1 } else { 0 }));
    };

    let bounds = match range {
        // a plain search runs from zero to the last set bit; unset bits
        // past the max qualify for a zero search
        None => Some((0, if bit { max } else { max + 1 })),
        Some((s, e, unit)) => pos_bounds(max, s, e, unit),
    };

    let found = bounds.and_then(|(lo, hi)| b.position(bit, lo, hi));
    Ok(Reply::Integer(found.map_or(-1, |p| p as i64)))
}

fn cmd_op(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    arity(tail.len() >= 3, cmd)?;
    let op = parse_setop(tail[0])?;
    let dest = tail[1];

    let result = {
        let empty = Bitset::new();
        let mut srcs = Vec::with_capacity(tail.len() - 2);
        for &key in &tail[2..] {
            srcs.push(ks.bits(key)?.unwrap_or(&empty));
        }
        Bitset::combine(op, &srcs)
    };

    // byte-size convention: floor(max / 8) + 1, or 0 for an empty result
    match result.max() {
        None => {
            ks.delete(dest);
            Ok(Reply::Integer(0))
        }
        Some(max) => {
            ks.put_bits(dest, result);
            Ok(Reply::Integer((max / 8 + 1) as i64))
        }
    }
}

fn cmd_info(ks: &mut KeySpace, cmd: &str, tail: &[&str]) -> CmdResult {
    arity(tail.len() == 1, cmd)?;
    let b = match ks.entry(tail[0]) {
        None => return Err(CmdError::NoSuchKey),
        Some(Entry::Raw(_)) => return Err(CmdError::WrongType),
        Some(Entry::Bits(b)) => b,
    };

    let fields = [
        ("size", Reply::Integer(b.count() as i64)),
        (
            "universe_size",
            Reply::Integer(b.universe_size().min(i64::MAX as u64) as i64),
        ),
        ("allocated_memory", Reply::Integer(b.mem_used() as i64)),
        ("total_clusters", Reply::Integer(b.resident_clusters() as i64)),
        ("max_depth", Reply::Integer(b.max_depth() as i64)),
        ("hash_table", Reply::Bulk("unordered (std HashMap)".to_string())),
    ];

    let mut out = Vec::with_capacity(fields.len() * 2);
    for (name, value) in fields {
        out.push(Reply::Bulk(name.to_string()));
        out.push(value);
    }
    Ok(Reply::Array(out))
}

//-------------------------------------


//-------------------------------------
