//! Address literals accepted by `a` parameters:
//!
//! - `ssss:oooo` segment and offset in hex (a bare `oooo` is a number)
//! - `&scr:oooo` offset within loaded script `scr` (decimal)
//! - `$REG[+-hex]` one of `PC`, `ACC`, `PREV`, `OBJ` (or `P`, `A`, `O`)
//! - `?name[.idx][+-hex]` live object by name, `idx` picking among duplicates

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::heap::SegManager;
use crate::reg::{Reg, SegmentId};
use crate::state::{ExecutionState, Register};

static REGISTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\$(prev|pc|p|acc|a|obj|o)([+-][0-9a-f]+)?$").expect("register literal regex")
});
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^&([0-9]+):([0-9a-f]+)$").expect("script literal regex"));
static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\?([^.+-]+)(?:\.([0-9a-f]+))?([+-][0-9a-f]+)?$").expect("name literal regex")
});
static PLAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:([0-9a-f]+):)?([0-9a-f]+)$").expect("segment literal regex")
});

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("malformed address literal")]
    Malformed,
    #[error("registers need a live execution state")]
    NoState,
    #[error("script {0} is not loaded")]
    ScriptNotLoaded(u16),
    #[error("no object named '{0}'")]
    NoSuchObject(String),
    #[error("object name '{name}' is ambiguous: {}", list_matches(.matches))]
    Ambiguous { name: String, matches: Vec<Reg> },
    #[error("only {found} objects are named '{name}', index {index:#x} is out of range")]
    IndexOutOfRange {
        name: String,
        index: usize,
        found: usize,
    },
}

fn list_matches(matches: &[Reg]) -> String {
    matches
        .iter()
        .enumerate()
        .map(|(index, reg)| format!("{index:x}: [{reg}]"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolves an address literal against the heap and, for registers, the
/// paused execution state.
pub fn parse_address(
    text: &str,
    heap: &SegManager,
    state: Option<&ExecutionState>,
) -> Result<Reg, AddressError> {
    if let Some(caps) = REGISTER_RE.captures(text) {
        let state = state.ok_or(AddressError::NoState)?;
        let register = Register::from_name(&caps[1]).ok_or(AddressError::Malformed)?;
        let base = state.register(register);
        return apply_delta(base, caps.get(2).map(|m| m.as_str()));
    }

    if let Some(caps) = SCRIPT_RE.captures(text) {
        let number: u16 = caps[1].parse().map_err(|_| AddressError::Malformed)?;
        let offset = parse_hex(&caps[2])?;
        let segment = heap
            .script_segment_id(number)
            .ok_or(AddressError::ScriptNotLoaded(number))?;
        return Ok(Reg::new(segment, offset));
    }

    if let Some(caps) = NAME_RE.captures(text) {
        let name = &caps[1];
        let matches = heap.find_objects_by_name(name);
        if matches.is_empty() {
            return Err(AddressError::NoSuchObject(name.to_string()));
        }
        let chosen = match caps.get(2) {
            Some(index) => {
                let index = parse_hex(index.as_str())? as usize;
                *matches.get(index).ok_or_else(|| AddressError::IndexOutOfRange {
                    name: name.to_string(),
                    index,
                    found: matches.len(),
                })?
            }
            None if matches.len() > 1 => {
                return Err(AddressError::Ambiguous {
                    name: name.to_string(),
                    matches,
                })
            }
            None => matches[0],
        };
        return apply_delta(chosen, caps.get(3).map(|m| m.as_str()));
    }

    if let Some(caps) = PLAIN_RE.captures(text) {
        let offset = parse_hex(&caps[2])?;
        let Some(segment) = caps.get(1) else {
            return Ok(Reg::new(SegmentId::NULL, offset));
        };
        let index = u16::try_from(parse_hex(segment.as_str())?).map_err(|_| AddressError::Malformed)?;
        // Unallocated slots still parse; resolving the address reports them.
        let segment = heap.segment_id_at(index).unwrap_or(SegmentId {
            index,
            generation: 0,
        });
        return Ok(Reg::new(segment, offset));
    }

    Err(AddressError::Malformed)
}

fn parse_hex(digits: &str) -> Result<u32, AddressError> {
    u32::from_str_radix(digits, 16).map_err(|_| AddressError::Malformed)
}

fn apply_delta(base: Reg, delta: Option<&str>) -> Result<Reg, AddressError> {
    let Some(delta) = delta else {
        return Ok(base);
    };
    let (sign, digits) = delta.split_at(1);
    let magnitude = i64::from(parse_hex(digits)?);
    let delta = if sign == "-" { -magnitude } else { magnitude };
    Ok(base.with_offset_delta(delta))
}
