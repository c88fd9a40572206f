use sci_formats::SpanError;
use thiserror::Error;

use crate::reg::Reg;

/// Failures of the heap and object model. All of them mean the loaded data
/// or the configured version is wrong; callers are not expected to keep
/// running against the offending object.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("out-of-bounds read: {0}")]
    OutOfBounds(#[from] SpanError),
    #[error("invalid address {addr}: {reason}")]
    InvalidAddress { addr: Reg, reason: &'static str },
    #[error("unknown selector {0}")]
    UnknownSelector(u16),
    #[error("misaligned relocation at index {index} of block {block_location:#x} in object {object}")]
    RelocationAlignment {
        object: Reg,
        index: i64,
        block_location: u32,
    },
    #[error("property offset {offset:#x} of object {object} is outside its {var_count} variables")]
    PropertyOffset {
        object: Reg,
        offset: i32,
        var_count: usize,
    },
    #[error("class of species {species} (needed by {caller}) is not available")]
    MissingClass { species: u16, caller: Reg },
    #[error("object {object} ({name}) of script {script} has no base object")]
    MissingBaseObject {
        object: Reg,
        name: String,
        script: u16,
    },
    #[error("script {script} could not be loaded: {reason}")]
    ScriptLoad { script: u16, reason: String },
    #[error("no script source is attached to the heap")]
    NoScriptSource,
}

pub type VmResult<T> = Result<T, VmError>;
