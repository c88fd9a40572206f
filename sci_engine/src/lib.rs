//! Object model, segmented heap and debug console of an SCI-style script
//! interpreter.

pub mod config;
pub mod console;
pub mod error;
pub mod heap;
pub mod object;
pub mod reg;
pub mod selector;
pub mod state;

pub use config::VmConfig;
pub use console::{Console, ConsoleContext, ConsoleError};
pub use error::{VmError, VmResult};
pub use heap::{HeapSnapshot, ScriptLock, ScriptSource, SegManager, Segment, SegmentKind};
pub use object::{Object, ObjectFormat, ObjectState};
pub use reg::{Reg, SegmentId};
pub use selector::SelectorTable;
pub use state::ExecutionState;
