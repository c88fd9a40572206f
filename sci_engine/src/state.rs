use serde::{Deserialize, Serialize};

use crate::reg::Reg;

/// Registers of a paused interpreter, as seen by the console.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub acc: Reg,
    pub prev: Reg,
    /// Program counter of the innermost frame.
    pub pc: Reg,
    /// Object the innermost frame is executing for.
    pub obj: Reg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Acc,
    Prev,
    Pc,
    Obj,
}

impl Register {
    pub fn name(self) -> &'static str {
        match self {
            Register::Acc => "ACC",
            Register::Prev => "PREV",
            Register::Pc => "PC",
            Register::Obj => "OBJ",
        }
    }

    /// Accepts the full names and the one-letter abbreviations, in any case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ACC" | "A" => Some(Register::Acc),
            "PREV" => Some(Register::Prev),
            "PC" | "P" => Some(Register::Pc),
            "OBJ" | "O" => Some(Register::Obj),
            _ => None,
        }
    }
}

impl ExecutionState {
    pub fn register(&self, register: Register) -> Reg {
        match register {
            Register::Acc => self.acc,
            Register::Prev => self.prev,
            Register::Pc => self.pc,
            Register::Obj => self.obj,
        }
    }
}
