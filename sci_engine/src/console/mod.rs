//! Line-oriented debug console.
//!
//! A line holds `;`-separated commands; tokens split on spaces, `"` groups
//! and `\` escapes the next character. Every command declares its
//! parameters as a string over `i` (int), `h` (hex byte), `a` (address),
//! `s` (string) and `r` (reserved, passed as a string), optionally ending
//! in `*` (zero or more of the last type) and optionally starting with `!`
//! (needs a live execution state).

mod address;
mod commands;

use std::collections::BTreeMap;
use std::str::FromStr;

use sci_formats::ResourceDir;
use thiserror::Error;

pub use address::{parse_address, AddressError};

use crate::error::VmError;
use crate::heap::SegManager;
use crate::reg::Reg;
use crate::state::ExecutionState;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("unbalanced quotes")]
    UnbalancedQuotes,
    #[error("{0}: not found")]
    UnknownCommand(String),
    #[error("{command}: needs more than {given} parameters")]
    TooFewParameters { command: String, given: usize },
    #[error("{command}: too many parameters")]
    TooManyParameters { command: String },
    #[error("{command}: '{value}' is not an int")]
    NotAnInt { command: String, value: String },
    #[error("{command}: '{value}' is not a hex number")]
    NotHex { command: String, value: String },
    #[error("{command}: '{value}' is not an address or object: {source}")]
    NotAnAddress {
        command: String,
        value: String,
        #[source]
        source: AddressError,
    },
    #[error("{command}: needs a live execution state")]
    NeedsState { command: String },
    #[error("invalid parameter spec '{0}'")]
    InvalidSpec(String),
    #[error("{command}: {message}")]
    Failed { command: String, message: String },
    #[error(transparent)]
    Vm(#[from] VmError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    HexByte,
    Address,
    Str,
    Reserved,
}

impl ParamKind {
    fn label(self) -> &'static str {
        match self {
            ParamKind::Int => "(int)",
            ParamKind::HexByte => "(hexbyte)",
            ParamKind::Address => "(addr)",
            ParamKind::Str => "(string)",
            ParamKind::Reserved => "(reserved)",
        }
    }
}

/// Parsed parameter-type string such as `"shh*"` or `"!a"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub needs_state: bool,
    pub kinds: Vec<ParamKind>,
    /// The last kind may repeat zero or more times.
    pub repeat_last: bool,
}

impl ParamSpec {
    pub fn min_params(&self) -> usize {
        if self.repeat_last {
            self.kinds.len() - 1
        } else {
            self.kinds.len()
        }
    }

    pub fn max_params(&self) -> Option<usize> {
        (!self.repeat_last).then_some(self.kinds.len())
    }

    fn kind_at(&self, index: usize) -> Option<ParamKind> {
        match self.kinds.get(index) {
            Some(kind) => Some(*kind),
            None if self.repeat_last => self.kinds.last().copied(),
            None => None,
        }
    }

    pub fn synopsis(&self) -> String {
        let mut out: String = self.kinds.iter().map(|kind| format!(" {}", kind.label())).collect();
        if self.repeat_last {
            out.push('*');
        }
        out
    }
}

impl FromStr for ParamSpec {
    type Err = ConsoleError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || ConsoleError::InvalidSpec(spec.to_string());
        let (needs_state, body) = match spec.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        let (repeat_last, body) = match body.strip_suffix('*') {
            Some(rest) if !rest.is_empty() => (true, rest),
            Some(_) => return Err(invalid()),
            None => (false, body),
        };
        let kinds = body
            .chars()
            .map(|c| match c {
                'i' => Ok(ParamKind::Int),
                'h' => Ok(ParamKind::HexByte),
                'a' => Ok(ParamKind::Address),
                's' => Ok(ParamKind::Str),
                'r' => Ok(ParamKind::Reserved),
                _ => Err(invalid()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ParamSpec {
            needs_state,
            kinds,
            repeat_last,
        })
    }
}

/// A parameter converted according to its declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Int(i64),
    Hex(u8),
    Addr(Reg),
    Str(String),
}

impl Param {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Param::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_hex(&self) -> Option<u8> {
        match self {
            Param::Hex(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_addr(&self) -> Option<Reg> {
        match self {
            Param::Addr(reg) => Some(*reg),
            _ => None,
        }
    }
}

/// What the console can see while it runs between interpreter steps.
pub struct ConsoleContext<'a> {
    pub heap: &'a SegManager,
    pub state: Option<&'a ExecutionState>,
    pub resources: Option<&'a ResourceDir>,
}

impl<'a> ConsoleContext<'a> {
    pub fn new(heap: &'a SegManager) -> Self {
        ConsoleContext {
            heap,
            state: None,
            resources: None,
        }
    }
}

pub type Handler =
    fn(&mut Console, &ConsoleContext<'_>, &[Param]) -> Result<Vec<String>, ConsoleError>;

#[derive(Clone)]
pub struct Command {
    pub spec: ParamSpec,
    pub description: String,
    handler: Handler,
}

#[derive(Debug, Clone)]
pub struct ConsoleVar {
    pub value: i64,
    pub description: String,
}

/// Registered commands, integer variables and documentation pages, each
/// kept sorted by name.
pub struct Console {
    commands: BTreeMap<String, Command>,
    vars: BTreeMap<String, ConsoleVar>,
    pages: BTreeMap<String, String>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// A console with the built-in commands and pages registered.
    pub fn new() -> Self {
        let mut console = Console::empty();
        commands::register_builtins(&mut console);
        console
    }

    pub fn empty() -> Self {
        Console {
            commands: BTreeMap::new(),
            vars: BTreeMap::new(),
            pages: BTreeMap::new(),
        }
    }

    pub fn register_command(
        &mut self,
        name: &str,
        spec: &str,
        description: &str,
        handler: Handler,
    ) -> Result<(), ConsoleError> {
        let spec = spec.parse()?;
        self.commands.insert(
            name.to_string(),
            Command {
                spec,
                description: description.to_string(),
                handler,
            },
        );
        Ok(())
    }

    pub fn register_var(&mut self, name: &str, value: i64, description: &str) {
        self.vars.insert(
            name.to_string(),
            ConsoleVar {
                value,
                description: description.to_string(),
            },
        );
    }

    pub fn register_page(&mut self, name: &str, body: &str) {
        self.pages.insert(name.to_string(), body.to_string());
    }

    pub fn var(&self, name: &str) -> Option<i64> {
        self.vars.get(name).map(|var| var.value)
    }

    /// Updates an existing variable; unknown names are left unregistered.
    pub fn set_var(&mut self, name: &str, value: i64) -> bool {
        match self.vars.get_mut(name) {
            Some(var) => {
                var.value = value;
                true
            }
            None => false,
        }
    }

    pub fn commands(&self) -> impl Iterator<Item = (&str, &Command)> {
        self.commands.iter().map(|(name, cmd)| (name.as_str(), cmd))
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &ConsoleVar)> {
        self.vars.iter().map(|(name, var)| (name.as_str(), var))
    }

    pub fn pages(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pages
            .iter()
            .map(|(name, body)| (name.as_str(), body.as_str()))
    }

    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn page(&self, name: &str) -> Option<&str> {
        self.pages.get(name).map(String::as_str)
    }

    /// Runs every command on `line` and returns the printed report lines.
    /// A failing command reports its error and the rest of the line still
    /// runs; unbalanced quotes reject the whole line.
    pub fn execute(&mut self, line: &str, ctx: &ConsoleContext<'_>) -> Vec<String> {
        let statements = match tokenize(line) {
            Ok(statements) => statements,
            Err(err) => return vec![err.to_string()],
        };
        let mut output = Vec::new();
        for tokens in statements {
            let Some((name, args)) = tokens.split_first() else {
                continue;
            };
            match self.run(name, args, ctx) {
                Ok(lines) => output.extend(lines),
                Err(err) => {
                    log::debug!("console command '{name}' failed: {err}");
                    output.push(err.to_string());
                }
            }
        }
        output
    }

    fn run(
        &mut self,
        name: &str,
        args: &[String],
        ctx: &ConsoleContext<'_>,
    ) -> Result<Vec<String>, ConsoleError> {
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| ConsoleError::UnknownCommand(name.to_string()))?;
        let spec = command.spec.clone();
        let handler = command.handler;

        if args.len() < spec.min_params() {
            return Err(ConsoleError::TooFewParameters {
                command: name.to_string(),
                given: args.len(),
            });
        }
        if spec.max_params().is_some_and(|max| args.len() > max) {
            return Err(ConsoleError::TooManyParameters {
                command: name.to_string(),
            });
        }
        if spec.needs_state && ctx.state.is_none() {
            return Err(ConsoleError::NeedsState {
                command: name.to_string(),
            });
        }

        let params = args
            .iter()
            .enumerate()
            .map(|(index, arg)| convert_param(name, &spec, index, arg, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        handler(self, ctx, &params)
    }
}

fn convert_param(
    command: &str,
    spec: &ParamSpec,
    index: usize,
    arg: &str,
    ctx: &ConsoleContext<'_>,
) -> Result<Param, ConsoleError> {
    let kind = spec
        .kind_at(index)
        .ok_or_else(|| ConsoleError::TooManyParameters {
            command: command.to_string(),
        })?;
    match kind {
        ParamKind::Int => parse_int(arg).map(Param::Int).ok_or_else(|| ConsoleError::NotAnInt {
            command: command.to_string(),
            value: arg.to_string(),
        }),
        ParamKind::HexByte => {
            let digits = arg
                .strip_prefix("0x")
                .or_else(|| arg.strip_prefix("0X"))
                .unwrap_or(arg);
            // Wider values are clipped to the low byte.
            u32::from_str_radix(digits, 16)
                .map(|value| Param::Hex((value & 0xff) as u8))
                .map_err(|_| ConsoleError::NotHex {
                    command: command.to_string(),
                    value: arg.to_string(),
                })
        }
        ParamKind::Address => parse_address(arg, ctx.heap, ctx.state)
            .map(Param::Addr)
            .map_err(|source| ConsoleError::NotAnAddress {
                command: command.to_string(),
                value: arg.to_string(),
                source,
            }),
        ParamKind::Str | ParamKind::Reserved => Ok(Param::Str(arg.to_string())),
    }
}

/// Integers in C notation: decimal, `0x` hex or leading-zero octal.
pub fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Splits a console line into statements of tokens.
pub fn tokenize(line: &str) -> Result<Vec<Vec<String>>, ConsoleError> {
    let mut statements = Vec::new();
    let mut tokens: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    let mut quoted = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.get_or_insert_with(String::new).push(next);
                }
            }
            '"' => {
                quoted = !quoted;
                current.get_or_insert_with(String::new);
            }
            ' ' | '\t' if !quoted => tokens.extend(current.take()),
            ';' if !quoted => {
                tokens.extend(current.take());
                statements.push(std::mem::take(&mut tokens));
            }
            _ => current.get_or_insert_with(String::new).push(c),
        }
    }
    if quoted {
        return Err(ConsoleError::UnbalancedQuotes);
    }
    tokens.extend(current.take());
    statements.push(tokens);
    statements.retain(|statement| !statement.is_empty());
    Ok(statements)
}
