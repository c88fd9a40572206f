use sci_formats::{ResourceId, ResourceType};

use super::{Console, ConsoleContext, ConsoleError, Param};
use crate::heap::SegmentRef;
use crate::object::Object;
use crate::reg::Reg;
use crate::state::Register;

const ADDRESSES_PAGE: &str = "Passing address parameters

  Address parameters may be passed in one of these forms:
  - ssss:oooo -- 'ssss' is a segment and 'oooo' an offset, both hex.
    \"a:c5\" addresses offset 0xc5 in segment 0xa.
  - &scr:oooo -- 'scr' is a script number and 'oooo' an offset within
    that script; fails if the script is not loaded.
  - $REG -- 'REG' is one of PC, ACC, PREV or OBJ: the address held by
    that register.
  - $REG+n (or -n) -- like $REG, with the offset moved by hex 'n'.
  - ?obj -- the object named 'obj'. Fails if the name is ambiguous and
    lists the candidates; ?obj.idx picks candidate 'idx'.";

const LIST_USAGE: [&str; 6] = [
    "usage: list [type]",
    "where type is one of the following:",
    "cmds       - lists all commands",
    "vars       - lists all variables",
    "docs       - lists all misc. documentation",
    "[resource] - lists all [resource]s",
];

pub(super) fn register_builtins(console: &mut Console) {
    let builtins: [(&str, &str, &str, super::Handler); 9] = [
        ("list", "s*", "Lists various things (try 'list')", cmd_list),
        ("print", "s", "Prints an int variable", cmd_print),
        ("set", "si", "Sets an int variable", cmd_set),
        (
            "hexgrep",
            "shh*",
            "Searches resources for a sequence of bytes given as hex numbers.\n\
             EXAMPLES:\n  hexgrep script e8 03 c8 00\n  hexgrep pic.042 fe",
            cmd_hexgrep,
        ),
        ("segments", "", "Lists the allocated heap segments", cmd_segments),
        ("vo", "a", "Dumps an object with its selectors", cmd_view_object),
        ("addr", "a", "Resolves an address and shows its target", cmd_addr),
        ("man", "s", "Shows the manual entry of a command, variable or page", cmd_man),
        ("registers", "!", "Shows the execution registers", cmd_registers),
    ];
    for (name, spec, description, handler) in builtins {
        if let Err(err) = console.register_command(name, spec, description, handler) {
            log::error!("built-in console command '{name}' rejected: {err}");
        }
    }
    console.register_page("addresses", ADDRESSES_PAGE);
}

fn failed(command: &str, message: impl Into<String>) -> ConsoleError {
    ConsoleError::Failed {
        command: command.to_string(),
        message: message.into(),
    }
}

fn str_param<'p>(params: &'p [Param], index: usize) -> &'p str {
    params.get(index).and_then(Param::as_str).unwrap_or_default()
}

fn cmd_list(
    console: &mut Console,
    ctx: &ConsoleContext<'_>,
    params: &[Param],
) -> Result<Vec<String>, ConsoleError> {
    match params {
        [] => Ok(LIST_USAGE.iter().map(|line| line.to_string()).collect()),
        [what] => {
            let what = what.as_str().unwrap_or_default();
            match what {
                "cmds" => Ok(console.commands().map(|(name, _)| name.to_string()).collect()),
                "vars" => Ok(console
                    .vars()
                    .map(|(name, var)| format!("{name} = {}", var.value))
                    .collect()),
                "docs" => Ok(console.pages().map(|(name, _)| name.to_string()).collect()),
                _ => {
                    let resources = ctx
                        .resources
                        .ok_or_else(|| failed("list", "no resource directory is open"))?;
                    let kind: ResourceType = what
                        .parse()
                        .map_err(|_| failed("list", format!("unknown resource type '{what}'")))?;
                    Ok(resources
                        .numbers(kind)
                        .into_iter()
                        .map(|number| ResourceId { kind, number }.to_string())
                        .collect())
                }
            }
        }
        _ => Err(failed("list", "can only be used with one argument")),
    }
}

fn cmd_print(
    console: &mut Console,
    _ctx: &ConsoleContext<'_>,
    params: &[Param],
) -> Result<Vec<String>, ConsoleError> {
    let line = match console.var(str_param(params, 0)) {
        Some(value) => value.to_string(),
        None => String::from("Not defined."),
    };
    Ok(vec![line])
}

fn cmd_set(
    console: &mut Console,
    _ctx: &ConsoleContext<'_>,
    params: &[Param],
) -> Result<Vec<String>, ConsoleError> {
    let name = str_param(params, 0);
    let value = params.get(1).and_then(Param::as_int).unwrap_or_default();
    if console.set_var(name, value) {
        Ok(Vec::new())
    } else {
        Err(failed("set", format!("no variable named '{name}'")))
    }
}

fn cmd_hexgrep(
    _console: &mut Console,
    ctx: &ConsoleContext<'_>,
    params: &[Param],
) -> Result<Vec<String>, ConsoleError> {
    let resources = ctx
        .resources
        .ok_or_else(|| failed("hexgrep", "no resource directory is open"))?;
    let target = str_param(params, 0);
    let needle: Vec<u8> = params[1..].iter().filter_map(Param::as_hex).collect();

    let (kind, only) = match target.split_once('.') {
        Some((kind, number)) => {
            let number = number
                .parse::<u16>()
                .map_err(|_| failed("hexgrep", format!("bad resource number in '{target}'")))?;
            (kind, Some(number))
        }
        None => (target, None),
    };
    let kind: ResourceType = kind
        .parse()
        .map_err(|_| failed("hexgrep", format!("Unknown resource type \"{kind}\"")))?;

    let numbers = match only {
        Some(number) => vec![number],
        None => resources.numbers(kind),
    };
    let mut output = Vec::new();
    for number in numbers {
        let Some(data) = resources.get(kind, number) else {
            continue;
        };
        let hits = data.positions_of(&needle);
        if hits.is_empty() {
            continue;
        }
        output.push(format!("In {}:", ResourceId { kind, number }));
        output.extend(hits.into_iter().map(|offset| format!("   0x{offset:04x}")));
    }
    Ok(output)
}

fn cmd_segments(
    _console: &mut Console,
    ctx: &ConsoleContext<'_>,
    _params: &[Param],
) -> Result<Vec<String>, ConsoleError> {
    Ok(ctx
        .heap
        .segment_summaries()
        .into_iter()
        .map(|summary| format!("{}: {}", summary.id, summary.description))
        .collect())
}

fn cmd_view_object(
    _console: &mut Console,
    ctx: &ConsoleContext<'_>,
    params: &[Param],
) -> Result<Vec<String>, ConsoleError> {
    let addr = params.first().and_then(Param::as_addr).unwrap_or_default();
    let object = ctx
        .heap
        .get_object(addr)
        .ok_or_else(|| failed("vo", format!("{addr} is not an object")))?;
    Ok(describe_object(ctx, object))
}

fn describe_object(ctx: &ConsoleContext<'_>, object: &Object) -> Vec<String> {
    let heap = ctx.heap;
    let selectors = heap.selectors();
    let pos = object.pos();
    let kind = if object.is_class() {
        "class"
    } else if object.is_clone() {
        "clone"
    } else {
        "object"
    };

    let mut out = vec![format!("[{pos}] {} ({kind})", heap.object_name(pos))];
    let species = object.species_selector();
    let superclass = object.superclass_selector();
    out.push(format!("  species: [{species}] {}", link_name(ctx, species)));
    out.push(format!(
        "  superclass: [{superclass}] {}",
        link_name(ctx, superclass)
    ));
    out.push(format!("  -info-: {:04x}", object.info_selector().to_u16()));

    out.push(format!("  {} variables:", object.var_count()));
    for (index, value) in object.variables().iter().enumerate() {
        let name = match object.var_selector(index) {
            Ok(selector) => selectors.describe(selector),
            Err(_) => String::from("?"),
        };
        out.push(format!("    [{index:03x}] {name} = {value}"));
    }

    out.push(format!("  {} methods:", object.method_count()));
    for index in 0..object.method_count() {
        let (Some(selector), Some(code)) = (object.func_selector(index), object.function(index))
        else {
            continue;
        };
        out.push(format!("    [{code}] {}", selectors.describe(selector)));
    }
    out
}

fn link_name(ctx: &ConsoleContext<'_>, addr: Reg) -> String {
    if addr.is_null() {
        String::from("<none>")
    } else {
        ctx.heap.object_name(addr)
    }
}

fn cmd_addr(
    _console: &mut Console,
    ctx: &ConsoleContext<'_>,
    params: &[Param],
) -> Result<Vec<String>, ConsoleError> {
    let addr = params.first().and_then(Param::as_addr).unwrap_or_default();
    if addr.is_number() {
        return Ok(vec![format!("{addr} = {}", addr.offset)]);
    }
    let target = match ctx.heap.resolve(addr)? {
        SegmentRef::Object(object) => format!("object {}", ctx.heap.object_name(object.pos())),
        SegmentRef::Text(text) => format!("string \"{text}\""),
        SegmentRef::Raw(bytes) => {
            let preview: Vec<String> = bytes
                .as_slice()
                .iter()
                .take(16)
                .map(|byte| format!("{byte:02x}"))
                .collect();
            format!("raw {}", preview.join(" "))
        }
    };
    Ok(vec![format!("{addr} -> {target}")])
}

fn cmd_man(
    console: &mut Console,
    _ctx: &ConsoleContext<'_>,
    params: &[Param],
) -> Result<Vec<String>, ConsoleError> {
    let name = str_param(params, 0);
    if let Some(command) = console.command(name) {
        let mut out = vec![
            String::from("SYNOPSIS"),
            format!("  {name}{}", command.spec.synopsis()),
            String::from("DESCRIPTION"),
        ];
        out.extend(command.description.lines().map(|line| format!("  {line}")));
        return Ok(out);
    }
    if let Some((_, var)) = console.vars().find(|(var_name, _)| *var_name == name) {
        return Ok(vec![
            String::from("VALUE"),
            format!("  {name} = {}", var.value),
            String::from("DESCRIPTION"),
            format!("  {}", var.description),
        ]);
    }
    if let Some(page) = console.page(name) {
        return Ok(page.lines().map(str::to_string).collect());
    }
    Err(failed("man", format!("no manual entry for '{name}'")))
}

fn cmd_registers(
    _console: &mut Console,
    ctx: &ConsoleContext<'_>,
    _params: &[Param],
) -> Result<Vec<String>, ConsoleError> {
    let Some(state) = ctx.state else {
        return Err(ConsoleError::NeedsState {
            command: String::from("registers"),
        });
    };
    Ok([Register::Acc, Register::Prev, Register::Pc, Register::Obj]
        .into_iter()
        .map(|register| format!("{:<4} {}", register.name(), state.register(register)))
        .collect())
}
