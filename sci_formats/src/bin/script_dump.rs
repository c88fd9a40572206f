//! Dump the object and class records of one script resource as JSON.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sci_formats::{
    Endian, LayoutKind, LocalsBlock, MethodEntry, ObjectLayout, Relocations, ResourceDir,
    ResourceType, SELECTOR_VOCAB, SciVersion, ScriptResource, decode_selector_names, scan_script,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding `script.nnn` / `heap.nnn` patch files
    #[arg(long)]
    resource_dir: PathBuf,

    /// Script number to dump
    #[arg(long)]
    script: u16,

    /// Interpreter version, e.g. `sci0_late`, `sci1.1`, `sci3`
    #[arg(long, default_value = "sci0_late")]
    sci_version: SciVersion,

    /// Script words are big-endian (Macintosh releases)
    #[arg(long, default_value_t = false)]
    big_endian: bool,

    /// Selector count for version 3 group tables; read from vocab 997 when omitted
    #[arg(long)]
    selector_count: Option<usize>,

    /// Output JSON file path (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(Debug, Serialize)]
struct ScriptDump {
    number: u16,
    version: SciVersion,
    layout: LayoutKind,
    script_size: usize,
    locals: Option<LocalsBlock>,
    relocations: Relocations,
    objects: Vec<ObjectDump>,
}

#[derive(Debug, Serialize)]
struct ObjectDump {
    offset: usize,
    is_class: bool,
    species: u16,
    var_count: usize,
    var_selectors: Vec<u16>,
    values: Vec<u16>,
    methods: Vec<MethodEntry>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let endian = if args.big_endian {
        Endian::Big
    } else {
        Endian::Little
    };

    let resources = ResourceDir::open(&args.resource_dir)?;
    let script = resources
        .get(ResourceType::Script, args.script)
        .with_context(|| format!("script.{:03} not found", args.script))?;
    let resource = match resources.get(ResourceType::Heap, args.script) {
        Some(heap) => ScriptResource::with_heap(args.script, script, heap),
        None => ScriptResource::new(args.script, script),
    };

    let selector_count = match args.selector_count {
        Some(count) => count,
        None => match resources.get(ResourceType::Vocab, SELECTOR_VOCAB) {
            Some(vocab) => decode_selector_names(&vocab)?.len(),
            None => 0,
        },
    };

    let image = scan_script(&resource, args.sci_version, endian)?;
    let layout = ObjectLayout::for_version(args.sci_version, selector_count);

    let mut objects = Vec::with_capacity(image.objects.len());
    for record in &image.objects {
        let parsed = layout
            .parse(&image.buf, record.offset, endian, true)
            .with_context(|| format!("parsing object at {:#06x}", record.offset))?;
        let var_selectors = (0..parsed.var_count)
            .map(|index| parsed.var_selectors.get(index, endian))
            .collect::<Result<Vec<_>, _>>()?;
        objects.push(ObjectDump {
            offset: record.offset,
            is_class: record.is_class,
            species: record.species,
            var_count: parsed.var_count,
            var_selectors,
            values: parsed.values.unwrap_or_default(),
            methods: parsed.methods,
        });
    }

    let dump = ScriptDump {
        number: image.number,
        version: image.version,
        layout: layout.kind(),
        script_size: image.script_size,
        locals: image.locals,
        relocations: image.relocations,
        objects,
    };

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            Box::new(BufWriter::new(File::create(path)?))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    };
    if args.pretty {
        serde_json::to_writer_pretty(&mut writer, &dump)?;
    } else {
        serde_json::to_writer(&mut writer, &dump)?;
    }
    writeln!(writer)?;
    writer.flush()?;

    Ok(())
}
