use std::fs;
use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use sci_engine::{Console, ConsoleContext, SegManager, SelectorTable, VmConfig};
use sci_formats::{ResourceDir, ResourceType, CLASS_VOCAB, SELECTOR_VOCAB};

mod cli;

fn main() -> Result<()> {
    env_logger::init();
    let settings = cli::parse()?;

    let resources = match settings.resource_dir.as_deref() {
        Some(dir) => Some(
            ResourceDir::open(dir)
                .with_context(|| format!("opening resource directory {}", dir.display()))?,
        ),
        None => None,
    };

    let selectors = load_selectors(&settings.config, resources.as_ref())?;
    println!("Selectors registered: {}", selectors.count_registered());

    let mut heap = SegManager::new(&settings.config, Arc::new(selectors));
    if let Some(resources) = resources.as_ref() {
        match resources.get(ResourceType::Vocab, CLASS_VOCAB) {
            Some(vocab) => heap.load_class_table(&vocab)?,
            None => log::warn!("vocab.{CLASS_VOCAB} missing; classes resolve only once loaded"),
        }
        heap.set_source(Box::new(resources.clone()));
    }

    for &script in &settings.load {
        let segment = heap
            .instantiate_script(script)
            .with_context(|| format!("instantiating script {script}"))?;
        println!("Loaded script {script} into segment {segment}");
    }

    let mut console = Console::new();
    let ctx = ConsoleContext {
        heap: &heap,
        state: None,
        resources: resources.as_ref(),
    };
    for line in &settings.exec {
        run_line(&mut console, &ctx, line);
    }
    if settings.stdin {
        for line in io::stdin().lock().lines() {
            let line = line.context("reading console input")?;
            run_line(&mut console, &ctx, &line);
        }
    }

    if let Some(path) = settings.snapshot_json.as_deref() {
        write_snapshot(&heap, path)?;
    }
    Ok(())
}

fn load_selectors(config: &VmConfig, resources: Option<&ResourceDir>) -> Result<SelectorTable> {
    if let Some(path) = config.selector_vocab.as_deref() {
        return SelectorTable::from_json_file(path);
    }
    match resources.and_then(|dir| dir.get(ResourceType::Vocab, SELECTOR_VOCAB)) {
        Some(vocab) => SelectorTable::from_vocab(&vocab),
        None => {
            log::warn!("no selector vocabulary available; selector names will be numeric");
            Ok(SelectorTable::default())
        }
    }
}

fn run_line(console: &mut Console, ctx: &ConsoleContext<'_>, line: &str) {
    for output in console.execute(line, ctx) {
        println!("{output}");
    }
}

fn write_snapshot(heap: &SegManager, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&heap.snapshot())
        .context("serializing heap snapshot to JSON")?;
    fs::write(path, json)
        .with_context(|| format!("writing heap snapshot to {}", path.display()))?;
    println!("Saved heap snapshot to {}", path.display());
    Ok(())
}
