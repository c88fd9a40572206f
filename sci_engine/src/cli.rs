use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sci_engine::VmConfig;
use sci_formats::{Endian, SciVersion};

#[derive(Parser, Debug)]
#[command(
    about = "Loads SCI scripts into a heap and runs debug console commands against it",
    version
)]
pub struct Args {
    /// Directory holding `script.nnn`, `heap.nnn` and `vocab.nnn` files
    #[arg(long)]
    pub resource_dir: Option<PathBuf>,

    /// Optional JSON interpreter configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Interpreter version, overriding the configuration
    #[arg(long)]
    pub sci_version: Option<SciVersion>,

    /// Script words are big-endian (Macintosh releases)
    #[arg(long)]
    pub big_endian: bool,

    /// JSON list of selector names, used instead of vocab 997
    #[arg(long)]
    pub selectors: Option<PathBuf>,

    /// Script number to instantiate before running commands (repeatable)
    #[arg(long = "load", value_name = "SCRIPT")]
    pub load: Vec<u16>,

    /// Console line to execute (repeatable, runs in order)
    #[arg(long = "exec", value_name = "LINE")]
    pub exec: Vec<String>,

    /// Read further console lines from stdin until EOF
    #[arg(long)]
    pub stdin: bool,

    /// Path to write the heap snapshot as JSON after all commands ran
    #[arg(long)]
    pub snapshot_json: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Settings {
    pub config: VmConfig,
    pub resource_dir: Option<PathBuf>,
    pub load: Vec<u16>,
    pub exec: Vec<String>,
    pub stdin: bool,
    pub snapshot_json: Option<PathBuf>,
}

pub fn parse() -> Result<Settings> {
    Args::parse().into_settings()
}

impl Args {
    fn into_settings(self) -> Result<Settings> {
        if !self.load.is_empty() && self.resource_dir.is_none() {
            bail!("--load requires --resource-dir");
        }

        let mut config =
            VmConfig::from_json_file(self.config.as_deref()).context("loading interpreter config")?;
        if let Some(version) = self.sci_version {
            config.version = version;
        }
        if self.big_endian {
            config.endian = Endian::Big;
        }
        if let Some(path) = self.selectors {
            config.selector_vocab = Some(path);
        }

        Ok(Settings {
            config,
            resource_dir: self.resource_dir,
            load: self.load,
            exec: self.exec,
            stdin: self.stdin,
            snapshot_json: self.snapshot_json,
        })
    }
}
