//! dexmember CLI - list the declared and referenced members of Android and
//! JVM bytecode.
//!
//! Features:
//! - dex, class, jar, apk and aar inputs (directories are scanned)
//! - ProGuard/R8 mapping support for obfuscated builds
//! - Optional desugaring of class files through an external d8
//! - Plain or JSON output

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dexmember_core::{
    gather_artifacts, init_logging, load_config, load_config_file, print_json, print_plain,
    read_artifacts, ApiMapping, D8Desugarer, DesugarConfig, DexMemberConfig, DexParser,
    KindFilter, Scope, Selection,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "List declared and referenced members of Android and JVM bytecode")]
pub struct Cli {
    /// Artifacts (.dex, .class, .jar, .apk, .aar) or directories containing them
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// ProGuard/R8 mapping file used to restore original names
    #[arg(long, value_name = "FILE")]
    mapping: Option<PathBuf>,

    /// Minimum API level used when desugaring class files
    #[arg(long, value_name = "LEVEL")]
    min_api: Option<u32>,

    /// Library archives made available to the desugarer
    #[arg(long = "lib", value_name = "ARCHIVE", action = clap::ArgAction::Append)]
    libs: Vec<PathBuf>,

    /// Desugar class files with this d8 executable
    #[arg(long, value_name = "PATH")]
    d8: Option<PathBuf>,

    /// Only list members declared by the inputs
    #[arg(long, conflicts_with = "referenced")]
    declared: bool,

    /// Only list members referenced but not declared by the inputs
    #[arg(long)]
    referenced: bool,

    /// Only list methods
    #[arg(long, conflicts_with = "fields")]
    methods: bool,

    /// Only list fields
    #[arg(long)]
    fields: bool,

    /// Output results in JSON format
    #[arg(long)]
    json: bool,

    /// Print the number of canonical units instead of members
    #[arg(long)]
    count: bool,

    /// Configuration file (defaults to ./dexmember.toml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn selection(&self) -> Selection {
        let scope = if self.declared {
            Scope::Declared
        } else if self.referenced {
            Scope::Referenced
        } else {
            Scope::All
        };
        let kind = if self.methods {
            KindFilter::Methods
        } else if self.fields {
            KindFilter::Fields
        } else {
            KindFilter::Both
        };
        Selection::new(scope, kind)
    }

    /// Flags take precedence over the config file.
    fn desugar_config(&self, cfg: &DexMemberConfig) -> DesugarConfig {
        let base = cfg.desugar_config();
        let min_api = self.min_api.unwrap_or(base.min_api_level);
        let libs = if self.libs.is_empty() {
            base.library_archives
        } else {
            self.libs.clone()
        };
        DesugarConfig::new(min_api, libs)
    }

    fn mapping_path<'a>(&'a self, cfg: &'a DexMemberConfig) -> Option<&'a Path> {
        self.mapping.as_deref().or(cfg.mapping.as_deref())
    }
}

fn load_settings(cli: &Cli) -> Result<DexMemberConfig> {
    if let Some(path) = &cli.config {
        return load_config_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()));
    }
    let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
    Ok(load_config(&cwd)?.unwrap_or_default())
}

fn build_parser(cli: &Cli, cfg: &DexMemberConfig) -> Result<DexParser> {
    let paths = gather_artifacts(&cli.inputs)?;
    if paths.is_empty() {
        bail!("No .dex, .class, .jar, .apk or .aar files found in the given inputs");
    }
    tracing::info!(count = paths.len(), "gathered artifacts");

    let artifacts = read_artifacts(&paths).context("Failed to read input artifacts")?;
    let mut parser = DexParser::new(artifacts).with_desugaring(cli.desugar_config(cfg));

    if let Some(path) = cli.mapping_path(cfg) {
        let mapping = ApiMapping::load_proguard(path)
            .with_context(|| format!("Failed to load mapping: {}", path.display()))?;
        tracing::info!(path = %path.display(), types = mapping.len(), "loaded mapping");
        parser = parser.with_api_mapping(mapping);
    }

    if let Some(d8) = &cli.d8 {
        parser = parser.with_desugarer(Arc::new(D8Desugarer::new(d8)));
    }

    Ok(parser)
}

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] dexmember internal error: {}", info);
        eprintln!("[PANIC] The process will exit with code 2.");
        std::process::exit(2);
    }));

    let cli = Cli::parse();
    let cfg = load_settings(&cli)?;
    let json = cli.json || cfg.wants_json();

    init_logging(json);

    let parser = build_parser(&cli, &cfg)?;

    if cli.count {
        let units = parser.unit_count().context("Failed to extract members")?;
        if json {
            println!("{}", serde_json::json!({ "units": units }));
        } else {
            println!("{}", units);
        }
        return Ok(());
    }

    let members = parser
        .members(cli.selection())
        .context("Failed to extract members")?;
    let units = parser.unit_count()?;

    if json {
        print_json(&members, units);
    } else {
        print_plain(&members);
    }

    Ok(())
}
