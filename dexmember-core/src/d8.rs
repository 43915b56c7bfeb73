//! Desugaring through an external `d8` executable.
//!
//! Inputs are written to a scratch directory, `d8` compiles them to dex with
//! the configured `--min-api` and `--lib` archives, and every produced
//! `classes*.dex` is decoded as one canonical unit.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::convert::ContainerKind;
use crate::desugar::{ClassInput, DesugarConfig, Desugarer};
use crate::dex::parse_dex;
use crate::error::{DexMemberError, DexMemberResult, IoResultExt};
use crate::unit::CanonicalUnit;

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A planned `d8` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D8Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Desugarer backed by the `d8` command-line tool.
#[derive(Debug, Clone)]
pub struct D8Desugarer {
    program: PathBuf,
    scratch_root: PathBuf,
}

impl Default for D8Desugarer {
    fn default() -> Self {
        Self::new("d8")
    }
}

impl D8Desugarer {
    /// Use the given `d8` executable (looked up on `PATH` when relative).
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            scratch_root: std::env::temp_dir(),
        }
    }

    /// Create scratch directories under `dir` instead of the system temp dir.
    pub fn with_scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = dir.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the command line for compiling `inputs` into `out_dir`.
    pub fn plan(&self, inputs: &[PathBuf], out_dir: &Path, config: &DesugarConfig) -> D8Invocation {
        let mut args = vec![
            "--release".to_string(),
            "--min-api".to_string(),
            config.min_api_level.to_string(),
        ];
        for lib in &config.library_archives {
            args.push("--lib".to_string());
            args.push(lib.display().to_string());
        }
        args.push("--output".to_string());
        args.push(out_dir.display().to_string());
        args.extend(inputs.iter().map(|p| p.display().to_string()));

        D8Invocation {
            program: self.program.clone(),
            args,
        }
    }

    fn scratch_dir(&self) -> DexMemberResult<PathBuf> {
        let id = SCRATCH_COUNTER.fetch_add(1, Ordering::SeqCst);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = self
            .scratch_root
            .join(format!("dexmember-d8-{}-{}-{}", std::process::id(), nanos, id));
        fs::create_dir_all(dir.join("in")).with_path(&dir)?;
        fs::create_dir_all(dir.join("out")).with_path(&dir)?;
        Ok(dir)
    }

    fn write_inputs(dir: &Path, inputs: &[ClassInput]) -> DexMemberResult<Vec<PathBuf>> {
        inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let extension = match input.kind {
                    ContainerKind::Class => "class",
                    ContainerKind::Jar => "jar",
                    other => {
                        return Err(DexMemberError::desugar(format!(
                            "{} is a {} container, expected class or jar",
                            input.name, other
                        )))
                    }
                };
                let path = dir.join("in").join(format!("input{}.{}", index, extension));
                fs::write(&path, &input.bytes).with_path(&path)?;
                Ok(path)
            })
            .collect()
    }

    fn run(&self, invocation: &D8Invocation) -> DexMemberResult<()> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                DexMemberError::desugar(format!(
                    "failed to launch {}: {}",
                    invocation.program.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            return Err(DexMemberError::desugar(format!(
                "{} exited with {}: {}",
                invocation.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn read_outputs(out_dir: &Path, unit_name: &str) -> DexMemberResult<Vec<Arc<dyn CanonicalUnit>>> {
        let mut dex_files: Vec<(u32, PathBuf)> = fs::read_dir(out_dir)
            .with_path(out_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let middle = name.strip_prefix("classes")?.strip_suffix(".dex")?.to_string();
                let index = if middle.is_empty() { 1 } else { middle.parse().ok()? };
                Some((index, entry.path()))
            })
            .collect();
        dex_files.sort();

        dex_files
            .into_iter()
            .map(|(_, path)| {
                let bytes = fs::read(&path).with_path(&path)?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let unit: Arc<dyn CanonicalUnit> =
                    Arc::new(parse_dex(&format!("{}!{}", unit_name, file_name), &bytes)?);
                Ok(unit)
            })
            .collect()
    }
}

impl Desugarer for D8Desugarer {
    fn desugar(
        &self,
        inputs: &[ClassInput],
        config: &DesugarConfig,
    ) -> DexMemberResult<Vec<Arc<dyn CanonicalUnit>>> {
        config.validate()?;
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let dir = self.scratch_dir()?;
        let result = (|| {
            let paths = Self::write_inputs(&dir, inputs)?;
            let out_dir = dir.join("out");
            let invocation = self.plan(&paths, &out_dir, config);
            tracing::debug!(program = %invocation.program.display(), args = ?invocation.args, "running d8");
            self.run(&invocation)?;
            let unit_name = inputs
                .iter()
                .map(|i| i.name.as_str())
                .collect::<Vec<_>>()
                .join("+");
            Self::read_outputs(&out_dir, &unit_name)
        })();

        if let Err(e) = fs::remove_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to remove d8 scratch directory");
        }
        result
    }
}
