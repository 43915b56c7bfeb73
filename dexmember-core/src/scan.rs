//! Parallel, deterministic discovery of bytecode artifacts.
//!
//! Explicit file arguments are taken as-is (their content decides the
//! container kind). Directories are walked for files with an artifact
//! extension, pruning build-tool and VCS directories early.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::DexMemberResult;
use crate::parser::Artifact;

/// File extensions picked up when walking a directory.
pub const ARTIFACT_EXTENSIONS: &[&str] = &["dex", "class", "jar", "apk", "aar"];

/// Directories skipped while walking.
const EXCLUDED_DIRS: &[&str] = &[".git", ".gradle", ".idea", "node_modules"];

#[inline]
fn is_excluded_dir(entry: &walkdir::DirEntry, excludes: &HashSet<&str>) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excludes.contains(name))
}

/// Whether `path` has one of [`ARTIFACT_EXTENSIONS`] (case-insensitive).
pub fn has_artifact_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ARTIFACT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Gathers artifact files under a directory, sorted by path.
pub fn gather_artifacts_in(root: &Path) -> Result<Vec<PathBuf>> {
    let excludes: HashSet<&str> = EXCLUDED_DIRS.iter().copied().collect();

    let mut files = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e, &excludes))
        .par_bridge()
        .filter_map(|entry| match entry {
            Ok(e) => {
                let path = e.path();
                if e.file_type().is_file() && has_artifact_extension(path) {
                    Some(Ok(path.to_path_buf()))
                } else {
                    None
                }
            }
            Err(e) => Some(Err(e.into())),
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to gather artifacts from {}", root.display()))?;

    // par_bridge does not preserve walk order
    files.sort();
    Ok(files)
}

/// Expands the command-line inputs into a list of artifact files.
///
/// Files keep their argument order; each directory contributes its sorted
/// contents in place. A path seen twice is kept once.
pub fn gather_artifacts(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for input in inputs {
        let expanded = if input.is_dir() {
            gather_artifacts_in(input)?
        } else if input.exists() {
            vec![input.clone()]
        } else {
            anyhow::bail!("Input not found: {}", input.display());
        };
        files.extend(expanded.into_iter().filter(|p| seen.insert(p.clone())));
    }
    Ok(files)
}

/// Reads every file in parallel, keeping input order.
pub fn read_artifacts(paths: &[PathBuf]) -> DexMemberResult<Vec<Artifact>> {
    paths.par_iter().map(|p| Artifact::read(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DexMemberError;
    use crate::testing::temp_dir;
    use std::fs;

    fn create_test_tree() -> PathBuf {
        let root = temp_dir("scan");
        fs::create_dir_all(root.join("app/build")).unwrap();
        fs::create_dir_all(root.join(".gradle/caches")).unwrap();
        fs::write(root.join("app/build/classes.dex"), b"dex").unwrap();
        fs::write(root.join("app/build/Foo.CLASS"), b"cls").unwrap();
        fs::write(root.join("app/lib.jar"), b"jar").unwrap();
        fs::write(root.join("app/notes.txt"), b"txt").unwrap();
        fs::write(root.join(".gradle/caches/cached.jar"), b"jar").unwrap();
        root
    }

    #[test]
    fn test_has_artifact_extension() {
        assert!(has_artifact_extension(Path::new("a/b/app.apk")));
        assert!(has_artifact_extension(Path::new("Foo.CLASS")));
        assert!(!has_artifact_extension(Path::new("mapping.txt")));
        assert!(!has_artifact_extension(Path::new("dex")));
    }

    #[test]
    fn test_gather_directory() {
        let root = create_test_tree();
        let files = gather_artifacts_in(&root).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(&root).unwrap().display().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["app/build/Foo.CLASS", "app/build/classes.dex", "app/lib.jar"]
        );
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_gather_mixed_inputs() {
        let root = create_test_tree();
        let explicit = root.join("app/notes.txt");
        let files = gather_artifacts(&[
            explicit.clone(),
            root.join("app"),
            root.join("app/lib.jar"),
        ])
        .unwrap();
        assert_eq!(files[0], explicit);
        assert_eq!(files.len(), 4);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_missing_input() {
        let err = gather_artifacts(&[PathBuf::from("/nonexistent/app.apk")]).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/app.apk"));
    }

    #[test]
    fn test_read_artifacts_keeps_order() {
        let root = create_test_tree();
        let paths = vec![root.join("app/lib.jar"), root.join("app/build/classes.dex")];
        let artifacts = read_artifacts(&paths).unwrap();
        assert_eq!(&artifacts[0].bytes[..], b"jar");
        assert_eq!(&artifacts[1].bytes[..], b"dex");

        let err = read_artifacts(&[root.join("missing.dex")]).unwrap_err();
        assert!(matches!(err, DexMemberError::Io { .. }));
        fs::remove_dir_all(&root).ok();
    }
}
