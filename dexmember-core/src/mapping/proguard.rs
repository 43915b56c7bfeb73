//! ProGuard/R8 `mapping.txt` loading.
//!
//! ```text
//! com.example.Foo -> a.a:
//!     int count -> a
//!     1:4:void run(java.lang.String,int):12:15 -> b
//! ```
//!
//! Class lines map types; indented lines map the fields and methods of the
//! preceding class. Inlined-frame lines (qualified method names) and `#`
//! comments carry nothing for member renaming and are skipped.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::{ApiMapping, TypeMapping};
use crate::descriptor::TypeDescriptor;
use crate::error::{DexMemberError, DexMemberResult, IoResultExt};

fn class_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\S+) -> (\S+):$").unwrap_or_else(|e| panic!("invalid class regex: {}", e))
    })
}

fn member_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:\d+:\d+:)?(?P<type>\S+) (?P<name>[^\s(]+)(?:\((?P<args>[^)]*)\))?(?::\d+(?::\d+)?)? -> (?P<obf>\S+)$",
        )
        .unwrap_or_else(|e| panic!("invalid member regex: {}", e))
    })
}

impl ApiMapping {
    /// Parse ProGuard/R8 mapping text.
    pub fn from_proguard(text: &str) -> DexMemberResult<ApiMapping> {
        let mut mapping = ApiMapping::new();
        let mut current: Option<TypeDescriptor> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_end();
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let indented = line.len() != trimmed.len();
            if !indented {
                let caps = class_line().captures(trimmed).ok_or_else(|| {
                    DexMemberError::mapping(line_no, format!("expected class mapping, found {:?}", trimmed))
                })?;
                let original = TypeDescriptor::from_source_name(&caps[1]);
                let obfuscated = TypeDescriptor::from_source_name(&caps[2]);
                mapping.add_type(obfuscated.as_str(), original.as_str());
                current = Some(obfuscated);
                continue;
            }

            let owner = current.as_ref().ok_or_else(|| {
                DexMemberError::mapping(line_no, "member mapping before any class mapping")
            })?;
            let caps = member_line().captures(trimmed).ok_or_else(|| {
                DexMemberError::mapping(line_no, format!("expected member mapping, found {:?}", trimmed))
            })?;

            let name = &caps["name"];
            if name.contains('.') {
                continue;
            }
            let type_mapping: &mut TypeMapping = mapping
                .types
                .get_mut(owner)
                .ok_or_else(|| DexMemberError::mapping(line_no, "class mapping disappeared"))?;
            let obfuscated = caps["obf"].to_string();
            let member_type = TypeDescriptor::from_source_name(&caps["type"]);

            match caps.name("args") {
                Some(args) => {
                    let params = args
                        .as_str()
                        .split(',')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(TypeDescriptor::from_source_name)
                        .collect();
                    type_mapping.insert_method(obfuscated, params, member_type, name.to_string());
                }
                None => {
                    type_mapping.add_field(obfuscated, name);
                }
            }
        }

        tracing::debug!(types = mapping.len(), "loaded proguard mapping");
        Ok(mapping)
    }

    /// Read and parse a ProGuard/R8 mapping file.
    pub fn load_proguard(path: &Path) -> DexMemberResult<ApiMapping> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        Self::from_proguard(&text)
    }
}
