//! In-memory fixtures: minimal dex images, class files and zip archives.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Create a fresh, empty directory under the system temp dir.
pub fn temp_dir(label: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir()
        .join("dexmember_tests")
        .join(format!("{}_{}_{}_{}", label, std::process::id(), timestamp, id));
    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Build a stored (uncompressed) zip archive.
pub fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(name.to_string(), options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Overwrite the uncompressed size recorded for every entry of `zip`, in both
/// the local headers and the central directory.
pub fn forge_entry_sizes(zip: &mut [u8], size: u32) {
    let patch = |zip: &mut [u8], signature: &[u8], offset: usize| {
        let starts: Vec<usize> = zip
            .windows(4)
            .enumerate()
            .filter(|(_, w)| *w == signature)
            .map(|(i, _)| i)
            .collect();
        for start in starts {
            zip[start + offset..start + offset + 4].copy_from_slice(&size.to_le_bytes());
        }
    };
    patch(zip, b"PK\x03\x04", 22);
    patch(zip, b"PK\x01\x02", 24);
}

// ============================================================================
// Dex images
// ============================================================================

#[derive(Debug, Clone)]
enum DexMember {
    Field {
        class: String,
        name: String,
        ty: String,
    },
    Method {
        class: String,
        name: String,
        params: Vec<String>,
        ret: String,
    },
}

/// Builds a little-endian dex image holding only the id tables.
#[derive(Debug, Default, Clone)]
pub struct DexBuilder {
    classes: Vec<String>,
    members: Vec<DexMember>,
}

fn shorty(descriptor: &str) -> char {
    match descriptor.as_bytes().first() {
        Some(b'L') | Some(b'[') => 'L',
        Some(c) => *c as char,
        None => 'V',
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_uleb128(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn align4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

impl DexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a class (type descriptor form, e.g. `LFoo;`).
    pub fn class(mut self, descriptor: &str) -> Self {
        self.classes.push(descriptor.to_string());
        self
    }

    pub fn field(mut self, class: &str, name: &str, ty: &str) -> Self {
        self.members.push(DexMember::Field {
            class: class.to_string(),
            name: name.to_string(),
            ty: ty.to_string(),
        });
        self
    }

    pub fn method(mut self, class: &str, name: &str, params: &[&str], ret: &str) -> Self {
        self.members.push(DexMember::Method {
            class: class.to_string(),
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            ret: ret.to_string(),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        // Interned pools, sorted like a real dex.
        let mut type_set: BTreeSet<String> = self.classes.iter().cloned().collect();
        let mut protos: BTreeSet<(String, Vec<String>)> = BTreeSet::new();
        for member in &self.members {
            match member {
                DexMember::Field { class, ty, .. } => {
                    type_set.insert(class.clone());
                    type_set.insert(ty.clone());
                }
                DexMember::Method {
                    class, params, ret, ..
                } => {
                    type_set.insert(class.clone());
                    type_set.insert(ret.clone());
                    type_set.extend(params.iter().cloned());
                    protos.insert((ret.clone(), params.clone()));
                }
            }
        }

        let proto_list: Vec<(String, Vec<String>, String)> = protos
            .into_iter()
            .map(|(ret, params)| {
                let short: String = std::iter::once(shorty(&ret))
                    .chain(params.iter().map(|p| shorty(p)))
                    .collect();
                (ret, params, short)
            })
            .collect();

        let mut string_set: BTreeSet<String> = type_set.clone();
        for member in &self.members {
            match member {
                DexMember::Field { name, .. } | DexMember::Method { name, .. } => {
                    string_set.insert(name.clone());
                }
            }
        }
        for (_, _, short) in &proto_list {
            string_set.insert(short.clone());
        }

        let strings: Vec<String> = string_set.into_iter().collect();
        let string_index: HashMap<&str, u32> = strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i as u32))
            .collect();
        let types: Vec<String> = type_set.into_iter().collect();
        let type_index: HashMap<&str, u32> = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i as u32))
            .collect();
        let proto_index: BTreeMap<(String, Vec<String>), u32> = proto_list
            .iter()
            .enumerate()
            .map(|(i, (ret, params, _))| ((ret.clone(), params.clone()), i as u32))
            .collect();

        let fields: Vec<&DexMember> = self
            .members
            .iter()
            .filter(|m| matches!(m, DexMember::Field { .. }))
            .collect();
        let methods: Vec<&DexMember> = self
            .members
            .iter()
            .filter(|m| matches!(m, DexMember::Method { .. }))
            .collect();

        // Section offsets.
        let header_size = 0x70usize;
        let string_ids_off = header_size;
        let type_ids_off = string_ids_off + strings.len() * 4;
        let proto_ids_off = type_ids_off + types.len() * 4;
        let field_ids_off = proto_ids_off + proto_list.len() * 12;
        let method_ids_off = field_ids_off + fields.len() * 8;
        let class_defs_off = method_ids_off + methods.len() * 8;
        let data_off = class_defs_off + self.classes.len() * 32;

        // Data section: type lists first (4-aligned), then string data.
        let mut data = Vec::new();
        let mut param_offsets = Vec::with_capacity(proto_list.len());
        for (_, params, _) in &proto_list {
            if params.is_empty() {
                param_offsets.push(0u32);
                continue;
            }
            align4(&mut data);
            param_offsets.push((data_off + data.len()) as u32);
            push_u32(&mut data, params.len() as u32);
            for p in params {
                push_u16(&mut data, type_index[p.as_str()] as u16);
            }
        }
        let mut string_offsets = Vec::with_capacity(strings.len());
        for s in &strings {
            string_offsets.push((data_off + data.len()) as u32);
            push_uleb128(&mut data, s.encode_utf16().count() as u32);
            data.extend_from_slice(s.as_bytes());
            data.push(0);
        }

        let table = |count: usize, offset: usize| -> (u32, u32) {
            if count == 0 {
                (0, 0)
            } else {
                (count as u32, offset as u32)
            }
        };

        let mut out = Vec::with_capacity(data_off + data.len());
        out.extend_from_slice(b"dex\n035\0");
        push_u32(&mut out, 0); // checksum
        out.extend_from_slice(&[0u8; 20]); // signature
        push_u32(&mut out, (data_off + data.len()) as u32);
        push_u32(&mut out, header_size as u32);
        push_u32(&mut out, 0x1234_5678);
        push_u32(&mut out, 0); // link_size
        push_u32(&mut out, 0); // link_off
        push_u32(&mut out, 0); // map_off
        for (count, offset) in [
            table(strings.len(), string_ids_off),
            table(types.len(), type_ids_off),
            table(proto_list.len(), proto_ids_off),
            table(fields.len(), field_ids_off),
            table(methods.len(), method_ids_off),
            table(self.classes.len(), class_defs_off),
        ] {
            push_u32(&mut out, count);
            push_u32(&mut out, offset);
        }
        push_u32(&mut out, data.len() as u32);
        push_u32(&mut out, data_off as u32);
        debug_assert_eq!(out.len(), header_size);

        for offset in &string_offsets {
            push_u32(&mut out, *offset);
        }
        for t in &types {
            push_u32(&mut out, string_index[t.as_str()]);
        }
        for ((ret, _, short), params_off) in proto_list.iter().zip(&param_offsets) {
            push_u32(&mut out, string_index[short.as_str()]);
            push_u32(&mut out, type_index[ret.as_str()]);
            push_u32(&mut out, *params_off);
        }
        for field in &fields {
            if let DexMember::Field { class, name, ty } = field {
                push_u16(&mut out, type_index[class.as_str()] as u16);
                push_u16(&mut out, type_index[ty.as_str()] as u16);
                push_u32(&mut out, string_index[name.as_str()]);
            }
        }
        for method in &methods {
            if let DexMember::Method {
                class,
                name,
                params,
                ret,
            } = method
            {
                push_u16(&mut out, type_index[class.as_str()] as u16);
                push_u16(&mut out, proto_index[&(ret.clone(), params.clone())] as u16);
                push_u32(&mut out, string_index[name.as_str()]);
            }
        }
        for class in &self.classes {
            push_u32(&mut out, type_index[class.as_str()]);
            push_u32(&mut out, 0x0001); // ACC_PUBLIC
            push_u32(&mut out, u32::MAX); // superclass: NO_INDEX
            push_u32(&mut out, 0); // interfaces_off
            push_u32(&mut out, u32::MAX); // source_file_idx
            push_u32(&mut out, 0); // annotations_off
            push_u32(&mut out, 0); // class_data_off
            push_u32(&mut out, 0); // static_values_off
        }
        debug_assert_eq!(out.len(), data_off);

        out.extend_from_slice(&data);
        out
    }
}

// ============================================================================
// Class files
// ============================================================================

const CONSTANT_UTF8: u8 = 1;
const CONSTANT_LONG: u8 = 5;
const CONSTANT_CLASS: u8 = 7;
const CONSTANT_FIELDREF: u8 = 9;
const CONSTANT_METHODREF: u8 = 10;
const CONSTANT_INTERFACE_METHODREF: u8 = 11;
const CONSTANT_NAME_AND_TYPE: u8 = 12;

#[derive(Debug, Clone)]
enum PoolRequest {
    Ref {
        tag: u8,
        owner: String,
        name: String,
        descriptor: String,
    },
    Long(i64),
}

/// Builds a class file with the given members and constant-pool references.
///
/// Methods get a one-instruction `Code` attribute; the super class is
/// `java/lang/Object`.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    this_class: String,
    fields: Vec<(String, String)>,
    methods: Vec<(String, String)>,
    pool_requests: Vec<PoolRequest>,
}

#[derive(Default)]
struct PoolWriter {
    bytes: Vec<u8>,
    /// Number of slots used, including the unusable slot 0.
    slots: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl PoolWriter {
    fn new() -> Self {
        Self {
            slots: 1,
            ..Self::default()
        }
    }

    fn push(&mut self, entry: &[u8], width: u16) -> u16 {
        let index = self.slots;
        self.bytes.extend_from_slice(entry);
        self.slots += width;
        index
    }

    fn utf8(&mut self, s: &str) -> u16 {
        if let Some(index) = self.utf8.get(s) {
            return *index;
        }
        let mut entry = vec![CONSTANT_UTF8];
        entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
        entry.extend_from_slice(s.as_bytes());
        let index = self.push(&entry, 1);
        self.utf8.insert(s.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let name_idx = self.utf8(name);
        let mut entry = vec![CONSTANT_CLASS];
        entry.extend_from_slice(&name_idx.to_be_bytes());
        let index = self.push(&entry, 1);
        self.classes.insert(name.to_string(), index);
        index
    }

    fn pair(&mut self, tag: u8, a: u16, b: u16) -> u16 {
        let mut entry = vec![tag];
        entry.extend_from_slice(&a.to_be_bytes());
        entry.extend_from_slice(&b.to_be_bytes());
        self.push(&entry, 1)
    }
}

impl ClassBuilder {
    /// Start a class with the given internal name (`com/example/Foo`).
    pub fn new(internal_name: &str) -> Self {
        Self {
            this_class: internal_name.to_string(),
            fields: Vec::new(),
            methods: Vec::new(),
            pool_requests: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push((name.to_string(), descriptor.to_string()));
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push((name.to_string(), descriptor.to_string()));
        self
    }

    fn reference(mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        self.pool_requests.push(PoolRequest::Ref {
            tag,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        self
    }

    pub fn field_ref(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.reference(CONSTANT_FIELDREF, owner, name, descriptor)
    }

    pub fn method_ref(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.reference(CONSTANT_METHODREF, owner, name, descriptor)
    }

    pub fn interface_method_ref(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.reference(CONSTANT_INTERFACE_METHODREF, owner, name, descriptor)
    }

    /// Add a two-slot `long` constant.
    pub fn long_constant(mut self, value: i64) -> Self {
        self.pool_requests.push(PoolRequest::Long(value));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolWriter::new();
        let this_idx = pool.class(&self.this_class);
        let super_idx = pool.class("java/lang/Object");
        let code_idx = if self.methods.is_empty() {
            0
        } else {
            pool.utf8("Code")
        };

        for request in &self.pool_requests {
            match request {
                PoolRequest::Ref {
                    tag,
                    owner,
                    name,
                    descriptor,
                } => {
                    let class_idx = pool.class(owner);
                    let name_idx = pool.utf8(name);
                    let desc_idx = pool.utf8(descriptor);
                    let nat_idx = pool.pair(CONSTANT_NAME_AND_TYPE, name_idx, desc_idx);
                    pool.pair(*tag, class_idx, nat_idx);
                }
                PoolRequest::Long(value) => {
                    let mut entry = vec![CONSTANT_LONG];
                    entry.extend_from_slice(&value.to_be_bytes());
                    pool.push(&entry, 2);
                }
            }
        }

        let fields: Vec<(u16, u16)> = self
            .fields
            .iter()
            .map(|(name, desc)| (pool.utf8(name), pool.utf8(desc)))
            .collect();
        let methods: Vec<(u16, u16)> = self
            .methods
            .iter()
            .map(|(name, desc)| (pool.utf8(name), pool.utf8(desc)))
            .collect();

        let mut out = Vec::new();
        out.extend_from_slice(&[0xCA, 0xFE, 0xBA, 0xBE]);
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major (Java 8)
        out.extend_from_slice(&pool.slots.to_be_bytes());
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&0x0021u16.to_be_bytes()); // ACC_PUBLIC | ACC_SUPER
        out.extend_from_slice(&this_idx.to_be_bytes());
        out.extend_from_slice(&super_idx.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // interfaces

        out.extend_from_slice(&(fields.len() as u16).to_be_bytes());
        for (name, desc) in fields {
            out.extend_from_slice(&0x0001u16.to_be_bytes());
            out.extend_from_slice(&name.to_be_bytes());
            out.extend_from_slice(&desc.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
        }

        out.extend_from_slice(&(methods.len() as u16).to_be_bytes());
        for (name, desc) in methods {
            out.extend_from_slice(&0x0001u16.to_be_bytes());
            out.extend_from_slice(&name.to_be_bytes());
            out.extend_from_slice(&desc.to_be_bytes());
            out.extend_from_slice(&1u16.to_be_bytes());
            // Code: max_stack, max_locals, code_length, `return`, no handlers, no attributes.
            let mut code = Vec::new();
            code.extend_from_slice(&1u16.to_be_bytes());
            code.extend_from_slice(&1u16.to_be_bytes());
            code.extend_from_slice(&1u32.to_be_bytes());
            code.push(0xB1);
            code.extend_from_slice(&0u16.to_be_bytes());
            code.extend_from_slice(&0u16.to_be_bytes());
            out.extend_from_slice(&code_idx.to_be_bytes());
            out.extend_from_slice(&(code.len() as u32).to_be_bytes());
            out.extend_from_slice(&code);
        }

        out.extend_from_slice(&0u16.to_be_bytes()); // class attributes
        out
    }
}
