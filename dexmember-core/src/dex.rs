//! Dalvik executable decoding.
//!
//! Only the id tables are read: strings, types, protos, field ids, method ids
//! and class definitions. Every field and method id becomes a member; the
//! class definitions decide which of them are declared. Checksums and the
//! signature are not verified.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::convert::{ContainerKind, Decoder};
use crate::descriptor::TypeDescriptor;
use crate::error::{DexMemberError, DexMemberResult};
use crate::member::{FieldMember, Member, MethodMember};
use crate::mutf8;
use crate::unit::{CanonicalUnit, MemberUnit};

const HEADER_SIZE: usize = 0x70;
const ENDIAN_CONSTANT: u32 = 0x1234_5678;
const REVERSE_ENDIAN_CONSTANT: u32 = 0x7856_3412;

const FILE_SIZE_OFF: usize = 0x20;
const ENDIAN_TAG_OFF: usize = 0x28;
const STRING_IDS_OFF: usize = 0x38;
const TYPE_IDS_OFF: usize = 0x40;
const PROTO_IDS_OFF: usize = 0x48;
const FIELD_IDS_OFF: usize = 0x50;
const METHOD_IDS_OFF: usize = 0x58;
const CLASS_DEFS_OFF: usize = 0x60;

const PROTO_ID_SIZE: usize = 12;
const MEMBER_ID_SIZE: usize = 8;
const CLASS_DEF_SIZE: usize = 32;

/// Check for the `dex\nNNN\0` magic.
pub fn is_dex(bytes: &[u8]) -> bool {
    bytes.len() >= 8
        && bytes.starts_with(b"dex\n")
        && bytes[4..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == 0
}

/// Decoder for the canonical dex container.
#[derive(Debug, Clone, Copy, Default)]
pub struct DexDecoder;

impl Decoder for DexDecoder {
    fn decode(
        &self,
        name: &str,
        bytes: &[u8],
        kind: ContainerKind,
    ) -> DexMemberResult<Arc<dyn CanonicalUnit>> {
        if kind != ContainerKind::Dex {
            return Err(DexMemberError::decode(
                name,
                format!("dex decoder cannot read {} containers", kind),
            ));
        }
        Ok(Arc::new(parse_dex(name, bytes)?))
    }
}

/// Bounds-checked little-endian view over a dex image.
struct DexReader<'a> {
    name: &'a str,
    data: &'a [u8],
}

impl<'a> DexReader<'a> {
    fn error(&self, message: impl Into<String>) -> DexMemberError {
        DexMemberError::decode(self.name, message)
    }

    fn slice(&self, offset: usize, len: usize) -> DexMemberResult<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| self.error(format!("read of {} bytes at {:#x} is out of bounds", len, offset)))
    }

    fn u16_at(&self, offset: usize) -> DexMemberResult<u16> {
        let b = self.slice(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32_at(&self, offset: usize) -> DexMemberResult<u32> {
        let b = self.slice(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn uleb128_at(&self, mut offset: usize) -> DexMemberResult<(u32, usize)> {
        let mut result: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = *self
                .data
                .get(offset)
                .ok_or_else(|| self.error("truncated uleb128"))?;
            offset += 1;
            result |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok((result, offset));
            }
        }
        Err(self.error("uleb128 longer than five bytes"))
    }

    /// Read a `(size, offset)` pair from the header and check the table fits.
    fn table(&self, header_off: usize, item_size: usize) -> DexMemberResult<(usize, usize)> {
        let size = self.u32_at(header_off)? as usize;
        let offset = self.u32_at(header_off + 4)? as usize;
        if size > 0 {
            let len = size
                .checked_mul(item_size)
                .ok_or_else(|| self.error("table size overflow"))?;
            self.slice(offset, len)?;
        }
        Ok((size, offset))
    }

    fn string_data(&self, offset: usize) -> DexMemberResult<String> {
        let (_utf16_len, start) = self.uleb128_at(offset)?;
        let rest = self
            .data
            .get(start..)
            .ok_or_else(|| self.error("string data out of bounds"))?;
        let end = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| self.error(format!("unterminated string at {:#x}", offset)))?;
        mutf8::decode(&rest[..end])
            .ok_or_else(|| self.error(format!("malformed MUTF-8 string at {:#x}", offset)))
    }
}

fn lookup<'t, T>(
    table: &'t [T],
    index: usize,
    what: &str,
    reader: &DexReader<'_>,
) -> DexMemberResult<&'t T> {
    table
        .get(index)
        .ok_or_else(|| reader.error(format!("{} index {} out of range", what, index)))
}

/// Decode a dex image into a [`MemberUnit`].
pub fn parse_dex(name: &str, bytes: &[u8]) -> DexMemberResult<MemberUnit> {
    let reader = DexReader { name, data: bytes };

    if !is_dex(bytes) {
        return Err(reader.error("missing dex magic"));
    }
    if bytes.len() < HEADER_SIZE {
        return Err(reader.error("truncated dex header"));
    }
    match reader.u32_at(ENDIAN_TAG_OFF)? {
        ENDIAN_CONSTANT => {}
        REVERSE_ENDIAN_CONSTANT => return Err(reader.error("big-endian dex files are not supported")),
        other => return Err(reader.error(format!("invalid endian tag {:#x}", other))),
    }
    let file_size = reader.u32_at(FILE_SIZE_OFF)? as usize;
    if file_size > bytes.len() {
        return Err(reader.error(format!(
            "header declares {} bytes but only {} are present",
            file_size,
            bytes.len()
        )));
    }

    let (string_count, string_ids) = reader.table(STRING_IDS_OFF, 4)?;
    let strings = (0..string_count)
        .map(|i| {
            let data_off = reader.u32_at(string_ids + i * 4)? as usize;
            reader.string_data(data_off)
        })
        .collect::<DexMemberResult<Vec<_>>>()?;

    let (type_count, type_ids) = reader.table(TYPE_IDS_OFF, 4)?;
    let types = (0..type_count)
        .map(|i| {
            let string_idx = reader.u32_at(type_ids + i * 4)? as usize;
            lookup(&strings, string_idx, "string", &reader).map(TypeDescriptor::new)
        })
        .collect::<DexMemberResult<Vec<_>>>()?;

    let (proto_count, proto_ids) = reader.table(PROTO_IDS_OFF, PROTO_ID_SIZE)?;
    let protos = (0..proto_count)
        .map(|i| {
            let item = proto_ids + i * PROTO_ID_SIZE;
            let return_idx = reader.u32_at(item + 4)? as usize;
            let params_off = reader.u32_at(item + 8)? as usize;
            let return_type = lookup(&types, return_idx, "type", &reader)?.clone();
            let params = if params_off == 0 {
                Vec::new()
            } else {
                let size = reader.u32_at(params_off)? as usize;
                (0..size)
                    .map(|p| {
                        let type_idx = reader.u16_at(params_off + 4 + p * 2)? as usize;
                        lookup(&types, type_idx, "type", &reader).cloned()
                    })
                    .collect::<DexMemberResult<Vec<_>>>()?
            };
            Ok((params, return_type))
        })
        .collect::<DexMemberResult<Vec<_>>>()?;

    let (field_count, field_ids) = reader.table(FIELD_IDS_OFF, MEMBER_ID_SIZE)?;
    let (method_count, method_ids) = reader.table(METHOD_IDS_OFF, MEMBER_ID_SIZE)?;
    let mut members = Vec::with_capacity(field_count + method_count);

    for i in 0..field_count {
        let item = field_ids + i * MEMBER_ID_SIZE;
        let class_idx = reader.u16_at(item)? as usize;
        let type_idx = reader.u16_at(item + 2)? as usize;
        let name_idx = reader.u32_at(item + 4)? as usize;
        members.push(Member::Field(FieldMember::new(
            lookup(&types, class_idx, "type", &reader)?.clone(),
            lookup(&strings, name_idx, "string", &reader)?.clone(),
            lookup(&types, type_idx, "type", &reader)?.clone(),
        )));
    }

    for i in 0..method_count {
        let item = method_ids + i * MEMBER_ID_SIZE;
        let class_idx = reader.u16_at(item)? as usize;
        let proto_idx = reader.u16_at(item + 2)? as usize;
        let name_idx = reader.u32_at(item + 4)? as usize;
        let (params, return_type) = lookup(&protos, proto_idx, "proto", &reader)?;
        members.push(Member::Method(MethodMember::new(
            lookup(&types, class_idx, "type", &reader)?.clone(),
            lookup(&strings, name_idx, "string", &reader)?.clone(),
            params.clone(),
            return_type.clone(),
        )));
    }

    let (class_count, class_defs) = reader.table(CLASS_DEFS_OFF, CLASS_DEF_SIZE)?;
    let defined_types = (0..class_count)
        .map(|i| {
            let class_idx = reader.u32_at(class_defs + i * CLASS_DEF_SIZE)? as usize;
            lookup(&types, class_idx, "type", &reader).cloned()
        })
        .collect::<DexMemberResult<BTreeSet<_>>>()?;

    tracing::debug!(
        unit = %name,
        classes = defined_types.len(),
        fields = field_count,
        methods = method_count,
        "decoded dex"
    );

    Ok(MemberUnit::new(name, defined_types, members))
}
