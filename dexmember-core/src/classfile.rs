//! Class-file reading.
//!
//! Extracts the class's own type, its declared fields and methods, and every
//! field/method reference in the constant pool. Attributes are skipped.

use crate::descriptor::{parse_field_descriptor, parse_method_descriptor, TypeDescriptor};
use crate::error::{DexMemberError, DexMemberResult};
use crate::member::{FieldMember, Member, MethodMember};
use crate::mutf8;

pub const CLASS_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Check for the `CAFEBABE` magic.
pub fn is_class_file(bytes: &[u8]) -> bool {
    bytes.starts_with(&CLASS_MAGIC)
}

/// The members a single class file defines and uses.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub this_type: TypeDescriptor,
    /// Fields and methods defined by this class
    pub declared: Vec<Member>,
    /// Field and method references from the constant pool
    pub references: Vec<Member>,
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class(u16),
    NameAndType(u16, u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    /// Any other constant, or the unusable slot after a long/double.
    Other,
}

/// Big-endian cursor over class-file bytes.
struct ClassReader<'a> {
    name: &'a str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn error(&self, message: impl Into<String>) -> DexMemberError {
        DexMemberError::decode(self.name, message)
    }

    fn take(&mut self, len: usize) -> DexMemberResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.error(format!("unexpected end of class file at {}", self.pos)))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> DexMemberResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> DexMemberResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> DexMemberResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip_attributes(&mut self) -> DexMemberResult<()> {
        let count = self.u16()?;
        for _ in 0..count {
            self.u16()?;
            let len = self.u32()? as usize;
            self.take(len)?;
        }
        Ok(())
    }
}

struct ConstantPool<'r> {
    name: &'r str,
    entries: Vec<Constant>,
}

impl ConstantPool<'_> {
    fn error(&self, message: impl Into<String>) -> DexMemberError {
        DexMemberError::decode(self.name, message)
    }

    fn get(&self, index: u16) -> DexMemberResult<&Constant> {
        self.entries
            .get(index as usize)
            .filter(|_| index != 0)
            .ok_or_else(|| self.error(format!("constant pool index {} out of range", index)))
    }

    fn utf8(&self, index: u16) -> DexMemberResult<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s.as_str()),
            other => Err(self.error(format!("constant {} is {:?}, expected Utf8", index, other))),
        }
    }

    fn class(&self, index: u16) -> DexMemberResult<TypeDescriptor> {
        match self.get(index)? {
            Constant::Class(name_idx) => Ok(TypeDescriptor::from_internal_name(self.utf8(*name_idx)?)),
            other => Err(self.error(format!("constant {} is {:?}, expected Class", index, other))),
        }
    }

    fn name_and_type(&self, index: u16) -> DexMemberResult<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType(name_idx, desc_idx) => {
                Ok((self.utf8(*name_idx)?, self.utf8(*desc_idx)?))
            }
            other => Err(self.error(format!(
                "constant {} is {:?}, expected NameAndType",
                index, other
            ))),
        }
    }

    fn field(&self, owner: TypeDescriptor, name: &str, descriptor: &str) -> DexMemberResult<Member> {
        let field_type = parse_field_descriptor(descriptor)
            .ok_or_else(|| self.error(format!("malformed field descriptor {:?}", descriptor)))?;
        Ok(FieldMember::new(owner, name, field_type).into())
    }

    fn method(&self, owner: TypeDescriptor, name: &str, descriptor: &str) -> DexMemberResult<Member> {
        let (params, ret) = parse_method_descriptor(descriptor)
            .ok_or_else(|| self.error(format!("malformed method descriptor {:?}", descriptor)))?;
        Ok(MethodMember::new(owner, name, params, ret).into())
    }

    fn references(&self) -> DexMemberResult<Vec<Member>> {
        let mut refs = Vec::new();
        for entry in &self.entries {
            match entry {
                Constant::FieldRef(class_idx, nat_idx) => {
                    let (name, desc) = self.name_and_type(*nat_idx)?;
                    refs.push(self.field(self.class(*class_idx)?, name, desc)?);
                }
                Constant::MethodRef(class_idx, nat_idx) => {
                    let (name, desc) = self.name_and_type(*nat_idx)?;
                    refs.push(self.method(self.class(*class_idx)?, name, desc)?);
                }
                _ => {}
            }
        }
        Ok(refs)
    }
}

fn read_constant_pool<'a>(reader: &mut ClassReader<'a>) -> DexMemberResult<ConstantPool<'a>> {
    let count = reader.u16()? as usize;
    // Index 0 is never valid; keep a placeholder so indices line up.
    let mut entries = Vec::with_capacity(count.max(1));
    entries.push(Constant::Other);

    while entries.len() < count {
        let tag = reader.u8()?;
        let entry = match tag {
            1 => {
                let len = reader.u16()? as usize;
                let bytes = reader.take(len)?;
                Constant::Utf8(
                    mutf8::decode(bytes).ok_or_else(|| reader.error("malformed Utf8 constant"))?,
                )
            }
            7 => Constant::Class(reader.u16()?),
            9 => Constant::FieldRef(reader.u16()?, reader.u16()?),
            10 | 11 => Constant::MethodRef(reader.u16()?, reader.u16()?),
            12 => Constant::NameAndType(reader.u16()?, reader.u16()?),
            3 | 4 => {
                reader.take(4)?;
                Constant::Other
            }
            5 | 6 => {
                reader.take(8)?;
                entries.push(Constant::Other);
                Constant::Other
            }
            8 | 16 | 19 | 20 => {
                reader.take(2)?;
                Constant::Other
            }
            15 => {
                reader.take(3)?;
                Constant::Other
            }
            17 | 18 => {
                reader.take(4)?;
                Constant::Other
            }
            other => return Err(reader.error(format!("unknown constant pool tag {}", other))),
        };
        entries.push(entry);
    }

    Ok(ConstantPool {
        name: reader.name,
        entries,
    })
}

/// Read one class file.
pub fn parse_class(name: &str, bytes: &[u8]) -> DexMemberResult<ClassFile> {
    let mut reader = ClassReader {
        name,
        data: bytes,
        pos: 0,
    };

    if reader.take(4)? != CLASS_MAGIC {
        return Err(reader.error("missing class file magic"));
    }
    let _minor = reader.u16()?;
    let _major = reader.u16()?;

    let pool = read_constant_pool(&mut reader)?;

    let _access = reader.u16()?;
    let this_type = pool.class(reader.u16()?)?;
    let _super = reader.u16()?;
    let interfaces = reader.u16()? as usize;
    reader.take(interfaces * 2)?;

    let mut declared = Vec::new();
    let field_count = reader.u16()?;
    for _ in 0..field_count {
        let _access = reader.u16()?;
        let name_idx = reader.u16()?;
        let desc_idx = reader.u16()?;
        declared.push(pool.field(this_type.clone(), pool.utf8(name_idx)?, pool.utf8(desc_idx)?)?);
        reader.skip_attributes()?;
    }

    let method_count = reader.u16()?;
    for _ in 0..method_count {
        let _access = reader.u16()?;
        let name_idx = reader.u16()?;
        let desc_idx = reader.u16()?;
        declared.push(pool.method(this_type.clone(), pool.utf8(name_idx)?, pool.utf8(desc_idx)?)?);
        reader.skip_attributes()?;
    }
    reader.skip_attributes()?;

    Ok(ClassFile {
        this_type,
        declared,
        references: pool.references()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ClassBuilder;

    #[test]
    fn test_parse_declared_members() {
        let bytes = ClassBuilder::new("com/example/Foo")
            .field("count", "I")
            .method("bar", "()V")
            .build();
        let class = parse_class("Foo.class", &bytes).unwrap();

        assert_eq!(class.this_type.as_str(), "Lcom/example/Foo;");
        let rendered: Vec<String> = class.declared.iter().map(|m| m.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["com.example.Foo count: int", "com.example.Foo bar(): void"]
        );
    }

    #[test]
    fn test_parse_constant_pool_references() {
        let bytes = ClassBuilder::new("Foo")
            .field_ref("Baz", "qux", "I")
            .method_ref("java/io/PrintStream", "println", "(Ljava/lang/String;)V")
            .interface_method_ref("java/lang/Runnable", "run", "()V")
            .build();
        let class = parse_class("Foo.class", &bytes).unwrap();

        let rendered: Vec<String> = class.references.iter().map(|m| m.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "Baz qux: int",
                "java.io.PrintStream println(java.lang.String): void",
                "java.lang.Runnable run(): void",
            ]
        );
    }

    #[test]
    fn test_wide_constants_take_two_slots() {
        let bytes = ClassBuilder::new("Foo")
            .long_constant(1 << 40)
            .method_ref("Bar", "run", "()V")
            .long_constant(-1)
            .field_ref("Bar", "count", "J")
            .build();
        let class = parse_class("Foo.class", &bytes).unwrap();
        assert_eq!(class.references.len(), 2);
        assert_eq!(class.references[1].to_string(), "Bar count: long");
    }

    #[test]
    fn test_array_owner_reference() {
        let bytes = ClassBuilder::new("Foo")
            .method_ref("[Ljava/lang/String;", "clone", "()Ljava/lang/Object;")
            .build();
        let class = parse_class("Foo.class", &bytes).unwrap();
        assert_eq!(class.references[0].declaring_type().as_str(), "[Ljava/lang/String;");
    }

    #[test]
    fn test_rejects_truncated() {
        let bytes = ClassBuilder::new("Foo").method("bar", "()V").build();
        let err = parse_class("Foo.class", &bytes[..bytes.len() - 6]).unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert!(parse_class("x.class", b"\xCA\xFE\xBA\xBF\0\0\0\0").is_err());
        assert!(!is_class_file(b"PK\x03\x04"));
    }
}
