//! 常量池
//!
//! Class-file constant pool with deduplication. Indices are 1-based as the
//! class-file format requires; index 0 is never handed out.

use crate::backends::error::{CodegenError, CodegenResult};
use indexmap::IndexSet;
use std::io::{self, Write};

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_CLASS: u8 = 7;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_NAME_AND_TYPE: u8 = 12;

/// One constant pool entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Class(u16),
    NameAndType { name: u16, descriptor: u16 },
    Fieldref { class: u16, name_and_type: u16 },
    Methodref { class: u16, name_and_type: u16 },
}

/// Constant pool
#[derive(Debug, Default, Clone)]
pub struct ConstantPool {
    entries: IndexSet<PoolEntry>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, reusing an equal one when present. Returns its index.
    pub fn add(
        &mut self,
        entry: PoolEntry,
    ) -> CodegenResult<u16> {
        if let Some(position) = self.entries.get_index_of(&entry) {
            return Ok(position as u16 + 1);
        }
        // constant_pool_count is a u2 holding len + 1
        if self.entries.len() + 1 >= u16::MAX as usize {
            return Err(CodegenError::ConstantPoolOverflow);
        }
        let (position, _) = self.entries.insert_full(entry);
        Ok(position as u16 + 1)
    }

    pub fn get(
        &self,
        index: u16,
    ) -> Option<&PoolEntry> {
        (index as usize)
            .checked_sub(1)
            .and_then(|position| self.entries.get_index(position))
    }

    pub fn utf8(
        &mut self,
        text: &str,
    ) -> CodegenResult<u16> {
        if modified_utf8(text).len() > u16::MAX as usize {
            return Err(CodegenError::ConstantPoolOverflow);
        }
        self.add(PoolEntry::Utf8(text.to_string()))
    }

    pub fn integer(
        &mut self,
        value: i32,
    ) -> CodegenResult<u16> {
        self.add(PoolEntry::Integer(value))
    }

    /// `CONSTANT_Class` for an internal name such as `java/lang/Object`
    pub fn class(
        &mut self,
        internal_name: &str,
    ) -> CodegenResult<u16> {
        let name = self.utf8(internal_name)?;
        self.add(PoolEntry::Class(name))
    }

    pub fn name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> CodegenResult<u16> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        self.add(PoolEntry::NameAndType { name, descriptor })
    }

    pub fn field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> CodegenResult<u16> {
        let class = self.class(class)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        self.add(PoolEntry::Fieldref {
            class,
            name_and_type,
        })
    }

    pub fn method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> CodegenResult<u16> {
        let class = self.class(class)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        self.add(PoolEntry::Methodref {
            class,
            name_and_type,
        })
    }

    /// Number of entries (`constant_pool_count - 1`)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write `constant_pool_count` followed by every entry
    pub fn write_to<W: Write>(
        &self,
        writer: &mut W,
    ) -> io::Result<()> {
        writer.write_all(&(self.entries.len() as u16 + 1).to_be_bytes())?;
        for entry in &self.entries {
            match entry {
                PoolEntry::Utf8(text) => {
                    let bytes = modified_utf8(text);
                    writer.write_all(&[TAG_UTF8])?;
                    writer.write_all(&(bytes.len() as u16).to_be_bytes())?;
                    writer.write_all(&bytes)?;
                }
                PoolEntry::Integer(value) => {
                    writer.write_all(&[TAG_INTEGER])?;
                    writer.write_all(&value.to_be_bytes())?;
                }
                PoolEntry::Class(name) => {
                    writer.write_all(&[TAG_CLASS])?;
                    writer.write_all(&name.to_be_bytes())?;
                }
                PoolEntry::NameAndType { name, descriptor } => {
                    writer.write_all(&[TAG_NAME_AND_TYPE])?;
                    writer.write_all(&name.to_be_bytes())?;
                    writer.write_all(&descriptor.to_be_bytes())?;
                }
                PoolEntry::Fieldref {
                    class,
                    name_and_type,
                } => {
                    writer.write_all(&[TAG_FIELDREF])?;
                    writer.write_all(&class.to_be_bytes())?;
                    writer.write_all(&name_and_type.to_be_bytes())?;
                }
                PoolEntry::Methodref {
                    class,
                    name_and_type,
                } => {
                    writer.write_all(&[TAG_METHODREF])?;
                    writer.write_all(&class.to_be_bytes())?;
                    writer.write_all(&name_and_type.to_be_bytes())?;
                }
            }
        }
        Ok(())
    }
}

/// Java's modified UTF-8: NUL is two bytes, supplementary characters are
/// encoded as surrogate pairs of three bytes each.
pub fn modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        let unit = unit as u32;
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}
