//! Class-file serialization
//!
//! 类文件格式：所有多字节数据均为大端序。
//! Only what the managed backend needs: no fields, no interfaces, methods with a
//! `Code` attribute and an optional `LocalVariableTable`.

use crate::backends::error::{CodegenError, CodegenResult};
use crate::backends::jvm::buffer::ConstantPool;
use crate::backends::jvm::emitter::MethodCode;
use std::io::{self, Write};

/// 0xCAFEBABE
pub const MAGIC: u32 = 0xCAFE_BABE;
/// Java 6. Verifiers accept it without a `StackMapTable`.
pub const MAJOR_VERSION: u16 = 50;
pub const MINOR_VERSION: u16 = 0;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SUPER: u16 = 0x0020;

/// One `LocalVariableTable` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub slot: u16,
}

/// `Code` attribute
#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    /// Present when debug info is requested
    pub local_variables: Option<Vec<LocalVariable>>,
}

impl CodeAttribute {
    /// Attribute body length, excluding the 6-byte attribute header
    fn body_len(&self) -> u32 {
        let nested = self
            .local_variables
            .as_ref()
            .map_or(0, |vars| 6 + 2 + 10 * vars.len());
        (2 + 2 + 4 + self.code.len() + 2 + 2 + nested) as u32
    }
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub code: CodeAttribute,
}

/// A class under construction and its serialized form
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub methods: Vec<MethodInfo>,
    code_name: u16,
    local_variable_table_name: Option<u16>,
}

impl ClassFile {
    /// Public class `name` extending `super_name`, both internal names
    pub fn new(
        name: &str,
        super_name: &str,
    ) -> CodegenResult<Self> {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.class(name)?;
        let super_class = constant_pool.class(super_name)?;
        let code_name = constant_pool.utf8("Code")?;
        Ok(ClassFile {
            constant_pool,
            access_flags: ACC_PUBLIC | ACC_SUPER,
            this_class,
            super_class,
            methods: Vec::new(),
            code_name,
            local_variable_table_name: None,
        })
    }

    /// Add a method. `locals` lists `(name, descriptor, slot)` debug entries
    /// covering the whole body; pass an empty slice to omit the table.
    pub fn add_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        method: MethodCode,
        max_locals: u16,
        locals: &[(&str, &str, u16)],
    ) -> CodegenResult<()> {
        let name_index = self.constant_pool.utf8(name)?;
        let descriptor_index = self.constant_pool.utf8(descriptor)?;

        let local_variables = if locals.is_empty() {
            None
        } else {
            if self.local_variable_table_name.is_none() {
                self.local_variable_table_name = Some(self.constant_pool.utf8("LocalVariableTable")?);
            }
            let length = u16::try_from(method.code.len())
                .map_err(|_| CodegenError::CodeTooLarge {
                    len: method.code.len(),
                })?;
            let mut entries = Vec::with_capacity(locals.len());
            for &(local_name, local_descriptor, slot) in locals {
                entries.push(LocalVariable {
                    start_pc: 0,
                    length,
                    name_index: self.constant_pool.utf8(local_name)?,
                    descriptor_index: self.constant_pool.utf8(local_descriptor)?,
                    slot,
                });
            }
            Some(entries)
        };

        self.methods.push(MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            code: CodeAttribute {
                max_stack: method.max_stack,
                max_locals,
                code: method.code,
                local_variables,
            },
        });
        Ok(())
    }

    pub fn write_to<W: Write>(
        &self,
        writer: &mut W,
    ) -> io::Result<()> {
        writer.write_all(&MAGIC.to_be_bytes())?;
        writer.write_all(&MINOR_VERSION.to_be_bytes())?;
        writer.write_all(&MAJOR_VERSION.to_be_bytes())?;

        self.constant_pool.write_to(writer)?;

        writer.write_all(&self.access_flags.to_be_bytes())?;
        writer.write_all(&self.this_class.to_be_bytes())?;
        writer.write_all(&self.super_class.to_be_bytes())?;
        writer.write_all(&0u16.to_be_bytes())?; // interfaces
        writer.write_all(&0u16.to_be_bytes())?; // fields

        writer.write_all(&(self.methods.len() as u16).to_be_bytes())?;
        for method in &self.methods {
            writer.write_all(&method.access_flags.to_be_bytes())?;
            writer.write_all(&method.name_index.to_be_bytes())?;
            writer.write_all(&method.descriptor_index.to_be_bytes())?;
            writer.write_all(&1u16.to_be_bytes())?;
            self.write_code(writer, &method.code)?;
        }

        writer.write_all(&0u16.to_be_bytes())?; // class attributes
        Ok(())
    }

    fn write_code<W: Write>(
        &self,
        writer: &mut W,
        attribute: &CodeAttribute,
    ) -> io::Result<()> {
        writer.write_all(&self.code_name.to_be_bytes())?;
        writer.write_all(&attribute.body_len().to_be_bytes())?;
        writer.write_all(&attribute.max_stack.to_be_bytes())?;
        writer.write_all(&attribute.max_locals.to_be_bytes())?;
        writer.write_all(&(attribute.code.len() as u32).to_be_bytes())?;
        writer.write_all(&attribute.code)?;
        writer.write_all(&0u16.to_be_bytes())?; // exception table

        match (&attribute.local_variables, self.local_variable_table_name) {
            (Some(vars), Some(table_name)) => {
                writer.write_all(&1u16.to_be_bytes())?;
                writer.write_all(&table_name.to_be_bytes())?;
                writer.write_all(&((2 + 10 * vars.len()) as u32).to_be_bytes())?;
                writer.write_all(&(vars.len() as u16).to_be_bytes())?;
                for var in vars {
                    writer.write_all(&var.start_pc.to_be_bytes())?;
                    writer.write_all(&var.length.to_be_bytes())?;
                    writer.write_all(&var.name_index.to_be_bytes())?;
                    writer.write_all(&var.descriptor_index.to_be_bytes())?;
                    writer.write_all(&var.slot.to_be_bytes())?;
                }
            }
            _ => writer.write_all(&0u16.to_be_bytes())?,
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> CodegenResult<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }
}
