//! JVM opcodes
//!
//! Only the subset the managed backend emits, numbered as in JVMS chapter 6.

/// JVM instruction opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,
    IconstM1 = 0x02,
    Iconst0 = 0x03,
    Iconst1 = 0x04,
    Iconst2 = 0x05,
    Iconst3 = 0x06,
    Iconst4 = 0x07,
    Iconst5 = 0x08,
    Bipush = 0x10,
    Sipush = 0x11,
    Ldc = 0x12,
    LdcW = 0x13,
    Iload = 0x15,
    Aload = 0x19,
    Iload0 = 0x1a,
    Aload0 = 0x2a,
    Istore = 0x36,
    Astore = 0x3a,
    Istore0 = 0x3b,
    Astore0 = 0x4b,
    Pop = 0x57,
    Dup = 0x59,
    Swap = 0x5f,
    Iadd = 0x60,
    Isub = 0x64,
    Imul = 0x68,
    Idiv = 0x6c,
    Irem = 0x70,
    Ineg = 0x74,
    Iand = 0x7e,
    Ior = 0x80,
    IfIcmpeq = 0x9f,
    IfIcmpne = 0xa0,
    IfIcmplt = 0xa1,
    IfIcmpge = 0xa2,
    IfIcmpgt = 0xa3,
    IfIcmple = 0xa4,
    Goto = 0xa7,
    Return = 0xb1,
    Getstatic = 0xb2,
    Invokevirtual = 0xb6,
    Invokespecial = 0xb7,
    Invokestatic = 0xb8,
    New = 0xbb,
    Wide = 0xc4,
}

impl Opcode {
    /// `iconst_<n>` for -1..=5
    pub fn iconst(value: i32) -> Option<Opcode> {
        let op = match value {
            -1 => Opcode::IconstM1,
            0 => Opcode::Iconst0,
            1 => Opcode::Iconst1,
            2 => Opcode::Iconst2,
            3 => Opcode::Iconst3,
            4 => Opcode::Iconst4,
            5 => Opcode::Iconst5,
            _ => return None,
        };
        Some(op)
    }

    /// Base of the one-byte `<op>_<n>` family for a local-variable opcode
    pub fn short_form_base(self) -> Option<u8> {
        match self {
            Opcode::Iload => Some(Opcode::Iload0 as u8),
            Opcode::Aload => Some(Opcode::Aload0 as u8),
            Opcode::Istore => Some(Opcode::Istore0 as u8),
            Opcode::Astore => Some(Opcode::Astore0 as u8),
            _ => None,
        }
    }

    /// `(pops, pushes)` for opcodes whose effect does not depend on an operand
    pub fn stack_effect(self) -> (u16, u16) {
        match self {
            Opcode::Nop | Opcode::Goto | Opcode::Return | Opcode::Wide => (0, 0),
            Opcode::IconstM1
            | Opcode::Iconst0
            | Opcode::Iconst1
            | Opcode::Iconst2
            | Opcode::Iconst3
            | Opcode::Iconst4
            | Opcode::Iconst5
            | Opcode::Bipush
            | Opcode::Sipush
            | Opcode::Ldc
            | Opcode::LdcW
            | Opcode::Iload
            | Opcode::Aload
            | Opcode::Iload0
            | Opcode::Aload0
            | Opcode::Getstatic
            | Opcode::New => (0, 1),
            Opcode::Istore | Opcode::Astore | Opcode::Istore0 | Opcode::Astore0 | Opcode::Pop => {
                (1, 0)
            }
            Opcode::Dup => (1, 2),
            Opcode::Swap => (2, 2),
            Opcode::Iadd
            | Opcode::Isub
            | Opcode::Imul
            | Opcode::Idiv
            | Opcode::Irem
            | Opcode::Iand
            | Opcode::Ior => (2, 1),
            Opcode::Ineg => (1, 1),
            Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple => (2, 0),
            // invoke* depend on the descriptor; callers supply the effect
            Opcode::Invokevirtual | Opcode::Invokespecial | Opcode::Invokestatic => (0, 0),
        }
    }

    pub fn is_conditional_branch(self) -> bool {
        matches!(
            self,
            Opcode::IfIcmpeq
                | Opcode::IfIcmpne
                | Opcode::IfIcmplt
                | Opcode::IfIcmpge
                | Opcode::IfIcmpgt
                | Opcode::IfIcmple
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::IconstM1 => "iconst_m1",
            Opcode::Iconst0 => "iconst_0",
            Opcode::Iconst1 => "iconst_1",
            Opcode::Iconst2 => "iconst_2",
            Opcode::Iconst3 => "iconst_3",
            Opcode::Iconst4 => "iconst_4",
            Opcode::Iconst5 => "iconst_5",
            Opcode::Bipush => "bipush",
            Opcode::Sipush => "sipush",
            Opcode::Ldc => "ldc",
            Opcode::LdcW => "ldc_w",
            Opcode::Iload => "iload",
            Opcode::Aload => "aload",
            Opcode::Iload0 => "iload_0",
            Opcode::Aload0 => "aload_0",
            Opcode::Istore => "istore",
            Opcode::Astore => "astore",
            Opcode::Istore0 => "istore_0",
            Opcode::Astore0 => "astore_0",
            Opcode::Pop => "pop",
            Opcode::Dup => "dup",
            Opcode::Swap => "swap",
            Opcode::Iadd => "iadd",
            Opcode::Isub => "isub",
            Opcode::Imul => "imul",
            Opcode::Idiv => "idiv",
            Opcode::Irem => "irem",
            Opcode::Ineg => "ineg",
            Opcode::Iand => "iand",
            Opcode::Ior => "ior",
            Opcode::IfIcmpeq => "if_icmpeq",
            Opcode::IfIcmpne => "if_icmpne",
            Opcode::IfIcmplt => "if_icmplt",
            Opcode::IfIcmpge => "if_icmpge",
            Opcode::IfIcmpgt => "if_icmpgt",
            Opcode::IfIcmple => "if_icmple",
            Opcode::Goto => "goto",
            Opcode::Return => "return",
            Opcode::Getstatic => "getstatic",
            Opcode::Invokevirtual => "invokevirtual",
            Opcode::Invokespecial => "invokespecial",
            Opcode::Invokestatic => "invokestatic",
            Opcode::New => "new",
            Opcode::Wide => "wide",
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}
