/// One entry of the constant pool.
/// Each distinct literal value is interned once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    I32(i32),
    U32(u32),
    F32(f32),
    /// A compile-time address constant (e.g. a function's entry point used
    /// to initialize a function-pointer argument to `StartTask`).
    Ptr(u32),
}

impl ConstantValue {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            ConstantValue::I32(_) => 0,
            ConstantValue::U32(_) => 1,
            ConstantValue::F32(_) => 2,
            ConstantValue::Ptr(_) => 3,
        }
    }

    pub(crate) fn to_bytes(self) -> [u8; 4] {
        match self {
            ConstantValue::I32(v) => v.to_le_bytes(),
            ConstantValue::U32(v) => v.to_le_bytes(),
            ConstantValue::F32(v) => v.to_le_bytes(),
            ConstantValue::Ptr(v) => v.to_le_bytes(),
        }
    }

    pub(crate) fn from_tagged(tag: u8, bytes: [u8; 4]) -> Option<Self> {
        Some(match tag {
            0 => ConstantValue::I32(i32::from_le_bytes(bytes)),
            1 => ConstantValue::U32(u32::from_le_bytes(bytes)),
            2 => ConstantValue::F32(f32::from_le_bytes(bytes)),
            3 => ConstantValue::Ptr(u32::from_le_bytes(bytes)),
            _ => return None,
        })
    }
}

/// A named function's entry address, written once per compiled function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: String,
    pub address: u32,
}

/// A named global/local symbol's address, written only in debug images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    pub address: u32,
}
