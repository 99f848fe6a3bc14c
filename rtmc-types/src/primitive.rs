/// The primitive (non-aggregate, non-pointer) types of RT-Micro-C.
///
/// `char`/`bool` are one byte, `int`/`float` are four, `void` has neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Int,
    Float,
    Char,
    Bool,
    Void,
}

impl PrimitiveType {
    pub const fn size(self) -> u32 {
        match self {
            PrimitiveType::Int => 4,
            PrimitiveType::Float => 4,
            PrimitiveType::Char => 1,
            PrimitiveType::Bool => 1,
            PrimitiveType::Void => 0,
        }
    }

    /// Natural alignment; equal to size for every primitive but `void`.
    pub const fn align(self) -> u32 {
        match self {
            PrimitiveType::Void => 1,
            other => other.size(),
        }
    }

    pub const fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveType::Void)
    }

    pub const fn keyword(self) -> &'static str {
        match self {
            PrimitiveType::Int => "int",
            PrimitiveType::Float => "float",
            PrimitiveType::Char => "char",
            PrimitiveType::Bool => "bool",
            PrimitiveType::Void => "void",
        }
    }
}

/// Pointer size in the generated bytecode: fixed at 8 bytes for a 64-bit
/// host VM and applied consistently across `sizeof`, layout, and codegen.
pub const POINTER_SIZE: u32 = 8;
pub const POINTER_ALIGN: u32 = 8;
