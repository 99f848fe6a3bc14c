use crate::primitive::{PrimitiveType, POINTER_ALIGN, POINTER_SIZE};
use crate::registry::{LayoutError, TypeRegistry};

/// A resolved RT-Micro-C type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Primitive(PrimitiveType),
    Pointer(Box<Type>),
    Array(Box<Type>, u32),
    Struct(String),
    Union(String),
    /// `message<T>` — the element type a channel carries.
    Message(Box<Type>),
}

impl Type {
    pub fn pointer_to(self) -> Type {
        Type::Pointer(Box::new(self))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Primitive(p) if p.is_numeric())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Void))
    }

    pub fn is_struct_or_union(&self) -> bool {
        matches!(self, Type::Struct(_) | Type::Union(_))
    }

    pub fn deref(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// `sizeof`: primitives fixed, pointers 8 bytes regardless of pointee,
    /// arrays `N * sizeof(T)`, named aggregates looked up in the registry's
    /// layout table.
    pub fn size_of(&self, registry: &TypeRegistry) -> Result<u32, LayoutError> {
        match self {
            Type::Primitive(p) => Ok(p.size()),
            Type::Pointer(_) => Ok(POINTER_SIZE),
            Type::Array(elem, count) => Ok(elem.size_of(registry)?.saturating_mul(*count)),
            Type::Struct(name) | Type::Union(name) => {
                Ok(registry.layout(name)?.size)
            }
            Type::Message(_) => Ok(POINTER_SIZE),
        }
    }

    pub fn align_of(&self, registry: &TypeRegistry) -> Result<u32, LayoutError> {
        match self {
            Type::Primitive(p) => Ok(p.align()),
            Type::Pointer(_) => Ok(POINTER_ALIGN),
            Type::Array(elem, _) => elem.align_of(registry),
            Type::Struct(name) | Type::Union(name) => {
                Ok(registry.layout(name)?.align)
            }
            Type::Message(_) => Ok(POINTER_ALIGN),
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p.keyword()),
            Type::Pointer(inner) => write!(f, "{inner}*"),
            Type::Array(elem, n) => write!(f, "{elem}[{n}]"),
            Type::Struct(name) => write!(f, "struct {name}"),
            Type::Union(name) => write!(f, "union {name}"),
            Type::Message(elem) => write!(f, "message<{elem}>"),
        }
    }
}
