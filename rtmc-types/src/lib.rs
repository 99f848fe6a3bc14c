//! Type system and struct/union layout computation for RT-Micro-C.
//!
//! Mirrors the role `fuel-types` plays for `fuel-vm`: the shared vocabulary
//! (`Type`, `StructLayout`, `FieldDescriptor`) that both the semantic
//! analyzer and the bytecode generator read, computed exactly once and
//! immutable afterwards.

mod layout;
mod primitive;
mod registry;
mod ty;

pub use layout::{
    align_up, FieldDescriptor, StructKind, StructLayout, STORAGE_UNIT_BITS, STORAGE_UNIT_BYTES,
};
pub use primitive::{PrimitiveType, POINTER_ALIGN, POINTER_SIZE};
pub use registry::{FieldSpec, LayoutError, RawLayout, TypeRegistry};
pub use ty::Type;
