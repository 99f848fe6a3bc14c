use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::layout::{
    align_up, FieldDescriptor, StructKind, StructLayout, STORAGE_UNIT_BITS, STORAGE_UNIT_BYTES,
};
use crate::primitive::{POINTER_ALIGN, POINTER_SIZE};
use crate::ty::Type;

/// Errors raised while computing struct/union layouts. Distinct from the
/// analyzer's broader `SemaError` so this crate has no dependency on the
/// rest of the compiler; `rtmc::sema` wraps these with `#[from]`, the way
/// `fuel-vm::error::InterpreterError` wraps `VmValidationError`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("type `{0}` is not declared")]
    UnknownType(String),
    #[error("struct `{0}` contains itself without an intervening pointer")]
    CircularType(String),
    #[error("bit-field width {width} is out of range 1..=32")]
    BadBitFieldWidth { width: u32 },
}

/// An as-yet-unplaced field, as handed to the registry by the parser's
/// struct/union body. `Anonymous` fields splice their own fields directly
/// into the enclosing layout.
#[derive(Debug, Clone)]
pub enum FieldSpec {
    Plain {
        name: String,
        ty: Type,
        bit_width: Option<u32>,
    },
    Anonymous(RawLayout),
}

/// The unresolved body of a struct or union declaration.
#[derive(Debug, Clone)]
pub struct RawLayout {
    pub kind: StructKind,
    pub fields: Vec<FieldSpec>,
}

/// Struct/union name → layout, built in two phases: phase 1 registers
/// every name with a placeholder so mutually-referencing pointer types
/// resolve; phase 2 fills in the real layouts, rejecting non-pointer
/// cycles as `CircularType`.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    layouts: HashMap<String, Option<StructLayout>>,
    pending: HashMap<String, RawLayout>,
    group_counter: u32,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_placeholder(&mut self, name: &str) {
        self.layouts.entry(name.to_string()).or_insert(None);
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    pub fn stage(&mut self, name: &str, raw: RawLayout) {
        self.pending.insert(name.to_string(), raw);
    }

    /// Resolves every staged declaration's layout. Order-independent:
    /// whichever name is resolved first recursively resolves whatever it
    /// depends on.
    pub fn resolve_all(&mut self) -> Result<(), LayoutError> {
        let names: Vec<String> = self.pending.keys().cloned().collect();
        for name in names {
            self.resolve(&name, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Read-only lookup for a fully resolved layout; used by `Type::size_of`
    /// after analysis has completed phase 1.
    pub fn layout(&self, name: &str) -> Result<&StructLayout, LayoutError> {
        match self.layouts.get(name) {
            Some(Some(layout)) => Ok(layout),
            _ => Err(LayoutError::UnknownType(name.to_string())),
        }
    }

    /// Resolves `.`/`->` access on `type_name`, following the
    /// first-field-is-struct inheritance chain when the
    /// field isn't found directly.
    pub fn resolve_member(&self, type_name: &str, field_name: &str) -> Option<&FieldDescriptor> {
        let mut current = type_name.to_string();
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(current.clone()) {
                return None;
            }
            let layout = self.layouts.get(&current)?.as_ref()?;
            if let Some(field) = layout.field(field_name) {
                return Some(field);
            }
            match layout.base_field() {
                Some(base) if base.byte_offset == 0 => match &base.ty {
                    Type::Struct(name) | Type::Union(name) => current = name.clone(),
                    _ => return None,
                },
                _ => return None,
            }
        }
    }

    fn resolve(&mut self, name: &str, stack: &mut Vec<String>) -> Result<StructLayout, LayoutError> {
        match self.layouts.get(name) {
            Some(Some(layout)) => return Ok(layout.clone()),
            Some(None) => {}
            None => return Err(LayoutError::UnknownType(name.to_string())),
        }
        if stack.iter().any(|s| s == name) {
            return Err(LayoutError::CircularType(name.to_string()));
        }
        let raw = self
            .pending
            .get(name)
            .cloned()
            .ok_or_else(|| LayoutError::UnknownType(name.to_string()))?;

        stack.push(name.to_string());
        let (fields, size, align) = self.layout_fields(raw.kind, &raw.fields, stack)?;
        stack.pop();

        let layout = StructLayout {
            name: name.to_string(),
            kind: raw.kind,
            size,
            align,
            fields,
        };
        self.layouts.insert(name.to_string(), Some(layout.clone()));
        Ok(layout)
    }

    fn type_size(&mut self, ty: &Type, stack: &mut Vec<String>) -> Result<u32, LayoutError> {
        match ty {
            Type::Primitive(p) => Ok(p.size()),
            Type::Pointer(_) => Ok(POINTER_SIZE),
            Type::Array(elem, count) => Ok(self.type_size(elem, stack)?.saturating_mul(*count)),
            Type::Struct(name) | Type::Union(name) => Ok(self.resolve(name, stack)?.size),
            Type::Message(_) => Ok(POINTER_SIZE),
        }
    }

    fn type_align(&mut self, ty: &Type, stack: &mut Vec<String>) -> Result<u32, LayoutError> {
        match ty {
            Type::Primitive(p) => Ok(p.align()),
            Type::Pointer(_) => Ok(POINTER_ALIGN),
            Type::Array(elem, _) => self.type_align(elem, stack),
            Type::Struct(name) | Type::Union(name) => Ok(self.resolve(name, stack)?.align),
            Type::Message(_) => Ok(POINTER_ALIGN),
        }
    }

    /// The packing algorithm shared by top-level declarations and anonymous
    /// nested groups: a struct places fields sequentially, opening a new
    /// 32-bit storage unit whenever the next bit-field would overflow the
    /// current one; a union places every alternative
    /// at offset 0 and takes the maximum size.
    fn layout_fields(
        &mut self,
        kind: StructKind,
        fields: &[FieldSpec],
        stack: &mut Vec<String>,
    ) -> Result<(Vec<FieldDescriptor>, u32, u32), LayoutError> {
        match kind {
            StructKind::Struct => self.layout_struct_fields(fields, stack),
            StructKind::Union => self.layout_union_fields(fields, stack),
        }
    }

    fn layout_struct_fields(
        &mut self,
        fields: &[FieldSpec],
        stack: &mut Vec<String>,
    ) -> Result<(Vec<FieldDescriptor>, u32, u32), LayoutError> {
        let mut out = Vec::new();
        let mut max_align: u32 = 1;
        let mut offset: u32 = 0;
        let mut unit_start: Option<u32> = None;
        let mut unit_used_bits: u32 = 0;

        for spec in fields {
            match spec {
                FieldSpec::Plain {
                    name,
                    ty,
                    bit_width: Some(width),
                } => {
                    let width = *width;
                    if width == 0 || width > STORAGE_UNIT_BITS {
                        return Err(LayoutError::BadBitFieldWidth { width });
                    }
                    let opens_new_unit = match unit_start {
                        None => true,
                        Some(_) => unit_used_bits + width > STORAGE_UNIT_BITS,
                    };
                    if opens_new_unit {
                        offset = align_up(offset, STORAGE_UNIT_BYTES);
                        unit_start = Some(offset);
                        unit_used_bits = 0;
                        offset += STORAGE_UNIT_BYTES;
                    }
                    let byte_offset = unit_start.expect("unit opened above");
                    let bit_offset = unit_used_bits;
                    unit_used_bits += width;
                    max_align = max_align.max(STORAGE_UNIT_BYTES);
                    out.push(FieldDescriptor {
                        name: name.clone(),
                        ty: ty.clone(),
                        byte_offset,
                        bit_offset: Some(bit_offset),
                        bit_width: Some(width),
                        group_id: None,
                    });
                }
                FieldSpec::Plain {
                    name,
                    ty,
                    bit_width: None,
                } => {
                    unit_start = None;
                    unit_used_bits = 0;
                    let align = self.type_align(ty, stack)?;
                    let size = self.type_size(ty, stack)?;
                    offset = align_up(offset, align.max(1));
                    max_align = max_align.max(align);
                    out.push(FieldDescriptor {
                        name: name.clone(),
                        ty: ty.clone(),
                        byte_offset: offset,
                        bit_offset: None,
                        bit_width: None,
                        group_id: None,
                    });
                    offset += size;
                }
                FieldSpec::Anonymous(raw) => {
                    unit_start = None;
                    unit_used_bits = 0;
                    let group = self.next_group();
                    let (nested, nested_size, nested_align) =
                        self.layout_fields(raw.kind, &raw.fields, stack)?;
                    offset = align_up(offset, nested_align.max(1));
                    max_align = max_align.max(nested_align);
                    let group_start = offset;
                    for field in nested {
                        out.push(FieldDescriptor {
                            byte_offset: group_start + field.byte_offset,
                            group_id: Some(group),
                            ..field
                        });
                    }
                    offset += nested_size;
                }
            }
        }

        let occupied = match unit_start {
            Some(u) => offset.max(u + STORAGE_UNIT_BYTES),
            None => offset,
        };
        let size = align_up(occupied, max_align.max(1));
        Ok((out, size, max_align.max(1)))
    }

    fn layout_union_fields(
        &mut self,
        fields: &[FieldSpec],
        stack: &mut Vec<String>,
    ) -> Result<(Vec<FieldDescriptor>, u32, u32), LayoutError> {
        let mut out = Vec::new();
        let mut max_align: u32 = 1;
        let mut size: u32 = 0;

        for spec in fields {
            match spec {
                FieldSpec::Plain {
                    name,
                    ty,
                    bit_width: Some(width),
                } => {
                    let width = *width;
                    if width == 0 || width > STORAGE_UNIT_BITS {
                        return Err(LayoutError::BadBitFieldWidth { width });
                    }
                    max_align = max_align.max(STORAGE_UNIT_BYTES);
                    size = size.max(STORAGE_UNIT_BYTES);
                    out.push(FieldDescriptor {
                        name: name.clone(),
                        ty: ty.clone(),
                        byte_offset: 0,
                        bit_offset: Some(0),
                        bit_width: Some(width),
                        group_id: None,
                    });
                }
                FieldSpec::Plain {
                    name,
                    ty,
                    bit_width: None,
                } => {
                    let align = self.type_align(ty, stack)?;
                    let field_size = self.type_size(ty, stack)?;
                    max_align = max_align.max(align);
                    size = size.max(field_size);
                    out.push(FieldDescriptor {
                        name: name.clone(),
                        ty: ty.clone(),
                        byte_offset: 0,
                        bit_offset: None,
                        bit_width: None,
                        group_id: None,
                    });
                }
                FieldSpec::Anonymous(raw) => {
                    let group = self.next_group();
                    let (nested, nested_size, nested_align) =
                        self.layout_fields(raw.kind, &raw.fields, stack)?;
                    max_align = max_align.max(nested_align);
                    size = size.max(nested_size);
                    for field in nested {
                        out.push(FieldDescriptor {
                            group_id: Some(group),
                            ..field
                        });
                    }
                }
            }
        }

        let total = align_up(size, max_align.max(1));
        Ok((out, total, max_align.max(1)))
    }

    fn next_group(&mut self) -> u32 {
        let id = self.group_counter;
        self.group_counter += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::PrimitiveType;

    fn int_field(name: &str, bit_width: Option<u32>) -> FieldSpec {
        FieldSpec::Plain {
            name: name.to_string(),
            ty: Type::Primitive(PrimitiveType::Int),
            bit_width,
        }
    }

    #[test]
    fn plain_struct_packs_without_padding_for_equal_sized_fields() {
        let mut reg = TypeRegistry::new();
        reg.declare_placeholder("Point");
        reg.stage(
            "Point",
            RawLayout {
                kind: StructKind::Struct,
                fields: vec![int_field("x", None), int_field("y", None)],
            },
        );
        reg.resolve_all().unwrap();
        let layout = reg.layout("Point").unwrap();
        assert_eq!(layout.size, 8);
        assert_eq!(layout.align, 4);
        assert_eq!(layout.field("x").unwrap().byte_offset, 0);
        assert_eq!(layout.field("y").unwrap().byte_offset, 4);
    }

    #[test]
    fn adjacent_bit_fields_share_one_storage_unit() {
        let mut reg = TypeRegistry::new();
        reg.declare_placeholder("Packed");
        reg.stage(
            "Packed",
            RawLayout {
                kind: StructKind::Struct,
                fields: vec![int_field("a", Some(16)), int_field("b", Some(16))],
            },
        );
        reg.resolve_all().unwrap();
        let layout = reg.layout("Packed").unwrap();
        assert_eq!(layout.size, 4);
        let a = layout.field("a").unwrap();
        let b = layout.field("b").unwrap();
        assert_eq!((a.byte_offset, a.bit_offset, a.bit_width), (0, Some(0), Some(16)));
        assert_eq!((b.byte_offset, b.bit_offset, b.bit_width), (0, Some(16), Some(16)));
    }

    #[test]
    fn overflowing_bit_field_opens_a_new_unit() {
        let mut reg = TypeRegistry::new();
        reg.declare_placeholder("Wide");
        reg.stage(
            "Wide",
            RawLayout {
                kind: StructKind::Struct,
                fields: vec![
                    int_field("a", Some(20)),
                    int_field("b", Some(20)),
                ],
            },
        );
        reg.resolve_all().unwrap();
        let layout = reg.layout("Wide").unwrap();
        let a = layout.field("a").unwrap();
        let b = layout.field("b").unwrap();
        assert_eq!(a.byte_offset, 0);
        assert_eq!(b.byte_offset, 4);
        assert_eq!(layout.size, 8);
    }

    #[test]
    fn union_alternatives_share_offset_zero_and_max_size() {
        let mut reg = TypeRegistry::new();
        reg.declare_placeholder("U");
        reg.stage(
            "U",
            RawLayout {
                kind: StructKind::Union,
                fields: vec![
                    FieldSpec::Plain {
                        name: "small".to_string(),
                        ty: Type::Primitive(PrimitiveType::Char),
                        bit_width: None,
                    },
                    int_field("big", None),
                ],
            },
        );
        reg.resolve_all().unwrap();
        let layout = reg.layout("U").unwrap();
        assert_eq!(layout.size, 4);
        assert_eq!(layout.field("small").unwrap().byte_offset, 0);
        assert_eq!(layout.field("big").unwrap().byte_offset, 0);
    }

    #[test]
    fn bit_field_union_overlay_matches_scenario_b() {
        // union { struct { int item1:16; int item2:16; }; int value; };
        let mut reg = TypeRegistry::new();
        reg.declare_placeholder("S");
        reg.stage(
            "S",
            RawLayout {
                kind: StructKind::Struct,
                fields: vec![FieldSpec::Anonymous(RawLayout {
                    kind: StructKind::Union,
                    fields: vec![
                        FieldSpec::Anonymous(RawLayout {
                            kind: StructKind::Struct,
                            fields: vec![int_field("item1", Some(16)), int_field("item2", Some(16))],
                        }),
                        int_field("value", None),
                    ],
                })],
            },
        );
        reg.resolve_all().unwrap();
        let layout = reg.layout("S").unwrap();
        assert_eq!(layout.size, 4);
        assert_eq!(layout.field("item1").unwrap().bit_offset, Some(0));
        assert_eq!(layout.field("item2").unwrap().bit_offset, Some(16));
        assert_eq!(layout.field("value").unwrap().byte_offset, 0);
    }

    #[test]
    fn non_pointer_cycle_is_rejected() {
        let mut reg = TypeRegistry::new();
        reg.declare_placeholder("A");
        reg.declare_placeholder("B");
        reg.stage(
            "A",
            RawLayout {
                kind: StructKind::Struct,
                fields: vec![FieldSpec::Plain {
                    name: "b".to_string(),
                    ty: Type::Struct("B".to_string()),
                    bit_width: None,
                }],
            },
        );
        reg.stage(
            "B",
            RawLayout {
                kind: StructKind::Struct,
                fields: vec![FieldSpec::Plain {
                    name: "a".to_string(),
                    ty: Type::Struct("A".to_string()),
                    bit_width: None,
                }],
            },
        );
        assert!(matches!(reg.resolve_all(), Err(LayoutError::CircularType(_))));
    }

    #[test]
    fn pointer_cycle_is_allowed() {
        let mut reg = TypeRegistry::new();
        reg.declare_placeholder("A");
        reg.declare_placeholder("B");
        reg.stage(
            "A",
            RawLayout {
                kind: StructKind::Struct,
                fields: vec![FieldSpec::Plain {
                    name: "b".to_string(),
                    ty: Type::Pointer(Box::new(Type::Struct("B".to_string()))),
                    bit_width: None,
                }],
            },
        );
        reg.stage(
            "B",
            RawLayout {
                kind: StructKind::Struct,
                fields: vec![FieldSpec::Plain {
                    name: "a".to_string(),
                    ty: Type::Pointer(Box::new(Type::Struct("A".to_string()))),
                    bit_width: None,
                }],
            },
        );
        reg.resolve_all().unwrap();
        assert_eq!(reg.layout("A").unwrap().size, POINTER_SIZE);
    }
}
