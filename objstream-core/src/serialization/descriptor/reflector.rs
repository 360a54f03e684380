//! Bulk field transfer between wire layouts and instance storage.

use crate::serialization::descriptor::{FieldLayout, StreamField};
use crate::serialization::heap::{InstanceSlot, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
struct PrimMapping {
    wire_offset: usize,
    size: usize,
    storage_offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ObjMapping {
    storage_index: usize,
    signature: String,
}

/// Maps a descriptor's wire fields onto one class level's storage.
///
/// Wire fields without local storage are "filler": their values are read and dropped,
/// and written as zero or null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldReflector {
    class_name: Option<String>,
    prims: Vec<PrimMapping>,
    objs: Vec<Option<ObjMapping>>,
}

impl FieldReflector {
    /// Builds a reflector for `fields` against `storage`.
    ///
    /// `bound` says, per wire field, whether a matching local serializable field exists;
    /// a bound field still needs storage with an identical signature to be transferred.
    pub fn new(fields: &[StreamField], bound: &[bool], storage: Option<&FieldLayout>) -> Self {
        let mut prims = Vec::new();
        let mut objs = Vec::new();
        for (field, &is_bound) in fields.iter().zip(bound.iter()) {
            let target = storage
                .filter(|_| is_bound)
                .and_then(|layout| layout.field(field.name()))
                .filter(|sf| sf.field_type() == field.field_type())
                .filter(|sf| field.is_primitive() || sf.signature() == field.signature());
            if field.is_primitive() {
                prims.push(PrimMapping {
                    wire_offset: field.offset(),
                    size: field.field_type().primitive_size(),
                    storage_offset: target.map(|sf| sf.offset()),
                });
            } else {
                objs.push(target.map(|sf| ObjMapping {
                    storage_index: sf.offset(),
                    signature: sf.signature().to_string(),
                }));
            }
        }
        Self {
            class_name: storage.map(|s| s.class_name().to_string()),
            prims,
            objs,
        }
    }

    /// A reflector that treats every field as filler.
    pub fn filler(fields: &[StreamField]) -> Self {
        let bound = vec![false; fields.len()];
        Self::new(fields, &bound, None)
    }

    /// Class level whose storage this reflector targets.
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// Returns true if the `index`th object field has local storage.
    pub fn is_obj_bound(&self, index: usize) -> bool {
        matches!(self.objs.get(index), Some(Some(_)))
    }

    /// Declared local type signature of the `index`th object field.
    pub fn obj_signature(&self, index: usize) -> Option<&str> {
        self.objs
            .get(index)
            .and_then(|m| m.as_ref())
            .map(|m| m.signature.as_str())
    }

    /// Copies primitive field values from storage into a wire primitive block.
    pub fn get_prim_values(&self, slot: &InstanceSlot, out: &mut [u8]) {
        for m in &self.prims {
            let dst = &mut out[m.wire_offset..m.wire_offset + m.size];
            match m.storage_offset {
                Some(off) => dst.copy_from_slice(&slot.prims()[off..off + m.size]),
                None => dst.fill(0),
            }
        }
    }

    /// Copies a wire primitive block into storage, skipping filler.
    pub fn set_prim_values(&self, slot: &mut InstanceSlot, data: &[u8]) {
        for m in &self.prims {
            if let Some(off) = m.storage_offset {
                slot.prims_mut()[off..off + m.size]
                    .copy_from_slice(&data[m.wire_offset..m.wire_offset + m.size]);
            }
        }
    }

    /// Returns object field values in wire order, null for filler.
    pub fn get_obj_values(&self, slot: &InstanceSlot) -> Vec<Value> {
        self.objs
            .iter()
            .map(|m| match m {
                Some(m) => slot.objs()[m.storage_index],
                None => Value::Null,
            })
            .collect()
    }

    /// Stores object field values given in wire order, skipping filler.
    pub fn set_obj_values(&self, slot: &mut InstanceSlot, values: &[Value]) {
        for (m, v) in self.objs.iter().zip(values.iter()) {
            if let Some(m) = m {
                slot.objs_mut()[m.storage_index] = *v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::descriptor::{compute_offsets, FieldType};
    use crate::serialization::registry::FieldDef;
    use std::sync::Arc;

    fn wire(fields: &[(&str, &str)]) -> Vec<StreamField> {
        let mut fields: Vec<_> = fields
            .iter()
            .map(|(n, s)| StreamField::new(*n, *s, false).unwrap())
            .collect();
        compute_offsets("T", &mut fields).unwrap();
        fields
    }

    fn storage() -> Arc<FieldLayout> {
        Arc::new(
            FieldLayout::new(
                "T",
                &[
                    FieldDef::new("x", FieldType::Int),
                    FieldDef::new("y", FieldType::Long),
                    FieldDef::of_class("name", "java.lang.String"),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_prim_round_trip_through_storage() {
        let fields = wire(&[("x", "I"), ("y", "J")]);
        let layout = storage();
        let reflector = FieldReflector::new(&fields, &[true, true], Some(&layout));
        let mut slot = InstanceSlot::new(layout);

        let data = [0, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0, 9];
        reflector.set_prim_values(&mut slot, &data);
        assert_eq!(slot.get("x"), Some(Value::Int(7)));
        assert_eq!(slot.get("y"), Some(Value::Long(9)));

        let mut out = [0u8; 12];
        reflector.get_prim_values(&slot, &mut out);
        assert_eq!(out, data);
    }

    #[test]
    fn test_unknown_wire_field_is_filler() {
        let fields = wire(&[("gone", "I"), ("x", "I")]);
        let layout = storage();
        let reflector = FieldReflector::new(&fields, &[true, true], Some(&layout));
        let mut slot = InstanceSlot::new(layout);
        reflector.set_prim_values(&mut slot, &[0, 0, 0, 1, 0, 0, 0, 2]);
        assert_eq!(slot.get("x"), Some(Value::Int(2)));

        let mut out = [0xFFu8; 8];
        reflector.get_prim_values(&slot, &mut out);
        assert_eq!(out, [0, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn test_unbound_field_not_transferred() {
        let fields = wire(&[("x", "I")]);
        let layout = storage();
        let reflector = FieldReflector::new(&fields, &[false], Some(&layout));
        let mut slot = InstanceSlot::new(layout);
        reflector.set_prim_values(&mut slot, &[0, 0, 0, 5]);
        assert_eq!(slot.get("x"), Some(Value::Int(0)));
    }

    #[test]
    fn test_object_signature_mismatch_is_filler() {
        let fields = wire(&[("name", "Ljava/lang/Integer;")]);
        let layout = storage();
        let reflector = FieldReflector::new(&fields, &[true], Some(&layout));
        assert!(!reflector.is_obj_bound(0));
        assert_eq!(reflector.obj_signature(0), None);
    }

    #[test]
    fn test_obj_values() {
        let fields = wire(&[("name", "Ljava/lang/String;"), ("other", "Ljava/lang/Object;")]);
        let layout = storage();
        let reflector = FieldReflector::new(&fields, &[true, true], Some(&layout));
        assert!(reflector.is_obj_bound(0));
        assert!(!reflector.is_obj_bound(1));
        assert_eq!(reflector.obj_signature(0), Some("Ljava/lang/String;"));

        let mut slot = InstanceSlot::new(layout);
        reflector.set_obj_values(&mut slot, &[Value::Int(1), Value::Int(2)]);
        assert_eq!(
            reflector.get_obj_values(&slot),
            vec![Value::Int(1), Value::Null]
        );
    }

    #[test]
    fn test_filler_reflector() {
        let fields = wire(&[("x", "I")]);
        let reflector = FieldReflector::filler(&fields);
        assert_eq!(reflector.class_name(), None);
    }
}
