//! Serialization of messages into wire bytes.
//!
//! Declared fields are emitted in ascending field-number order, unknown
//! fields after them in their preserved order, so a message decoded against
//! an older descriptor re-packs with the newer fields intact. Packing a
//! well-formed message never fails; output length always equals
//! [`packed_size`].

use crate::descriptor::{FieldDescriptor, FieldType, Label};
use crate::message::{FieldValue, Message, Value};
use crate::wire::{put_tag, put_varint, zigzag_encode32, zigzag_encode64, WireType};

use bytes::BufMut;
use tracing::trace;

use super::size::{packed_size, value_size};

/// Serialize `message` into a fresh buffer sized by [`packed_size`].
pub fn pack_to_vec(message: &Message) -> Vec<u8> {
    let size = packed_size(message);
    let mut buf = Vec::with_capacity(size);
    pack(message, &mut buf);
    debug_assert_eq!(buf.len(), size);
    buf
}

/// Serialize `message`, appending to any byte sink.
pub fn pack(message: &Message, out: &mut impl BufMut) {
    trace!(message = message.descriptor.name, "packing message");
    for (field, slot) in message.descriptor.fields.iter().zip(&message.slots) {
        put_field(field, slot, out);
    }
    for unknown in &message.unknown_fields {
        put_tag(out, unknown.tag, unknown.wire_type);
        out.put_slice(&unknown.data);
    }
}

fn put_field(field: &FieldDescriptor, slot: &FieldValue, out: &mut impl BufMut) {
    match slot {
        FieldValue::Unset => {
            // An unset required submessage is emitted with an empty body
            if let (Label::Required, FieldType::Message(_)) = (field.label, &field.kind) {
                put_tag(out, field.id, WireType::Len);
                out.put_u8(0);
            }
        }
        FieldValue::Single(value) => {
            put_tag(out, field.id, field.kind.wire_type());
            put_value(&field.kind, value, out);
        }
        FieldValue::Repeated(elems) if elems.is_empty() => {}
        FieldValue::Repeated(elems) => {
            if field.packed && field.kind.is_packable() {
                let payload: usize = elems.iter().map(|v| value_size(&field.kind, v)).sum();
                put_tag(out, field.id, WireType::Len);
                put_varint(out, payload as u64);
                for value in elems {
                    put_value(&field.kind, value, out);
                }
            } else {
                for value in elems {
                    put_tag(out, field.id, field.kind.wire_type());
                    put_value(&field.kind, value, out);
                }
            }
        }
    }
}

/// Emit one value's body.
///
/// Panics on a value/type mismatch, same as
/// [`value_size`](super::size::value_size).
fn put_value(kind: &FieldType, value: &Value, out: &mut impl BufMut) {
    match (kind, value) {
        (FieldType::Int32, Value::Int32(v)) => put_varint(out, *v as i64 as u64),
        (FieldType::Enum(_), Value::Enum(v)) => put_varint(out, *v as i64 as u64),
        (FieldType::Sint32, Value::Int32(v)) => put_varint(out, u64::from(zigzag_encode32(*v))),
        (FieldType::Sfixed32, Value::Int32(v)) => out.put_i32_le(*v),
        (FieldType::Int64, Value::Int64(v)) => put_varint(out, *v as u64),
        (FieldType::Sint64, Value::Int64(v)) => put_varint(out, zigzag_encode64(*v)),
        (FieldType::Sfixed64, Value::Int64(v)) => out.put_i64_le(*v),
        (FieldType::Uint32, Value::Uint32(v)) => put_varint(out, u64::from(*v)),
        (FieldType::Fixed32, Value::Uint32(v)) => out.put_u32_le(*v),
        (FieldType::Uint64, Value::Uint64(v)) => put_varint(out, *v),
        (FieldType::Fixed64, Value::Uint64(v)) => out.put_u64_le(*v),
        (FieldType::Float, Value::Float(v)) => out.put_f32_le(*v),
        (FieldType::Double, Value::Double(v)) => out.put_f64_le(*v),
        (FieldType::Bool, Value::Bool(v)) => out.put_u8(u8::from(*v)),
        (FieldType::String, Value::String(s)) => {
            put_varint(out, s.len() as u64);
            out.put_slice(s.as_bytes());
        }
        (FieldType::Bytes, Value::Bytes(b)) => {
            put_varint(out, b.len() as u64);
            out.put_slice(b);
        }
        (FieldType::Message(_), Value::Message(m)) => {
            put_varint(out, packed_size(m) as u64);
            pack(m, out);
        }
        _ => panic!("value {:?} does not match declared type {:?}", value, kind),
    }
}
