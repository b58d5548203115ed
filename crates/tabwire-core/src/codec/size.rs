//! Exact serialized-size computation.
//!
//! [`packed_size`] returns the precise byte count [`pack`](crate::pack)
//! will emit for the same message, so callers can allocate output buffers
//! in one step. Sizing a well-formed message never fails.

use crate::descriptor::{FieldDescriptor, FieldType, Label};
use crate::message::{FieldValue, Message, Value};
use crate::wire::{tag_size, varint_size, zigzag_encode32, zigzag_encode64};

/// Returns the number of bytes `pack` emits for `message`: declared
/// fields in field-number order, then unknown fields in their preserved
/// order.
pub fn packed_size(message: &Message) -> usize {
    let mut total = 0;
    for (field, slot) in message.descriptor.fields.iter().zip(&message.slots) {
        total += field_size(field, slot);
    }
    for unknown in &message.unknown_fields {
        total += tag_size(unknown.tag) + unknown.data.len();
    }
    total
}

/// Serialized size of one field slot, including tags and framing
pub(crate) fn field_size(field: &FieldDescriptor, slot: &FieldValue) -> usize {
    match slot {
        FieldValue::Unset => match (field.label, &field.kind) {
            // An unset required submessage serializes as tag + empty body
            (Label::Required, FieldType::Message(_)) => tag_size(field.id) + 1,
            _ => 0,
        },
        FieldValue::Single(value) => tag_size(field.id) + value_size(&field.kind, value),
        FieldValue::Repeated(elems) if elems.is_empty() => 0,
        FieldValue::Repeated(elems) => {
            if field.packed && field.kind.is_packable() {
                let payload: usize = elems.iter().map(|v| value_size(&field.kind, v)).sum();
                tag_size(field.id) + varint_size(payload as u64) + payload
            } else {
                elems
                    .iter()
                    .map(|v| tag_size(field.id) + value_size(&field.kind, v))
                    .sum()
            }
        }
    }
}

/// Serialized size of one value's body: no tag, but including the length
/// prefix for length-delimited kinds.
///
/// Panics when the value's variant does not match the declared type; the
/// mutators on [`Message`] make that state unreachable without going
/// through a caller contract violation first.
pub(crate) fn value_size(kind: &FieldType, value: &Value) -> usize {
    match (kind, value) {
        (FieldType::Int32, Value::Int32(v)) => int32_size(*v),
        (FieldType::Enum(_), Value::Enum(v)) => int32_size(*v),
        (FieldType::Sint32, Value::Int32(v)) => varint_size(u64::from(zigzag_encode32(*v))),
        (FieldType::Sfixed32, Value::Int32(_)) => 4,
        (FieldType::Int64, Value::Int64(v)) => varint_size(*v as u64),
        (FieldType::Sint64, Value::Int64(v)) => varint_size(zigzag_encode64(*v)),
        (FieldType::Sfixed64, Value::Int64(_)) => 8,
        (FieldType::Uint32, Value::Uint32(v)) => varint_size(u64::from(*v)),
        (FieldType::Fixed32, Value::Uint32(_)) => 4,
        (FieldType::Uint64, Value::Uint64(v)) => varint_size(*v),
        (FieldType::Fixed64, Value::Uint64(_)) => 8,
        (FieldType::Float, Value::Float(_)) => 4,
        (FieldType::Double, Value::Double(_)) => 8,
        (FieldType::Bool, Value::Bool(_)) => 1,
        (FieldType::String, Value::String(s)) => len_delimited_size(s.len()),
        (FieldType::Bytes, Value::Bytes(b)) => len_delimited_size(b.len()),
        (FieldType::Message(_), Value::Message(m)) => len_delimited_size(packed_size(m)),
        _ => panic!("value {:?} does not match declared type {:?}", value, kind),
    }
}

/// Negative int32/enum values sign-extend to 64 bits on the wire, so they
/// always take the full 10 bytes.
fn int32_size(v: i32) -> usize {
    varint_size(v as i64 as u64)
}

fn len_delimited_size(len: usize) -> usize {
    varint_size(len as u64) + len
}
