//! Deserialization of wire bytes into messages.
//!
//! Decoding is two-pass. The scan pass walks the tag stream once, checking
//! framing (tags, varint termination, length delimiters, fixed widths),
//! classifying each member against the descriptor, and counting repeated
//! elements; nothing it builds survives into the message, so its scratch is
//! not routed through the allocator. The parse pass then materializes the
//! message with exact-capacity storage, charging the allocator at every
//! site [`Message::free_unpacked`] later refunds.
//!
//! A known field whose wire type does not match its declared type is
//! demoted to an unknown field rather than rejected: the bytes are framed
//! well enough to skip and preserve, and a descriptor-version skew should
//! not make the whole buffer undecodable.
//!
//! Any failure after allocation has begun rolls the partial message back
//! through the same release walk `free_unpacked` uses, so the allocator
//! always ends balanced.

use crate::alloc::{charge, Allocator};
use crate::descriptor::{FieldDescriptor, FieldType, Label, MessageDescriptor};
use crate::error::{Error, Result};
use crate::message::{
    release_value, FieldValue, Message, UnknownField, Value, ELEMENT_FOOTPRINT,
};
use crate::wire::{
    decode_tag, decode_varint, zigzag_decode32, zigzag_decode64, WireType,
};

use std::mem;

use tracing::{debug, trace};

/// Longest permitted encoding of a length delimiter: lengths live in the
/// 32-bit domain, so five varint bytes suffice.
const MAX_LEN_VARINT: usize = 5;

/// Decode `data` as a message described by `descriptor`.
///
/// Every allocation that becomes part of the result is admitted through
/// `allocator`; release the result with [`Message::free_unpacked`] using
/// the same allocator. On error nothing is retained and every granted
/// allocation has been refunded.
pub fn unpack<A: Allocator + ?Sized>(
    descriptor: &'static MessageDescriptor,
    allocator: &A,
    data: &[u8],
) -> Result<Message> {
    debug!(message = descriptor.name, len = data.len(), "unpacking");
    parse_message(descriptor, allocator, data, 0)
}

/// One framed field occurrence found by the scan pass.
///
/// `data` is the full payload region, including the length prefix for
/// length-delimited members so unknown fields re-pack verbatim.
struct ScannedMember<'a> {
    number: u32,
    wire_type: WireType,
    /// Index of the declared field this member matched, None for unknown
    field_index: Option<usize>,
    data: &'a [u8],
    /// Length-prefix bytes at the front of `data` (0 for non-LEN members)
    len_prefix: usize,
    /// Offset of `data` within the buffer passed to `scan_members`
    offset: usize,
}

fn parse_message<A: Allocator + ?Sized>(
    descriptor: &'static MessageDescriptor,
    allocator: &A,
    data: &[u8],
    base: usize,
) -> Result<Message> {
    let (members, counts, n_unknown) = scan_members(descriptor, data, base)?;

    if !charge(allocator, descriptor.size_of) {
        return Err(Error::out_of_memory(descriptor.size_of));
    }
    let mut msg = Message::new(descriptor);
    if let Err(err) = charge_defaults(&mut msg, allocator) {
        msg.release_in_place(allocator);
        return Err(err);
    }

    for (index, &count) in counts.iter().enumerate() {
        if count > 0 {
            if let FieldValue::Repeated(elems) = &mut msg.slots[index] {
                elems.reserve_exact(count);
            }
        }
    }
    msg.unknown_fields.reserve_exact(n_unknown);

    for member in &members {
        if let Err(err) = apply_member(&mut msg, allocator, member, base) {
            msg.release_in_place(allocator);
            return Err(err);
        }
    }
    Ok(msg)
}

/// Walk the tag stream once, validating framing and counting elements.
///
/// Returns the framed members, the repeated-element count per field index,
/// and the number of unknown members.
fn scan_members<'a>(
    descriptor: &'static MessageDescriptor,
    data: &'a [u8],
    base: usize,
) -> Result<(Vec<ScannedMember<'a>>, Vec<usize>, usize)> {
    let mut members = Vec::new();
    let mut counts = vec![0usize; descriptor.fields.len()];
    let mut n_unknown = 0usize;
    let mut pos = 0usize;
    // Consecutive members usually repeat the same field; memoize the last
    // lookup the way a hot path wants it.
    let mut last: Option<(u32, usize)> = None;

    while pos < data.len() {
        let (number, wire_type, tag_len) =
            decode_tag(&data[pos..]).map_err(|e| rebase(e, base + pos))?;
        if wire_type.is_group() {
            return Err(Error::UnsupportedWireType {
                wire_type: wire_type as u8,
                offset: base + pos,
            });
        }
        pos += tag_len;

        let rem = &data[pos..];
        let (payload, len_prefix): (&'a [u8], usize) = match wire_type {
            WireType::Varint => {
                let (_, used) = decode_varint(rem).map_err(|e| rebase(e, base + pos))?;
                (&rem[..used], 0)
            }
            WireType::I64 => (take_bytes(rem, 8, base + pos)?, 0),
            WireType::I32 => (take_bytes(rem, 4, base + pos)?, 0),
            WireType::Len => {
                let (len, used) = decode_varint(rem).map_err(|e| rebase(e, base + pos))?;
                if used > MAX_LEN_VARINT || len > u64::from(u32::MAX) {
                    return Err(Error::oversized_length(base + pos));
                }
                let len = len as usize;
                if rem.len() - used < len {
                    return Err(Error::truncated(base + pos + used, len, rem.len() - used));
                }
                (&rem[..used + len], used)
            }
            WireType::StartGroup | WireType::EndGroup => unreachable!("groups rejected above"),
        };

        let field_index = match last {
            Some((n, i)) if n == number => Some(i),
            _ => descriptor.field_index_by_number(number),
        };
        if let Some(i) = field_index {
            last = Some((number, i));
        }
        let matched = field_index.filter(|&i| accepts(&descriptor.fields[i], wire_type));

        match matched {
            Some(i) => {
                let field = &descriptor.fields[i];
                if field.label == Label::Repeated {
                    if field.kind.is_packable() && wire_type == WireType::Len {
                        counts[i] +=
                            count_packed_elements(&field.kind, &payload[len_prefix..], field.name)?;
                    } else {
                        counts[i] += 1;
                    }
                }
            }
            None => n_unknown += 1,
        }
        trace!(
            number,
            wire_type = wire_type as u8,
            known = matched.is_some(),
            offset = base + pos,
            "scanned member"
        );

        members.push(ScannedMember {
            number,
            wire_type,
            field_index: matched,
            data: payload,
            len_prefix,
            offset: pos,
        });
        pos += payload.len();
    }

    Ok((members, counts, n_unknown))
}

/// Wire types this field's members may arrive with.
///
/// A packable repeated field accepts both its scalar wire type and the
/// packed length-delimited form, regardless of how the descriptor says it
/// prefers to serialize.
fn accepts(field: &FieldDescriptor, wire_type: WireType) -> bool {
    if field.label == Label::Repeated && field.kind.is_packable() {
        wire_type == WireType::Len || wire_type == field.kind.wire_type()
    } else {
        wire_type == field.kind.wire_type()
    }
}

/// Number of elements in a packed payload: byte-width division for the
/// fixed kinds (rejecting stray trailing bytes), terminator count for the
/// varint kinds.
fn count_packed_elements(
    kind: &FieldType,
    payload: &[u8],
    field: &'static str,
) -> Result<usize> {
    match kind.fixed_size() {
        Some(elem_size) => {
            if payload.len() % elem_size != 0 {
                return Err(Error::MisalignedPackedData {
                    field,
                    len: payload.len(),
                    elem_size,
                });
            }
            Ok(payload.len() / elem_size)
        }
        None => Ok(payload.iter().filter(|&&b| b & 0x80 == 0).count()),
    }
}

/// Admit the string/bytes defaults installed by message init.
///
/// Must run right after construction, before any member is applied. On
/// refusal the not-yet-charged payloads are emptied first so the caller's
/// rollback refunds exactly what was granted.
fn charge_defaults<A: Allocator + ?Sized>(msg: &mut Message, allocator: &A) -> Result<()> {
    for i in 0..msg.slots.len() {
        let len = default_payload_len(&msg.slots[i]);
        if len > 0 && !charge(allocator, len) {
            for slot in &mut msg.slots[i..] {
                if let FieldValue::Single(value) = slot {
                    match value {
                        Value::String(s) => s.clear(),
                        Value::Bytes(b) => b.clear(),
                        _ => {}
                    }
                }
            }
            return Err(Error::out_of_memory(len));
        }
    }
    Ok(())
}

fn default_payload_len(slot: &FieldValue) -> usize {
    match slot {
        FieldValue::Single(Value::String(s)) => s.len(),
        FieldValue::Single(Value::Bytes(b)) => b.len(),
        _ => 0,
    }
}

fn apply_member<A: Allocator + ?Sized>(
    msg: &mut Message,
    allocator: &A,
    member: &ScannedMember<'_>,
    base: usize,
) -> Result<()> {
    let Some(index) = member.field_index else {
        let size = member.data.len();
        if !charge(allocator, size) {
            return Err(Error::out_of_memory(size));
        }
        msg.unknown_fields.push(UnknownField {
            tag: member.number,
            wire_type: member.wire_type,
            data: member.data.to_vec(),
        });
        return Ok(());
    };

    let descriptor = msg.descriptor;
    let field = &descriptor.fields[index];
    let payload = &member.data[member.len_prefix..];
    let payload_offset = base + member.offset + member.len_prefix;

    match field.label {
        Label::Repeated => {
            if field.kind.is_packable() && member.wire_type == WireType::Len {
                let mut at = 0;
                while at < payload.len() {
                    let (value, used) =
                        parse_scalar(&field.kind, &payload[at..], payload_offset + at)?;
                    push_element(msg, allocator, index, value)?;
                    at += used;
                }
            } else {
                let value = parse_value(field, payload, payload_offset, allocator)?;
                push_element(msg, allocator, index, value)?;
            }
        }
        Label::Required | Label::Optional => match field.kind {
            FieldType::Message(sub) => {
                let mut parsed = parse_message(sub, allocator, payload, payload_offset)?;
                if let Some(oneof) = field.oneof_index {
                    release_oneof(msg, allocator, oneof);
                } else if let FieldValue::Single(Value::Message(earlier)) =
                    mem::replace(&mut msg.slots[index], FieldValue::Unset)
                {
                    // Duplicate singular submessage: merge, earlier first
                    parsed.merge_from_earlier(earlier, allocator);
                }
                msg.slots[index] = FieldValue::Single(Value::Message(parsed));
            }
            _ => {
                let value = parse_value(field, payload, payload_offset, allocator)?;
                if let Some(oneof) = field.oneof_index {
                    release_oneof(msg, allocator, oneof);
                } else if let FieldValue::Single(old) =
                    mem::replace(&mut msg.slots[index], FieldValue::Unset)
                {
                    // Duplicate singular scalar: last occurrence wins
                    release_value(old, allocator);
                }
                msg.slots[index] = FieldValue::Single(value);
            }
        },
    }
    Ok(())
}

/// Charge one repeated-element slot and append; on refusal the parsed
/// value's own charges are released before reporting out-of-memory.
fn push_element<A: Allocator + ?Sized>(
    msg: &mut Message,
    allocator: &A,
    index: usize,
    value: Value,
) -> Result<()> {
    if !charge(allocator, ELEMENT_FOOTPRINT) {
        release_value(value, allocator);
        return Err(Error::out_of_memory(ELEMENT_FOOTPRINT));
    }
    match &mut msg.slots[index] {
        FieldValue::Repeated(elems) => elems.push(value),
        slot => *slot = FieldValue::Repeated(vec![value]),
    }
    Ok(())
}

/// Release every set member of a oneof before a new member lands
fn release_oneof<A: Allocator + ?Sized>(msg: &mut Message, allocator: &A, oneof: u32) {
    let descriptor = msg.descriptor;
    for (i, field) in descriptor.fields.iter().enumerate() {
        if field.oneof_index == Some(oneof) {
            if let FieldValue::Single(value) = mem::replace(&mut msg.slots[i], FieldValue::Unset) {
                release_value(value, allocator);
            }
        }
    }
}

/// Parse one value of any kind from its payload bytes, charging the
/// allocator for payload-bearing kinds.
fn parse_value<A: Allocator + ?Sized>(
    field: &'static FieldDescriptor,
    payload: &[u8],
    offset: usize,
    allocator: &A,
) -> Result<Value> {
    match field.kind {
        FieldType::String => {
            let text = std::str::from_utf8(payload)
                .map_err(|_| Error::InvalidUtf8 { field: field.name })?;
            if !charge(allocator, text.len()) {
                return Err(Error::out_of_memory(text.len()));
            }
            Ok(Value::String(text.to_owned()))
        }
        FieldType::Bytes => {
            if !charge(allocator, payload.len()) {
                return Err(Error::out_of_memory(payload.len()));
            }
            Ok(Value::Bytes(payload.to_vec()))
        }
        FieldType::Message(sub) => {
            parse_message(sub, allocator, payload, offset).map(Value::Message)
        }
        ref kind => parse_scalar(kind, payload, offset).map(|(value, _)| value),
    }
}

/// Parse one scalar (non-length-delimited) value from the front of `data`,
/// returning the value and the bytes consumed.
fn parse_scalar(kind: &FieldType, data: &[u8], offset: usize) -> Result<(Value, usize)> {
    match kind {
        FieldType::Sfixed32 => {
            let raw = take_fixed::<4>(data, offset)?;
            Ok((Value::Int32(i32::from_le_bytes(raw)), 4))
        }
        FieldType::Fixed32 => {
            let raw = take_fixed::<4>(data, offset)?;
            Ok((Value::Uint32(u32::from_le_bytes(raw)), 4))
        }
        FieldType::Float => {
            let raw = take_fixed::<4>(data, offset)?;
            Ok((Value::Float(f32::from_le_bytes(raw)), 4))
        }
        FieldType::Sfixed64 => {
            let raw = take_fixed::<8>(data, offset)?;
            Ok((Value::Int64(i64::from_le_bytes(raw)), 8))
        }
        FieldType::Fixed64 => {
            let raw = take_fixed::<8>(data, offset)?;
            Ok((Value::Uint64(u64::from_le_bytes(raw)), 8))
        }
        FieldType::Double => {
            let raw = take_fixed::<8>(data, offset)?;
            Ok((Value::Double(f64::from_le_bytes(raw)), 8))
        }
        FieldType::Int32
        | FieldType::Sint32
        | FieldType::Int64
        | FieldType::Sint64
        | FieldType::Uint32
        | FieldType::Uint64
        | FieldType::Bool
        | FieldType::Enum(_) => {
            let (raw, used) = decode_varint(data).map_err(|e| rebase(e, offset))?;
            let value = match kind {
                // int32 and enum keep the low 32 bits of the varint
                FieldType::Int32 => Value::Int32(raw as i32),
                FieldType::Enum(_) => Value::Enum(raw as i32),
                FieldType::Sint32 => Value::Int32(zigzag_decode32(raw as u32)),
                FieldType::Int64 => Value::Int64(raw as i64),
                FieldType::Sint64 => Value::Int64(zigzag_decode64(raw)),
                FieldType::Uint32 => Value::Uint32(raw as u32),
                FieldType::Uint64 => Value::Uint64(raw),
                FieldType::Bool => Value::Bool(raw != 0),
                _ => unreachable!(),
            };
            Ok((value, used))
        }
        FieldType::String | FieldType::Bytes | FieldType::Message(_) => {
            unreachable!("length-delimited kinds are handled by the member dispatcher")
        }
    }
}

fn take_bytes<'a>(data: &'a [u8], n: usize, offset: usize) -> Result<&'a [u8]> {
    if data.len() < n {
        return Err(Error::truncated(offset, n, data.len()));
    }
    Ok(&data[..n])
}

fn take_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    if data.len() < N {
        return Err(Error::truncated(offset, N, data.len()));
    }
    let mut buf = [0u8; N];
    buf.copy_from_slice(&data[..N]);
    Ok(buf)
}

/// Shift an error's offset from member-local to buffer-absolute
fn rebase(err: Error, base: usize) -> Error {
    match err {
        Error::Truncated {
            offset,
            needed,
            available,
        } => Error::Truncated {
            offset: offset + base,
            needed,
            available,
        },
        Error::VarintOverflow { offset } => Error::VarintOverflow {
            offset: offset + base,
        },
        Error::OversizedLength { offset } => Error::OversizedLength {
            offset: offset + base,
        },
        Error::UnsupportedWireType { wire_type, offset } => Error::UnsupportedWireType {
            wire_type,
            offset: offset + base,
        },
        other => other,
    }
}
