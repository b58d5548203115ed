//! Dynamic message instances driven by descriptor tables.
//!
//! A [`Message`] keeps one storage slot per declared field, parallel to
//! [`MessageDescriptor::fields`] and addressed by field index rather than
//! by byte offset into a generated struct. Presence is
//! the slot state itself: [`FieldValue::Unset`] for an absent optional (or
//! unselected oneof member), [`FieldValue::Single`] for a present value,
//! [`FieldValue::Repeated`] for element arrays whose count is the vector
//! length.
//!
//! ## Lifecycle
//!
//! Instances come from two places: [`unpack`](crate::unpack)
//! products, which must be released with [`Message::free_unpacked`] using
//! the same allocator, and hand-built instances ([`Message::new`] plus the
//! mutators), which are not allocator-accounted and are simply dropped.
//! The runtime never destroys a message on its own initiative.

use crate::alloc::{refund, Allocator};
use crate::descriptor::{DefaultValue, FieldDescriptor, FieldType, Label, MessageDescriptor};
use crate::wire::WireType;

use std::mem;
use std::ptr;

/// Nominal footprint of one repeated-element slot, charged to the
/// allocator per element appended during unpack.
pub(crate) const ELEMENT_FOOTPRINT: usize = mem::size_of::<Value>();

/// A single field value.
///
/// The variant is determined by the field's declared [`FieldType`]:
/// `int32`/`sint32`/`sfixed32` store as [`Value::Int32`],
/// `uint32`/`fixed32` as [`Value::Uint32`], and likewise for the 64-bit
/// families; enums store their numeric value.
#[derive(Debug, PartialEq)]
pub enum Value {
    /// int32, sint32, sfixed32
    Int32(i32),
    /// int64, sint64, sfixed64
    Int64(i64),
    /// uint32, fixed32
    Uint32(u32),
    /// uint64, fixed64
    Uint64(u64),
    /// float
    Float(f32),
    /// double
    Double(f64),
    /// bool
    Bool(bool),
    /// enum, as its numeric value (which need not name a known member)
    Enum(i32),
    /// string
    String(String),
    /// bytes
    Bytes(Vec<u8>),
    /// embedded message
    Message(Message),
}

impl Value {
    /// The zero/empty value for a field type
    pub fn zero(kind: &FieldType) -> Value {
        match kind {
            FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => Value::Int32(0),
            FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => Value::Int64(0),
            FieldType::Uint32 | FieldType::Fixed32 => Value::Uint32(0),
            FieldType::Uint64 | FieldType::Fixed64 => Value::Uint64(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::Enum(_) => Value::Enum(0),
            FieldType::String => Value::String(String::new()),
            FieldType::Bytes => Value::Bytes(Vec::new()),
            FieldType::Message(desc) => Value::Message(Message::new(desc)),
        }
    }

    /// Materialize a statically-held default into an owned value
    pub fn from_default(default: DefaultValue) -> Value {
        match default {
            DefaultValue::Int32(v) | DefaultValue::Sint32(v) => Value::Int32(v),
            DefaultValue::Int64(v) => Value::Int64(v),
            DefaultValue::Uint32(v) => Value::Uint32(v),
            DefaultValue::Uint64(v) => Value::Uint64(v),
            DefaultValue::Float(v) => Value::Float(v),
            DefaultValue::Double(v) => Value::Double(v),
            DefaultValue::Bool(v) => Value::Bool(v),
            DefaultValue::Enum(v) => Value::Enum(v),
            DefaultValue::String(s) => Value::String(s.to_owned()),
            DefaultValue::Bytes(b) => Value::Bytes(b.to_vec()),
        }
    }

    /// Returns true if this value's variant is the storage class for
    /// `kind` (for messages, the descriptors must be the same table)
    pub fn matches(&self, kind: &FieldType) -> bool {
        match (self, kind) {
            (Value::Int32(_), FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32) => true,
            (Value::Int64(_), FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64) => true,
            (Value::Uint32(_), FieldType::Uint32 | FieldType::Fixed32) => true,
            (Value::Uint64(_), FieldType::Uint64 | FieldType::Fixed64) => true,
            (Value::Float(_), FieldType::Float) => true,
            (Value::Double(_), FieldType::Double) => true,
            (Value::Bool(_), FieldType::Bool) => true,
            (Value::Enum(_), FieldType::Enum(_)) => true,
            (Value::String(_), FieldType::String) => true,
            (Value::Bytes(_), FieldType::Bytes) => true,
            (Value::Message(m), FieldType::Message(desc)) => ptr::eq(m.descriptor, *desc),
            _ => false,
        }
    }
}

/// Storage slot for one declared field
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    /// Optional field not present / oneof member not selected
    Unset,
    /// Present singular value
    Single(Value),
    /// Repeated elements, in order
    Repeated(Vec<Value>),
}

/// Wire data whose tag the descriptor does not recognize, preserved
/// verbatim for forward compatibility.
///
/// `data` holds the raw payload region exactly as scanned, including the
/// length prefix for length-delimited fields, so re-packing emits the
/// original bytes unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownField {
    /// Field number from the tag
    pub tag: u32,
    /// Wire type from the tag
    pub wire_type: WireType,
    /// Verbatim payload bytes
    pub data: Vec<u8>,
}

/// An instance of a message described by a [`MessageDescriptor`]
#[derive(Debug)]
pub struct Message {
    pub(crate) descriptor: &'static MessageDescriptor,
    pub(crate) slots: Vec<FieldValue>,
    pub(crate) unknown_fields: Vec<UnknownField>,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.descriptor, other.descriptor)
            && self.slots == other.slots
            && self.unknown_fields == other.unknown_fields
    }
}

impl Message {
    /// Create a default-initialized instance of `descriptor`.
    ///
    /// Uses the descriptor's custom initializer when present, otherwise
    /// [`Message::new_generic`]. Every byte of every oneof's storage reads
    /// as "no member selected".
    pub fn new(descriptor: &'static MessageDescriptor) -> Self {
        match descriptor.init {
            Some(init) => init(descriptor),
            None => Self::new_generic(descriptor),
        }
    }

    /// Generic default initialization from the descriptor tables alone.
    ///
    /// Required scalar fields start at their static default (or zero);
    /// required message fields start unset and serialize as an empty
    /// submessage; optional fields start unset; repeated fields start
    /// empty.
    pub fn new_generic(descriptor: &'static MessageDescriptor) -> Self {
        let slots = descriptor
            .fields
            .iter()
            .map(|field| match field.label {
                Label::Repeated => FieldValue::Repeated(Vec::new()),
                Label::Optional => FieldValue::Unset,
                Label::Required => match field.kind {
                    // Unset avoids unbounded recursion on self-referential
                    // message types; pack emits a zero-length submessage.
                    FieldType::Message(_) => FieldValue::Unset,
                    _ => FieldValue::Single(default_for(field)),
                },
            })
            .collect();
        Self {
            descriptor,
            slots,
            unknown_fields: Vec::new(),
        }
    }

    /// The descriptor this instance was built from
    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    /// Unknown fields preserved from decode, in their original order
    pub fn unknown_fields(&self) -> &[UnknownField] {
        &self.unknown_fields
    }

    /// Resolve a field number to its slot index, panicking on numbers the
    /// descriptor does not own (a caller contract violation, per the
    /// error-handling policy for programming misuse).
    fn index_of(&self, number: u32) -> usize {
        match self.descriptor.field_index_by_number(number) {
            Some(i) => i,
            None => panic!(
                "field {} is not a member of message '{}'",
                number, self.descriptor.name
            ),
        }
    }

    /// Returns the present value of a singular field, or None when unset.
    ///
    /// An unset optional field reads as its static default through
    /// [`FieldDescriptor::default_value`]; this accessor reports presence.
    /// Panics when called on a repeated field or an unknown field number.
    pub fn get(&self, number: u32) -> Option<&Value> {
        match &self.slots[self.index_of(number)] {
            FieldValue::Unset => None,
            FieldValue::Single(v) => Some(v),
            FieldValue::Repeated(_) => panic!(
                "field {} of '{}' is repeated; use elements()",
                number, self.descriptor.name
            ),
        }
    }

    /// Returns the elements of a repeated field.
    ///
    /// Panics when called on a singular field or an unknown field number.
    pub fn elements(&self, number: u32) -> &[Value] {
        match &self.slots[self.index_of(number)] {
            FieldValue::Repeated(v) => v,
            _ => panic!(
                "field {} of '{}' is not repeated",
                number, self.descriptor.name
            ),
        }
    }

    /// Returns true if a singular field is present, or a repeated field
    /// non-empty
    pub fn has(&self, number: u32) -> bool {
        match &self.slots[self.index_of(number)] {
            FieldValue::Unset => false,
            FieldValue::Single(_) => true,
            FieldValue::Repeated(v) => !v.is_empty(),
        }
    }

    /// Set a singular field.
    ///
    /// Setting a oneof member clears the union's other members. Panics on
    /// a repeated field, an unknown field number, or a value whose variant
    /// does not match the declared type.
    pub fn set(&mut self, number: u32, value: Value) {
        let index = self.index_of(number);
        let field = &self.descriptor.fields[index];
        assert!(
            value.matches(&field.kind),
            "value {:?} does not match declared type of field '{}'",
            value,
            field.name
        );
        assert!(
            field.label != Label::Repeated,
            "field '{}' is repeated; use push()",
            field.name
        );
        if let Some(oneof) = field.oneof_index {
            self.clear_oneof(oneof);
        }
        self.slots[index] = FieldValue::Single(value);
    }

    /// Append an element to a repeated field.
    ///
    /// Panics on a singular field, an unknown field number, or a value of
    /// the wrong variant.
    pub fn push(&mut self, number: u32, value: Value) {
        let index = self.index_of(number);
        let field = &self.descriptor.fields[index];
        assert!(
            value.matches(&field.kind),
            "value {:?} does not match declared type of field '{}'",
            value,
            field.name
        );
        match &mut self.slots[index] {
            FieldValue::Repeated(v) => v.push(value),
            _ => panic!("field '{}' is not repeated", field.name),
        }
    }

    /// Clear a field back to unset/empty
    pub fn clear(&mut self, number: u32) {
        let index = self.index_of(number);
        self.slots[index] = match self.descriptor.fields[index].label {
            Label::Repeated => FieldValue::Repeated(Vec::new()),
            _ => FieldValue::Unset,
        };
    }

    /// The active member of a oneof, if any.
    ///
    /// The runtime guarantees at most one member of a union is set at a
    /// time; a default-constructed message has none.
    pub fn active_oneof(&self, oneof_index: u32) -> Option<&FieldDescriptor> {
        self.descriptor
            .fields
            .iter()
            .enumerate()
            .find(|(i, f)| {
                f.oneof_index == Some(oneof_index)
                    && matches!(self.slots[*i], FieldValue::Single(_))
            })
            .map(|(_, f)| f)
    }

    fn clear_oneof(&mut self, oneof_index: u32) {
        for (i, field) in self.descriptor.fields.iter().enumerate() {
            if field.oneof_index == Some(oneof_index) {
                self.slots[i] = FieldValue::Unset;
            }
        }
    }

    /// Validate that every required field is present, recursively.
    ///
    /// Missing required fields are not a decode error (unpack is
    /// deliberately permissive), so presence validation is this separate
    /// caller-side policy check.
    pub fn check(&self) -> bool {
        for (i, field) in self.descriptor.fields.iter().enumerate() {
            match (&field.kind, &self.slots[i]) {
                (FieldType::Message(_), FieldValue::Single(Value::Message(m))) => {
                    if !m.check() {
                        return false;
                    }
                }
                (FieldType::Message(_), FieldValue::Unset) => {
                    if field.label == Label::Required {
                        return false;
                    }
                }
                (FieldType::Message(_), FieldValue::Repeated(elems)) => {
                    for elem in elems {
                        if let Value::Message(m) = elem {
                            if !m.check() {
                                return false;
                            }
                        }
                    }
                }
                (_, FieldValue::Unset) => {
                    if field.label == Label::Required {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    }

    /// Release every allocation reachable through a message produced by
    /// unpack, using the same allocator, then drop the instance.
    pub fn free_unpacked<A: Allocator + ?Sized>(mut self, allocator: &A) {
        self.release_in_place(allocator);
    }

    /// The teardown walk shared by `free_unpacked` and unpack's rollback.
    ///
    /// Tolerates any partially populated state: each slot is released from
    /// whatever it currently holds, exactly once.
    pub(crate) fn release_in_place<A: Allocator + ?Sized>(&mut self, allocator: &A) {
        for slot in &mut self.slots {
            match mem::replace(slot, FieldValue::Unset) {
                FieldValue::Unset => {}
                FieldValue::Single(value) => release_value(value, allocator),
                FieldValue::Repeated(elems) => {
                    for value in elems {
                        refund(allocator, ELEMENT_FOOTPRINT);
                        release_value(value, allocator);
                    }
                }
            }
        }
        for unknown in self.unknown_fields.drain(..) {
            refund(allocator, unknown.data.len());
        }
        refund(allocator, self.descriptor.size_of);
    }

    /// Merge an earlier occurrence of this message into `self` (the later
    /// occurrence), per Protocol Buffers message-merging rules: repeated
    /// fields concatenate earlier-first, singular submessages merge
    /// recursively, scalars keep the later value. The earlier instance is
    /// fully released; nothing leaks.
    pub(crate) fn merge_from_earlier<A: Allocator + ?Sized>(
        &mut self,
        mut earlier: Message,
        allocator: &A,
    ) {
        debug_assert!(ptr::eq(self.descriptor, earlier.descriptor));
        for i in 0..self.slots.len() {
            let field = &self.descriptor.fields[i];
            let moved = mem::replace(&mut earlier.slots[i], FieldValue::Unset);

            // A oneof member from the earlier occurrence only survives if
            // the later occurrence left the whole union unselected.
            if let (Some(oneof), FieldValue::Single(_)) = (field.oneof_index, &moved) {
                if self.active_oneof(oneof).is_some() {
                    if let FieldValue::Single(value) = moved {
                        release_value(value, allocator);
                    }
                    continue;
                }
            }

            match (moved, &mut self.slots[i]) {
                (FieldValue::Unset, _) => {}
                (FieldValue::Repeated(mut early), FieldValue::Repeated(late)) => {
                    if !early.is_empty() {
                        early.append(late);
                        *late = early;
                    }
                }
                (
                    FieldValue::Single(Value::Message(early)),
                    FieldValue::Single(Value::Message(late)),
                ) => {
                    late.merge_from_earlier(early, allocator);
                }
                (FieldValue::Single(value), slot @ FieldValue::Unset) => {
                    *slot = FieldValue::Single(value);
                }
                (FieldValue::Single(value), _) => release_value(value, allocator),
                (FieldValue::Repeated(elems), _) => {
                    for value in elems {
                        refund(allocator, ELEMENT_FOOTPRINT);
                        release_value(value, allocator);
                    }
                }
            }
        }

        if !earlier.unknown_fields.is_empty() {
            let mut merged = mem::take(&mut earlier.unknown_fields);
            merged.append(&mut self.unknown_fields);
            self.unknown_fields = merged;
        }

        earlier.release_in_place(allocator);
    }
}

/// The default value for a field: its static default if the descriptor
/// supplies one, otherwise zero/empty.
pub fn default_for(field: &FieldDescriptor) -> Value {
    match field.default_value {
        Some(default) => Value::from_default(default),
        None => Value::zero(&field.kind),
    }
}

/// Release one value's allocator charges (payloads and, recursively,
/// nested instances). Scalars carry no charges of their own.
pub(crate) fn release_value<A: Allocator + ?Sized>(value: Value, allocator: &A) {
    match value {
        Value::String(s) => refund(allocator, s.len()),
        Value::Bytes(b) => refund(allocator, b.len()),
        Value::Message(mut m) => m.release_in_place(allocator),
        _ => {}
    }
}
