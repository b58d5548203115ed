//! Static descriptor tables describing messages, fields, enums, and
//! services.
//!
//! Descriptors are the compile-time interface boundary to the (external)
//! `.proto` compiler: generated code emits `static` tables of these types
//! and the runtime walks them to size, pack, unpack, and free any message.
//! Nothing here is mutated after construction, so descriptors may be shared
//! read-only across threads; all lookups are binary searches over the
//! pre-sorted tables.
//!
//! Field storage is addressed by field *index* (position in
//! [`MessageDescriptor::fields`]), not by byte offset into a struct: the
//! message model in [`crate::message`] keeps one storage slot per declared
//! field.

use crate::message::Message;
use crate::wire::WireType;

use std::fmt;

/// Cardinality of a field, as declared in the `.proto` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Exactly one value; always serialized
    Required,
    /// Zero or one value; serialized only when present
    Optional,
    /// Any number of values, in order
    Repeated,
}

/// Declared type of a field.
///
/// This is a closed enum matched exhaustively by the size, pack, and
/// unpack engines, so adding a type without handling it everywhere is a
/// compile error. The `Enum` and `Message` variants carry the nested
/// descriptor directly.
#[derive(Clone, Copy)]
pub enum FieldType {
    /// Signed 32-bit varint (sign-extended to 10 bytes when negative)
    Int32,
    /// Signed 32-bit varint with zigzag transform
    Sint32,
    /// Signed 32-bit little-endian fixed width
    Sfixed32,
    /// Signed 64-bit varint
    Int64,
    /// Signed 64-bit varint with zigzag transform
    Sint64,
    /// Signed 64-bit little-endian fixed width
    Sfixed64,
    /// Unsigned 32-bit varint
    Uint32,
    /// Unsigned 32-bit little-endian fixed width
    Fixed32,
    /// Unsigned 64-bit varint
    Uint64,
    /// Unsigned 64-bit little-endian fixed width
    Fixed64,
    /// IEEE 754 single precision, little-endian
    Float,
    /// IEEE 754 double precision, little-endian
    Double,
    /// Single-byte varint, nonzero decodes as true
    Bool,
    /// Enumeration value, encoded like int32
    Enum(&'static EnumDescriptor),
    /// Length-delimited UTF-8 text
    String,
    /// Length-delimited raw bytes
    Bytes,
    /// Length-delimited nested message
    Message(&'static MessageDescriptor),
}

impl FieldType {
    /// Returns the wire type of a single (non-packed) value of this type
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Int32
            | FieldType::Sint32
            | FieldType::Int64
            | FieldType::Sint64
            | FieldType::Uint32
            | FieldType::Uint64
            | FieldType::Bool
            | FieldType::Enum(_) => WireType::Varint,
            FieldType::Sfixed32 | FieldType::Fixed32 | FieldType::Float => WireType::I32,
            FieldType::Sfixed64 | FieldType::Fixed64 | FieldType::Double => WireType::I64,
            FieldType::String | FieldType::Bytes | FieldType::Message(_) => WireType::Len,
        }
    }

    /// Returns the byte width of fixed-width types, None for the rest
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            FieldType::Sfixed32 | FieldType::Fixed32 | FieldType::Float => Some(4),
            FieldType::Sfixed64 | FieldType::Fixed64 | FieldType::Double => Some(8),
            _ => None,
        }
    }

    /// Returns true if repeated values of this type may use the packed
    /// encoding (everything but strings, bytes, and messages)
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message(_)
        )
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int32 => write!(f, "Int32"),
            FieldType::Sint32 => write!(f, "Sint32"),
            FieldType::Sfixed32 => write!(f, "Sfixed32"),
            FieldType::Int64 => write!(f, "Int64"),
            FieldType::Sint64 => write!(f, "Sint64"),
            FieldType::Sfixed64 => write!(f, "Sfixed64"),
            FieldType::Uint32 => write!(f, "Uint32"),
            FieldType::Fixed32 => write!(f, "Fixed32"),
            FieldType::Uint64 => write!(f, "Uint64"),
            FieldType::Fixed64 => write!(f, "Fixed64"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Double => write!(f, "Double"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Enum(e) => write!(f, "Enum({})", e.name),
            FieldType::String => write!(f, "String"),
            FieldType::Bytes => write!(f, "Bytes"),
            FieldType::Message(m) => write!(f, "Message({})", m.name),
        }
    }
}

/// Statically-held default value for a field.
///
/// Absent (`None` on the field) means the zero/empty default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    /// Default for int32/sfixed32 fields
    Int32(i32),
    /// Default for sint32 fields
    Sint32(i32),
    /// Default for int64/sint64/sfixed64 fields
    Int64(i64),
    /// Default for uint32/fixed32 fields
    Uint32(u32),
    /// Default for uint64/fixed64 fields
    Uint64(u64),
    /// Default for float fields
    Float(f32),
    /// Default for double fields
    Double(f64),
    /// Default for bool fields
    Bool(bool),
    /// Default for enum fields (the numeric value)
    Enum(i32),
    /// Default for string fields
    String(&'static str),
    /// Default for bytes fields
    Bytes(&'static [u8]),
}

/// Description of a single field in a message
#[derive(Debug)]
pub struct FieldDescriptor {
    /// Field name, as given in the `.proto` file
    pub name: &'static str,
    /// camelCase JSON name (or the explicit override from the `.proto`)
    pub json_name: &'static str,
    /// Field number, unique within the message, 1..=2^29-1
    pub id: u32,
    /// Cardinality
    pub label: Label,
    /// Declared type, carrying the nested descriptor where applicable
    pub kind: FieldType,
    /// Static default, None meaning zero/empty
    pub default_value: Option<DefaultValue>,
    /// Repeated-only: whether elements use the packed encoding
    pub packed: bool,
    /// Membership in a discriminated union, if any
    pub oneof_index: Option<u32>,
}

impl FieldDescriptor {
    /// Returns the wire type this field's values are framed with
    /// (length-delimited for packed repeated fields)
    pub fn wire_type(&self) -> WireType {
        if self.packed {
            WireType::Len
        } else {
            self.kind.wire_type()
        }
    }
}

/// Initializer signature generated code may supply for a message type
pub type MessageInit = fn(&'static MessageDescriptor) -> Message;

/// Description of a message type
pub struct MessageDescriptor {
    /// Qualified name (e.g. "ns.Type")
    pub name: &'static str,
    /// Unqualified name ("Type"), as given in the `.proto` file
    pub short_name: &'static str,
    /// Name of the generated Rust type
    pub type_name: &'static str,
    /// '.'-separated namespace
    pub package_name: &'static str,
    /// Nominal per-instance footprint in bytes, charged to the allocator
    /// for every instance the unpack engine builds
    pub size_of: usize,
    /// Fields sorted by ascending field number
    pub fields: &'static [FieldDescriptor],
    /// Indices into `fields`, sorted lexicographically by field name
    pub fields_sorted_by_name: &'static [u32],
    /// Optional custom initializer; the runtime falls back to generic
    /// default-initialization when absent
    pub init: Option<MessageInit>,
}

impl MessageDescriptor {
    /// Look up a field by its field number.
    ///
    /// Binary search over `fields`; O(log n), no shared-state mutation.
    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.field_index_by_number(number).map(|i| &self.fields[i])
    }

    /// Look up a field's index by its field number
    pub fn field_index_by_number(&self, number: u32) -> Option<usize> {
        self.fields.binary_search_by_key(&number, |f| f.id).ok()
    }

    /// Look up a field by name.
    ///
    /// Binary search over the name-sorted index permutation.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields_sorted_by_name
            .binary_search_by(|&i| self.fields[i as usize].name.cmp(name))
            .ok()
            .map(|pos| &self.fields[self.fields_sorted_by_name[pos] as usize])
    }

    /// Number of declared fields
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("name", &self.name)
            .field("n_fields", &self.fields.len())
            .finish()
    }
}

/// A single named value of an enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumValue {
    /// Value name, as given in the `.proto` file
    pub name: &'static str,
    /// Name of the generated Rust variant
    pub type_name: &'static str,
    /// Numeric value
    pub number: i32,
}

/// Name-sorted index entry pointing into an enum's value table
#[derive(Debug, Clone, Copy)]
pub struct EnumValueIndex {
    /// Value name
    pub name: &'static str,
    /// Index into [`EnumDescriptor::values`]
    pub index: u32,
}

/// Compressed run of consecutive numbers mapping to a contiguous index
/// span.
///
/// Tables of these must carry one extra sentinel entry at the end whose
/// `orig_index` is the total number of values, so a run's length is
/// `next.orig_index - this.orig_index`.
#[derive(Debug, Clone, Copy)]
pub struct IntRange {
    /// First numeric value of the run
    pub start_value: i32,
    /// Index of that value in the original sorted array
    pub orig_index: u32,
}

/// Locate `value` in a sentinel-terminated range table.
///
/// Returns the index into the original array, or None if no run contains
/// the value. Binary search over run starts; O(log n).
pub(crate) fn int_range_lookup(ranges: &[IntRange], value: i32) -> Option<usize> {
    if ranges.len() < 2 {
        return None;
    }
    let n_ranges = ranges.len() - 1; // last entry is the sentinel
    let run_len =
        |i: usize| -> i64 { i64::from(ranges[i + 1].orig_index - ranges[i].orig_index) };
    let value = i64::from(value);

    let mut start = 0usize;
    let mut n = n_ranges;
    while n > 1 {
        let mid = start + n / 2;
        if value < i64::from(ranges[mid].start_value) {
            n = mid - start;
        } else if value >= i64::from(ranges[mid].start_value) + run_len(mid) {
            let new_start = mid + 1;
            n = start + n - new_start;
            start = new_start;
        } else {
            return Some(
                (value - i64::from(ranges[mid].start_value)) as usize
                    + ranges[mid].orig_index as usize,
            );
        }
    }
    if n > 0
        && i64::from(ranges[start].start_value) <= value
        && value < i64::from(ranges[start].start_value) + run_len(start)
    {
        return Some(
            (value - i64::from(ranges[start].start_value)) as usize
                + ranges[start].orig_index as usize,
        );
    }
    None
}

/// Description of an enumeration type
pub struct EnumDescriptor {
    /// Qualified name
    pub name: &'static str,
    /// Unqualified name
    pub short_name: &'static str,
    /// Name of the generated Rust type
    pub type_name: &'static str,
    /// '.'-separated namespace
    pub package_name: &'static str,
    /// Distinct values, ascending by number; on duplicate numbers the
    /// first definition wins
    pub values: &'static [EnumValue],
    /// Name-sorted index (aliases included), pointing into `values`
    pub values_by_name: &'static [EnumValueIndex],
    /// Sentinel-terminated compressed runs for numeric lookup
    pub value_ranges: &'static [IntRange],
}

impl EnumDescriptor {
    /// Look up a value by its number; unmatched numbers return None
    pub fn value_by_number(&self, number: i32) -> Option<&EnumValue> {
        int_range_lookup(self.value_ranges, number).map(|i| &self.values[i])
    }

    /// Look up a value by name
    pub fn value_by_name(&self, name: &str) -> Option<&EnumValue> {
        self.values_by_name
            .binary_search_by(|e| e.name.cmp(name))
            .ok()
            .map(|pos| &self.values[self.values_by_name[pos].index as usize])
    }
}

impl fmt::Debug for EnumDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumDescriptor")
            .field("name", &self.name)
            .field("n_values", &self.values.len())
            .finish()
    }
}

/// Description of a single RPC method
#[derive(Debug)]
pub struct MethodDescriptor {
    /// Method name, as given in the `.proto` file
    pub name: &'static str,
    /// Request message type
    pub input: &'static MessageDescriptor,
    /// Response message type
    pub output: &'static MessageDescriptor,
}

/// Description of a service.
///
/// The codec itself never invokes services; this is the descriptor-side
/// contract consumed by an external RPC/transport layer.
pub struct ServiceDescriptor {
    /// Qualified name
    pub name: &'static str,
    /// Unqualified name
    pub short_name: &'static str,
    /// Name of the generated Rust type
    pub type_name: &'static str,
    /// '.'-separated namespace
    pub package_name: &'static str,
    /// Methods, in `.proto` file order
    pub methods: &'static [MethodDescriptor],
    /// Indices into `methods`, sorted lexicographically by method name
    pub method_indices_by_name: &'static [u32],
}

impl ServiceDescriptor {
    /// Look up a method by name
    pub fn method_by_name(&self, name: &str) -> Option<&MethodDescriptor> {
        self.method_indices_by_name
            .binary_search_by(|&i| self.methods[i as usize].name.cmp(name))
            .ok()
            .map(|pos| &self.methods[self.method_indices_by_name[pos] as usize])
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("n_methods", &self.methods.len())
            .finish()
    }
}
