//! End-to-end properties of the size/pack/unpack engines over shared
//! static descriptor fixtures: roundtrip fidelity, exact sizing, unknown
//! field forwarding, oneof exclusivity, message merging, and allocator
//! rollback.

use pretty_assertions::assert_eq;
use std::mem;

use tabwire_core::descriptor::{
    DefaultValue, EnumDescriptor, EnumValue, EnumValueIndex, FieldDescriptor, FieldType, IntRange,
    Label, MessageDescriptor, MethodDescriptor, ServiceDescriptor,
};
use tabwire_core::{
    pack, pack_to_vec, packed_size, unpack, CountingAllocator, Message, SystemAllocator, Value,
    WireType,
};

// ---------------------------------------------------------------------
// Corner: an enum with a gap in its numeric values
// ---------------------------------------------------------------------

static CORNER_VALUES: [EnumValue; 5] = [
    EnumValue { name: "NONE", type_name: "None", number: 0 },
    EnumValue { name: "NE", type_name: "Ne", number: 1 },
    EnumValue { name: "NW", type_name: "Nw", number: 2 },
    EnumValue { name: "SE", type_name: "Se", number: 10 },
    EnumValue { name: "SW", type_name: "Sw", number: 11 },
];
static CORNER_BY_NAME: [EnumValueIndex; 5] = [
    EnumValueIndex { name: "NE", index: 1 },
    EnumValueIndex { name: "NONE", index: 0 },
    EnumValueIndex { name: "NW", index: 2 },
    EnumValueIndex { name: "SE", index: 3 },
    EnumValueIndex { name: "SW", index: 4 },
];
static CORNER_RANGES: [IntRange; 3] = [
    IntRange { start_value: 0, orig_index: 0 },
    IntRange { start_value: 10, orig_index: 3 },
    IntRange { start_value: 0, orig_index: 5 },
];
static CORNER: EnumDescriptor = EnumDescriptor {
    name: "fixtures.Corner",
    short_name: "Corner",
    type_name: "Corner",
    package_name: "fixtures",
    values: &CORNER_VALUES,
    values_by_name: &CORNER_BY_NAME,
    value_ranges: &CORNER_RANGES,
};

// ---------------------------------------------------------------------
// Scalars: one optional field of every declared type
// ---------------------------------------------------------------------

static SCALARS_FIELDS: [FieldDescriptor; 16] = [
    FieldDescriptor { name: "int32", json_name: "int32", id: 1, label: Label::Optional, kind: FieldType::Int32, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "sint32", json_name: "sint32", id: 2, label: Label::Optional, kind: FieldType::Sint32, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "sfixed32", json_name: "sfixed32", id: 3, label: Label::Optional, kind: FieldType::Sfixed32, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "int64", json_name: "int64", id: 4, label: Label::Optional, kind: FieldType::Int64, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "sint64", json_name: "sint64", id: 5, label: Label::Optional, kind: FieldType::Sint64, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "sfixed64", json_name: "sfixed64", id: 6, label: Label::Optional, kind: FieldType::Sfixed64, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "uint32", json_name: "uint32", id: 7, label: Label::Optional, kind: FieldType::Uint32, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "fixed32", json_name: "fixed32", id: 8, label: Label::Optional, kind: FieldType::Fixed32, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "uint64", json_name: "uint64", id: 9, label: Label::Optional, kind: FieldType::Uint64, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "fixed64", json_name: "fixed64", id: 10, label: Label::Optional, kind: FieldType::Fixed64, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "float", json_name: "float", id: 11, label: Label::Optional, kind: FieldType::Float, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "double", json_name: "double", id: 12, label: Label::Optional, kind: FieldType::Double, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "boolean", json_name: "boolean", id: 13, label: Label::Optional, kind: FieldType::Bool, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "corner", json_name: "corner", id: 14, label: Label::Optional, kind: FieldType::Enum(&CORNER), default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "label", json_name: "label", id: 15, label: Label::Optional, kind: FieldType::String, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "blob", json_name: "blob", id: 16, label: Label::Optional, kind: FieldType::Bytes, default_value: None, packed: false, oneof_index: None },
];
static SCALARS_BY_NAME: [u32; 16] = [15, 12, 13, 11, 7, 9, 10, 0, 3, 14, 2, 5, 1, 4, 6, 8];
static SCALARS: MessageDescriptor = MessageDescriptor {
    name: "fixtures.Scalars",
    short_name: "Scalars",
    type_name: "Scalars",
    package_name: "fixtures",
    size_of: mem::size_of::<Message>(),
    fields: &SCALARS_FIELDS,
    fields_sorted_by_name: &SCALARS_BY_NAME,
    init: None,
};

// ---------------------------------------------------------------------
// Child / Outer: nesting, repetition, and a oneof
// ---------------------------------------------------------------------

static CHILD_FIELDS: [FieldDescriptor; 2] = [
    FieldDescriptor { name: "name", json_name: "name", id: 1, label: Label::Optional, kind: FieldType::String, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "codes", json_name: "codes", id: 2, label: Label::Repeated, kind: FieldType::Int32, default_value: None, packed: false, oneof_index: None },
];
static CHILD_BY_NAME: [u32; 2] = [1, 0];
static CHILD: MessageDescriptor = MessageDescriptor {
    name: "fixtures.Child",
    short_name: "Child",
    type_name: "Child",
    package_name: "fixtures",
    size_of: mem::size_of::<Message>(),
    fields: &CHILD_FIELDS,
    fields_sorted_by_name: &CHILD_BY_NAME,
    init: None,
};

static OUTER_FIELDS: [FieldDescriptor; 6] = [
    FieldDescriptor { name: "child", json_name: "child", id: 1, label: Label::Optional, kind: FieldType::Message(&CHILD), default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "values", json_name: "values", id: 2, label: Label::Repeated, kind: FieldType::Int32, default_value: None, packed: true, oneof_index: None },
    FieldDescriptor { name: "extras", json_name: "extras", id: 3, label: Label::Repeated, kind: FieldType::Int32, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "names", json_name: "names", id: 4, label: Label::Repeated, kind: FieldType::String, default_value: None, packed: false, oneof_index: None },
    FieldDescriptor { name: "num", json_name: "num", id: 5, label: Label::Optional, kind: FieldType::Uint32, default_value: None, packed: false, oneof_index: Some(0) },
    FieldDescriptor { name: "tag", json_name: "tag", id: 6, label: Label::Optional, kind: FieldType::String, default_value: None, packed: false, oneof_index: Some(0) },
];
static OUTER_BY_NAME: [u32; 6] = [0, 2, 3, 4, 5, 1];
static OUTER: MessageDescriptor = MessageDescriptor {
    name: "fixtures.Outer",
    short_name: "Outer",
    type_name: "Outer",
    package_name: "fixtures",
    size_of: mem::size_of::<Message>(),
    fields: &OUTER_FIELDS,
    fields_sorted_by_name: &OUTER_BY_NAME,
    init: None,
};

// ---------------------------------------------------------------------
// Env: required fields, with static defaults and a required submessage
// ---------------------------------------------------------------------

static ENV_FIELDS: [FieldDescriptor; 3] = [
    FieldDescriptor { name: "id", json_name: "id", id: 1, label: Label::Required, kind: FieldType::Int32, default_value: Some(DefaultValue::Int32(7)), packed: false, oneof_index: None },
    FieldDescriptor { name: "seed", json_name: "seed", id: 2, label: Label::Required, kind: FieldType::String, default_value: Some(DefaultValue::String("seed")), packed: false, oneof_index: None },
    FieldDescriptor { name: "child", json_name: "child", id: 3, label: Label::Required, kind: FieldType::Message(&CHILD), default_value: None, packed: false, oneof_index: None },
];
static ENV_BY_NAME: [u32; 3] = [2, 0, 1];
static ENV: MessageDescriptor = MessageDescriptor {
    name: "fixtures.Env",
    short_name: "Env",
    type_name: "Env",
    package_name: "fixtures",
    size_of: mem::size_of::<Message>(),
    fields: &ENV_FIELDS,
    fields_sorted_by_name: &ENV_BY_NAME,
    init: None,
};

fn sample_scalars() -> Message {
    let mut msg = Message::new(&SCALARS);
    msg.set(1, Value::Int32(-5));
    msg.set(2, Value::Int32(-7));
    msg.set(3, Value::Int32(-9));
    msg.set(4, Value::Int64(-1));
    msg.set(5, Value::Int64(-(1 << 40)));
    msg.set(6, Value::Int64(i64::MIN));
    msg.set(7, Value::Uint32(u32::MAX));
    msg.set(8, Value::Uint32(0xdead_beef));
    msg.set(9, Value::Uint64(u64::MAX));
    msg.set(10, Value::Uint64(1));
    msg.set(11, Value::Float(1.5));
    msg.set(12, Value::Double(-2.25));
    msg.set(13, Value::Bool(true));
    msg.set(14, Value::Enum(11));
    msg.set(15, Value::String("héllo".into()));
    msg.set(16, Value::Bytes(vec![0, 1, 255]));
    msg
}

fn sample_outer() -> Message {
    let mut msg = Message::new(&OUTER);
    let mut child = Message::new(&CHILD);
    child.set(1, Value::String("nested".into()));
    child.push(2, Value::Int32(1));
    child.push(2, Value::Int32(2));
    msg.set(1, Value::Message(child));
    for v in [3, 270, 86942] {
        msg.push(2, Value::Int32(v));
    }
    msg.push(3, Value::Int32(-1));
    msg.push(4, Value::String("ab".into()));
    msg.push(4, Value::String("c".into()));
    msg.set(6, Value::String("hey".into()));
    msg
}

#[test]
fn test_scalar_roundtrip_with_exact_size() {
    let msg = sample_scalars();
    let bytes = pack_to_vec(&msg);
    assert_eq!(bytes.len(), packed_size(&msg));
    let decoded = unpack(&SCALARS, &SystemAllocator, &bytes).unwrap();
    assert_eq!(decoded, msg);
    decoded.free_unpacked(&SystemAllocator);
}

#[test]
fn test_empty_message_packs_to_nothing() {
    let msg = Message::new(&SCALARS);
    assert_eq!(packed_size(&msg), 0);
    assert_eq!(pack_to_vec(&msg), Vec::<u8>::new());
}

#[test]
fn test_pack_appends_to_existing_buffer() {
    let mut msg = Message::new(&SCALARS);
    msg.set(13, Value::Bool(true));
    let mut buf = vec![0xde];
    pack(&msg, &mut buf);
    assert_eq!(buf[0], 0xde);
    assert_eq!(&buf[1..], &pack_to_vec(&msg)[..]);
}

#[test]
fn test_enum_value_outside_declared_members_roundtrips() {
    let mut msg = Message::new(&SCALARS);
    msg.set(14, Value::Enum(99));
    assert!(CORNER.value_by_number(99).is_none());
    let decoded = unpack(&SCALARS, &SystemAllocator, &pack_to_vec(&msg)).unwrap();
    assert_eq!(decoded.get(14), Some(&Value::Enum(99)));
}

#[test]
fn test_negative_enum_sign_extends() {
    let mut msg = Message::new(&SCALARS);
    msg.set(14, Value::Enum(-1));
    let bytes = pack_to_vec(&msg);
    // one tag byte plus a full 10-byte varint
    assert_eq!(bytes.len(), 11);
    assert_eq!(bytes.len(), packed_size(&msg));
    let decoded = unpack(&SCALARS, &SystemAllocator, &bytes).unwrap();
    assert_eq!(decoded.get(14), Some(&Value::Enum(-1)));
}

#[test]
fn test_outer_roundtrip_with_exact_size() {
    let msg = sample_outer();
    let bytes = pack_to_vec(&msg);
    assert_eq!(bytes.len(), packed_size(&msg));
    let decoded = unpack(&OUTER, &SystemAllocator, &bytes).unwrap();
    assert_eq!(decoded, msg);
}

#[test]
fn test_oneof_defaults_to_no_member() {
    let msg = Message::new(&OUTER);
    assert!(msg.active_oneof(0).is_none());
    assert!(!msg.has(5));
    assert!(!msg.has(6));
}

#[test]
fn test_oneof_last_member_on_wire_wins() {
    // num = 7 then tag = "x"
    let data = [0x28, 0x07, 0x32, 0x01, b'x'];
    let msg = unpack(&OUTER, &SystemAllocator, &data).unwrap();
    assert_eq!(msg.active_oneof(0).unwrap().name, "tag");
    assert!(!msg.has(5));
    assert_eq!(msg.get(6), Some(&Value::String("x".into())));
    // only the selected member is re-emitted
    assert_eq!(pack_to_vec(&msg), vec![0x32, 0x01, b'x']);
}

#[test]
fn test_packed_and_unpacked_wire_forms_decode_identically() {
    let packed = [0x12, 0x03, 0x01, 0x02, 0x03];
    let unpacked = [0x10, 0x01, 0x10, 0x02, 0x10, 0x03];
    let a = unpack(&OUTER, &SystemAllocator, &packed).unwrap();
    let b = unpack(&OUTER, &SystemAllocator, &unpacked).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        a.elements(2),
        &[Value::Int32(1), Value::Int32(2), Value::Int32(3)]
    );
}

#[test]
fn test_duplicate_submessage_members_merge() {
    // child { name: "a", codes: [1] } then child { codes: [2] }
    let data = [
        0x0a, 0x05, 0x0a, 0x01, b'a', 0x10, 0x01, // first occurrence
        0x0a, 0x02, 0x10, 0x02, // second occurrence
    ];
    let msg = unpack(&OUTER, &SystemAllocator, &data).unwrap();
    let Some(Value::Message(child)) = msg.get(1) else {
        panic!("child not decoded");
    };
    assert_eq!(child.get(1), Some(&Value::String("a".into())));
    assert_eq!(child.elements(2), &[Value::Int32(1), Value::Int32(2)]);
}

#[test]
fn test_unknown_fields_survive_a_decode_encode_cycle() {
    // field 99 (varint 42) is not declared on Outer
    let mut data = pack_to_vec(&sample_outer());
    data.extend_from_slice(&[0x98, 0x06, 0x2a]);

    let msg = unpack(&OUTER, &SystemAllocator, &data).unwrap();
    assert_eq!(msg.unknown_fields().len(), 1);
    assert_eq!(msg.unknown_fields()[0].tag, 99);
    assert_eq!(msg.unknown_fields()[0].wire_type, WireType::Varint);

    let repacked = pack_to_vec(&msg);
    assert_eq!(repacked.len(), packed_size(&msg));
    assert!(repacked.ends_with(&[0x98, 0x06, 0x2a]));
    let again = unpack(&OUTER, &SystemAllocator, &repacked).unwrap();
    assert_eq!(again, msg);
}

#[test]
fn test_truncated_input_charges_nothing() {
    let data = pack_to_vec(&sample_outer());
    let alloc = CountingAllocator::new();
    // Framing is validated before any allocation happens
    assert!(unpack(&OUTER, &alloc, &data[..data.len() - 1]).is_err());
    assert_eq!(alloc.attempts(), 0);
}

#[test]
fn test_allocator_accounting_balances_after_free() {
    let data = pack_to_vec(&sample_outer());
    let alloc = CountingAllocator::new();
    let msg = unpack(&OUTER, &alloc, &data).unwrap();
    assert!(alloc.outstanding_bytes() > 0);
    msg.free_unpacked(&alloc);
    assert!(alloc.is_balanced());
    assert_eq!(alloc.grants(), alloc.releases());
}

#[test]
fn test_allocation_failure_rolls_back_at_every_site() {
    let mut data = pack_to_vec(&sample_outer());
    data.extend_from_slice(&[0x98, 0x06, 0x2a]); // plus an unknown field

    let probe = CountingAllocator::new();
    let msg = unpack(&OUTER, &probe, &data).unwrap();
    msg.free_unpacked(&probe);
    assert!(probe.is_balanced());

    for attempt in 0..probe.attempts() {
        let alloc = CountingAllocator::failing_at(attempt);
        let err = unpack(&OUTER, &alloc, &data).unwrap_err();
        assert!(err.is_out_of_memory(), "attempt {}: {}", attempt, err);
        assert!(
            alloc.is_balanced(),
            "charges leaked after refusing attempt {}",
            attempt
        );
    }
}

#[test]
fn test_required_defaults_installed_on_init() {
    let msg = Message::new(&ENV);
    assert_eq!(msg.get(1), Some(&Value::Int32(7)));
    assert_eq!(msg.get(2), Some(&Value::String("seed".into())));
    assert_eq!(msg.get(3), None);
}

#[test]
fn test_missing_required_is_not_a_decode_error() {
    let msg = unpack(&ENV, &SystemAllocator, &[]).unwrap();
    assert!(!msg.check());
    assert_eq!(msg.get(1), Some(&Value::Int32(7)));
}

#[test]
fn test_unset_required_submessage_packs_as_empty_body() {
    let msg = Message::new(&ENV);
    let bytes = pack_to_vec(&msg);
    assert_eq!(
        bytes,
        vec![0x08, 0x07, 0x12, 0x04, b's', b'e', b'e', b'd', 0x1a, 0x00]
    );
    assert_eq!(bytes.len(), packed_size(&msg));
    // decoding it back materializes the empty child, satisfying check()
    let decoded = unpack(&ENV, &SystemAllocator, &bytes).unwrap();
    assert!(decoded.check());
}

#[test]
fn test_required_string_default_is_charged_and_refunded() {
    let probe = CountingAllocator::new();
    let msg = unpack(&ENV, &probe, &[]).unwrap();
    msg.free_unpacked(&probe);
    assert!(probe.is_balanced());

    for attempt in 0..probe.attempts() {
        let alloc = CountingAllocator::failing_at(attempt);
        assert!(unpack(&ENV, &alloc, &[]).is_err());
        assert!(alloc.is_balanced(), "attempt {}", attempt);
    }
}

#[test]
fn test_service_method_lookup() {
    static METHODS: [MethodDescriptor; 2] = [
        MethodDescriptor { name: "Ping", input: &CHILD, output: &CHILD },
        MethodDescriptor { name: "Fetch", input: &OUTER, output: &CHILD },
    ];
    static METHODS_BY_NAME: [u32; 2] = [1, 0];
    static SVC: ServiceDescriptor = ServiceDescriptor {
        name: "fixtures.Directory",
        short_name: "Directory",
        type_name: "Directory",
        package_name: "fixtures",
        methods: &METHODS,
        method_indices_by_name: &METHODS_BY_NAME,
    };
    assert_eq!(SVC.method_by_name("Ping").unwrap().input.name, CHILD.name);
    assert_eq!(SVC.method_by_name("Fetch").unwrap().input.name, OUTER.name);
    assert!(SVC.method_by_name("Drop").is_none());
}

#[test]
fn test_field_lookup_by_name_across_fixtures() {
    assert_eq!(SCALARS.field_by_name("sfixed64").unwrap().id, 6);
    assert_eq!(OUTER.field_by_name("values").unwrap().id, 2);
    assert!(OUTER.field_by_name("absent").is_none());
}
