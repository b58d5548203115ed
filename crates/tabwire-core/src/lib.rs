//! # tabwire-core
//!
//! A descriptor-table-driven Protocol Buffers wire codec.
//!
//! One set of engines serializes and deserializes *any* message type from
//! static descriptor tables, instead of generating per-type codec code.
//! An external `.proto` compiler emits `static` [`descriptor`] tables; this
//! crate provides the runtime that walks them:
//!
//! - Computing the exact serialized size of a message
//! - Packing a message into wire bytes
//! - Unpacking wire bytes into a message, with allocator accounting
//! - Releasing everything an unpack allocated
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`wire`]: Varint, zigzag, and tag framing primitives
//! - [`descriptor`]: Static message/field/enum/service tables
//! - [`message`]: Dynamic message instances with per-field slots
//! - [`codec`]: The size, pack, and unpack engines
//! - [`alloc`]: Pluggable allocation accounting
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use tabwire_core::{pack_to_vec, unpack, Message, SystemAllocator, Value};
//! # use tabwire_core::descriptor::{FieldDescriptor, FieldType, Label, MessageDescriptor};
//! # static FIELDS: [FieldDescriptor; 1] = [FieldDescriptor {
//! #     name: "count", json_name: "count", id: 1, label: Label::Optional,
//! #     kind: FieldType::Int32, default_value: None, packed: false, oneof_index: None,
//! # }];
//! # static BY_NAME: [u32; 1] = [0];
//! # static DESC: MessageDescriptor = MessageDescriptor {
//! #     name: "demo.Counter", short_name: "Counter", type_name: "Counter",
//! #     package_name: "demo", size_of: 64, fields: &FIELDS,
//! #     fields_sorted_by_name: &BY_NAME, init: None,
//! # };
//!
//! // DESC is a generated static MessageDescriptor
//! let mut msg = Message::new(&DESC);
//! msg.set(1, Value::Int32(150));
//! let bytes = pack_to_vec(&msg);
//!
//! let decoded = unpack(&DESC, &SystemAllocator, &bytes)?;
//! assert_eq!(decoded.get(1), Some(&Value::Int32(150)));
//! decoded.free_unpacked(&SystemAllocator);
//! # Ok::<(), tabwire_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! The [`Allocator`] trait is the customization seam: implement it to
//! enforce decode memory budgets or to account allocations, and the unpack
//! engine guarantees exact rollback through it on any failure.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod alloc;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod message;
pub mod wire;

// Re-export primary types for convenience
pub use alloc::{Allocator, CountingAllocator, SystemAllocator};
pub use codec::{pack, pack_to_vec, packed_size, unpack};
pub use descriptor::{
    EnumDescriptor, FieldDescriptor, FieldType, Label, MessageDescriptor, ServiceDescriptor,
};
pub use error::{Error, Result};
pub use message::{FieldValue, Message, UnknownField, Value};
pub use wire::{WireType, MAX_FIELD_NUMBER};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
