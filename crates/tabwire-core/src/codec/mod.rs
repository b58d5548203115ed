//! The size, pack, and unpack engines.
//!
//! All three walk the same descriptor tables: [`packed_size`] computes the
//! exact output length, [`pack`] emits it, and [`unpack`] reverses it with
//! allocator-accounted storage. Sizing and packing a well-formed message
//! cannot fail; every fallible path lives in [`unpack`].

mod pack;
mod size;
mod unpack;

pub use pack::{pack, pack_to_vec};
pub use size::packed_size;
pub use unpack::unpack;
