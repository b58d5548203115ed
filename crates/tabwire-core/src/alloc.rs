//! Pluggable allocation accounting for the unpack/free lifecycle.
//!
//! The unpack engine asks the caller-supplied [`Allocator`] for admission
//! before every allocation that becomes part of the message it is building:
//! the instance footprint of each (sub)message, every non-empty string or
//! bytes payload, every repeated-element slot, and every unknown-field
//! buffer. `free_unpacked` walks the same sites and reports each release
//! once. A refused allocation aborts the decode after an exact rollback:
//! every prior charge is refunded, nothing leaks, nothing is refunded
//! twice.
//!
//! Transient decode scratch that does not survive into the message (the
//! tag scan list) is not routed through the allocator.
//!
//! [`CountingAllocator`] is the fault-injection harness for that contract:
//! it can be told to refuse the j-th allocation and afterwards asserts
//! charge/refund symmetry.

use std::cell::Cell;

/// Admission and accounting interface for message-owned allocations.
///
/// Implementations are invoked from one logical thread of control per
/// unpack/free call; the runtime makes ordered alloc/free calls it expects
/// to be attributable, so interior mutability via [`Cell`] is fine.
pub trait Allocator {
    /// Account for an allocation of `size` bytes.
    ///
    /// Returning false refuses the allocation; the in-flight unpack fails
    /// with an out-of-memory error after rolling back.
    fn alloc(&self, size: usize) -> bool;

    /// Release a previously granted allocation of `size` bytes.
    fn free(&self, size: usize);
}

/// Charge `size` bytes against `allocator`; zero-sized payloads are never
/// charged (and never refunded).
pub(crate) fn charge<A: Allocator + ?Sized>(allocator: &A, size: usize) -> bool {
    size == 0 || allocator.alloc(size)
}

/// Refund a charge made with [`charge`].
pub(crate) fn refund<A: Allocator + ?Sized>(allocator: &A, size: usize) {
    if size > 0 {
        allocator.free(size);
    }
}

/// The default allocator: admits everything, tracks nothing.
///
/// Equivalent to decoding straight off the system heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn alloc(&self, _size: usize) -> bool {
        true
    }

    fn free(&self, _size: usize) {}
}

/// A counting, fault-injecting allocator for tests and budget enforcement.
///
/// Tracks the number of grants and releases and the outstanding byte total,
/// and can be configured to refuse the n-th allocation attempt (0-based).
/// A refused attempt is counted as an attempt but not as a grant.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    attempts: Cell<usize>,
    grants: Cell<usize>,
    releases: Cell<usize>,
    outstanding: Cell<usize>,
    fail_at: Cell<Option<usize>>,
}

impl CountingAllocator {
    /// Creates a new counting allocator that admits everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a counting allocator that refuses the `n`-th allocation
    /// attempt (0-based) and admits all others
    pub fn failing_at(n: usize) -> Self {
        let a = Self::default();
        a.fail_at.set(Some(n));
        a
    }

    /// Number of allocation attempts seen so far
    pub fn attempts(&self) -> usize {
        self.attempts.get()
    }

    /// Number of granted allocations
    pub fn grants(&self) -> usize {
        self.grants.get()
    }

    /// Number of releases
    pub fn releases(&self) -> usize {
        self.releases.get()
    }

    /// Bytes currently outstanding (granted minus released)
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding.get()
    }

    /// True when every grant has been released exactly once
    pub fn is_balanced(&self) -> bool {
        self.grants.get() == self.releases.get() && self.outstanding.get() == 0
    }
}

impl Allocator for CountingAllocator {
    fn alloc(&self, size: usize) -> bool {
        let attempt = self.attempts.get();
        self.attempts.set(attempt + 1);
        if self.fail_at.get() == Some(attempt) {
            return false;
        }
        self.grants.set(self.grants.get() + 1);
        self.outstanding.set(self.outstanding.get() + size);
        true
    }

    fn free(&self, size: usize) {
        self.releases.set(self.releases.get() + 1);
        let outstanding = self.outstanding.get();
        // Releasing more than was granted is a runtime accounting bug.
        assert!(
            outstanding >= size,
            "release of {} bytes exceeds {} outstanding",
            size,
            outstanding
        );
        self.outstanding.set(outstanding - size);
    }
}
