//! Preliminary names for resources that do not have a server path yet
//!
//! A [`Pending`] handle stands in for a path until the batch that creates
//! the resource commits. Links between not-yet-created resources (parent,
//! follows, refers_to) are written against [`Pending::path`]; the server
//! substitutes the real paths inside the same batch and the client maps the
//! handles back with [`crate::TransactionResult::resolve`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Prefix every preliminary name starts with
pub const PRELIMINARY_PREFIX: &str = "@pn";

/// Whether a path is (or starts with) a preliminary name
pub fn is_preliminary(path: &str) -> bool {
    path.starts_with(PRELIMINARY_PREFIX)
}

/// Handle to a resource whose path is not known yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pending(u64);

impl Pending {
    /// Arena index of this handle within its session
    pub fn index(&self) -> u64 {
        self.0
    }

    /// Placeholder path to use in links before the create round trip
    pub fn path(&self) -> String {
        format!("{}{}", PRELIMINARY_PREFIX, self.0)
    }
}

impl fmt::Display for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PRELIMINARY_PREFIX, self.0)
    }
}

/// Session-wide generator of [`Pending`] handles.
///
/// Clones share the counter, so handles stay unique across every
/// transaction built in the same client session.
#[derive(Debug, Clone, Default)]
pub struct PreliminaryNames {
    next: Arc<AtomicU64>,
}

impl PreliminaryNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next handle
    pub fn next(&self) -> Pending {
        Pending(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of handles issued so far
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
