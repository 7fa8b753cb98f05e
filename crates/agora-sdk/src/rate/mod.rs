//! Ratings
//!
//! Each user has at most one rate item per rated object, created on the
//! first cast; every later cast appends a version to it. Aggregates are
//! computed by the server over the newest version of every rate item.

mod registry;
mod service;
mod widget;

pub use registry::{RateItemRegistry, RateItemSlot};
pub use service::{AggregatedRates, AuditTrailEntry, RateService};
pub use widget::{CastOutcome, RateState, RateWidget};
