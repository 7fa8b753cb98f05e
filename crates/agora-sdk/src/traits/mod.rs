//! Core traits for content types
//!
//! These traits define what a content type must provide to be created and
//! edited through the SDK's versioning helpers.

mod content;

pub use content::VersionedContent;
