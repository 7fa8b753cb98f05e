//! Application root
//!
//! Wires the resource client and every shared component together and hands
//! them to widgets and editors.

mod platform;

pub use platform::Platform;
