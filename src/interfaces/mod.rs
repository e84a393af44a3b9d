//! Adapters that drive the bridge from outside the library.

pub mod script;
