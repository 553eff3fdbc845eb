//! Field layer: the typed answer map and its consistency rules.

pub mod other;
pub mod store;

pub use store::FieldStore;
