// Adapters layer: concrete backing sources the core can adapt.

pub mod map;
pub mod nested;

pub use map::MapSource;
pub use nested::{ElementSource, NestedSource};
