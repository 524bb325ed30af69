pub mod adapter;
pub mod binder;
pub mod cache;
pub mod converter;
pub mod engine;
pub mod shape;

pub use crate::domain::model::{AdaptOptions, ShapeSpec, ValueType};
pub use crate::domain::ports::{BackingSource, Converter, ShapeProvider, SourceSignature};
pub use crate::utils::error::Result;
