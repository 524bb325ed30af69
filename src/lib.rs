pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;
pub use crate::config::DuckConfig;

pub use crate::adapters::{ElementSource, MapSource, NestedSource};
pub use crate::core::{
    adapter::{AdaptedCollection, DuckAdapter},
    cache::CacheStats,
    converter::{ConverterRegistry, GenericStringConverter, NumericConverter},
    engine::DuckEngine,
    shape::ShapeDescriptor,
};
pub use crate::domain::model::{Access, AdaptOptions, MemberKind, MemberSpec, ShapeSpec, ValueType};
pub use crate::domain::ports::{BackingSource, Converter, ShapeProvider, SourceSignature};
pub use crate::utils::error::{AdaptError, Result};
