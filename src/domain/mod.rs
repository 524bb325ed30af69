// Domain layer: core models and ports (interfaces). No external dependencies beyond serde/serde_json.

pub mod model;
pub mod ports;
