//! Mapping rules and the translation engine.
//!
//! [`resolver`] turns the mapping document into rules whose endpoints are
//! indices into the loaded schema sets; [`engine`] owns the schemas plus
//! the resolved rules and performs the two directional conversions.

pub mod engine;
pub mod resolver;

pub use engine::Translator;
pub use resolver::{FieldPair, MappingRule, RuleDirection};
