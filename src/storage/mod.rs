//! Graph data model: property values, vertex and edge payloads, and name interning.

mod edge;
mod entity;
mod names;
mod props;
mod value;
mod vertex;

pub use edge::Edge;
pub use entity::Entity;
pub use names::NameIdMapper;
pub use props::PropertyMap;
pub use value::PropertyValue;
pub use vertex::{EdgeRef, Vertex};
