pub mod build;
pub mod edges;
pub mod layout;
pub mod ordering;
pub mod serialize;
pub mod validate;

pub use build::{build_flow, BuildSpec, CompositionNode};
pub use edges::{infer_edges, would_create_cycle};
pub use layout::{height_for, layout_graph};
pub use ordering::stable_order;
pub use serialize::serialize_flow;
pub use validate::validate_graph;
