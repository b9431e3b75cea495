pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{FlowforgeError, Result};
pub use traits::{
    Clock, CreatedChatflow, DependencyId, Embedder, FlowiseGateway, RawNodeDescriptor,
    StoredVectorRecord, SystemClock, VectorCollection, VectorIndex, VectorQueryHit,
};
pub use types::{
    Edge, FlowGraph, FlowTemplate, InputAnchor, InputValue, NodeDescriptor, NodeInstance,
    NodeRefTarget, OutputAnchor, ParameterConstraint, Position, Viewport,
};
