pub mod breaker;
pub mod registry;

pub use breaker::{CircuitBreaker, CircuitPhase, CircuitState, FailureClass, PersistedCircuit};
pub use registry::DependencyGates;
