mod backpressure;
mod coordinator;
mod events;

pub use backpressure::BackPressureGate;
pub use coordinator::{IssuanceCoordinator, IssuanceCoordinatorConfig, IssuanceCoordinatorDeps};
pub use events::{Event, EventBus};
