//! Session lifecycle: connectivity state and the supervising control loop.

pub mod state;
pub mod supervisor;

pub use state::SessionState;
pub use supervisor::SessionSupervisor;
