pub mod events;
pub mod machine;
pub mod registry;

pub use events::SessionEvent;
pub use machine::{SessionState, SessionStateMachine, INBOUND_QUEUE_DEPTH};
pub use registry::{RegistryError, SessionHandle, SessionRegistry};
