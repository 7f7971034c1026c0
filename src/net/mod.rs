//! TCP transport: session lifecycle and the two transfer agents

pub mod receiver;
pub mod sender;
pub mod session;

pub use receiver::ReceiverAgent;
pub use sender::SenderAgent;
pub use session::{SessionState, StateEvent, StopToken};
