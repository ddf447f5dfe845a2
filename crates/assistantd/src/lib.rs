//! assistantd: serialized single-slot LLM inference over a bare TCP socket.

pub mod config;
pub mod engine;
pub mod listener;
pub mod session;
pub mod slot;

pub use config::ServerConfig;
pub use engine::{CommandEngine, EngineConfig, EngineError, InferenceEngine, TokenStream};
pub use listener::{Listener, ListenerError};
pub use session::{Session, SessionError};
pub use slot::{ExclusiveSlot, SlotPermit};
