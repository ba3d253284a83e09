pub mod clock;
pub mod llm_bridge_client;

pub use clock::{Clock, ManualClock, SystemClock};
pub use llm_bridge_client::{CompletionProvider, LlmBridgeClient, LlmBridgeError};
