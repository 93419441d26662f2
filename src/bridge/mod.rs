//! Protocol bridge: drives exactly one external agent process per run and
//! exposes its stream-json output as a lazy, cancellable sequence of typed
//! messages, with an optional return channel over stdin.

pub mod codec;
pub mod locator;
pub mod process;

pub use codec::{AgentMessage, ContentBlock, RunStats, Usage};
pub use process::{AgentProcess, ProcessSpec};
