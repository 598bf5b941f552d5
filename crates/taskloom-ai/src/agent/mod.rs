//! Agent module: the agentic loop and the pieces it is built from.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`AgenticLoop`] | Bounded multi-turn run against an LLM |
//! | [`ConversationHistory`] | Append-only message buffer for one run |
//! | [`StuckDetector`] | Detects repeated identical tool calls |
//! | [`LoopObserver`] | Callback set reporting run progress |

mod agentic_loop;
mod history;
mod observer;
mod stuck;

pub use agentic_loop::{
    AgenticLoop, DEFAULT_MAX_ITERATIONS, IterationOutcome, LoopConfig, MAX_ITERATIONS_ENV,
    RunContext, RunStatus, RunSummary,
};
pub use history::ConversationHistory;
pub use observer::{
    ChannelObserver, LoopErrorKind, LoopEvent, LoopObserver, NullObserver, TracingObserver,
};
pub use stuck::{StuckDetector, StuckDetectorConfig, StuckInfo};
