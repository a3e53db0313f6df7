//! Built-in memory manipulators.
//!
//! Each manipulator owns its configuration and reads the agent's memory
//! through the [`MemoryStore`](agentverse_state::MemoryStore) it was built with.

pub mod filter;
pub mod reflection;
pub mod simple;
pub mod summarize;
pub mod summary;
pub mod transform;

pub use filter::{FilterCriteria, FilterManipulator, FilterOutcome};
pub use reflection::{
    ReflectionConfig, ReflectionManipulator, ReflectionPhase, ReflectionState, IMMEDIACY_PROMPT,
    IMPORTANCE_PROMPT,
};
pub use simple::{BasicManipulator, SimpleConfig, SimpleManipulator};
pub use summarize::{SummarizeConfig, SummarizeManipulator};
pub use summary::{SummaryConfig, SummaryManipulator, DEFAULT_SUMMARY_TEMPLATE};
pub use transform::{FormatKind, TransformConfig, TransformFormat, TransformManipulator};
