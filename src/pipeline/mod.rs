//! Auto-reply pipeline.
//!
//! Each tick of [`cycle::PollCycle`] moves one unread message through:
//! 1. `MessageClassifier::classify()`: one generative call, substring policy
//! 2. `LabelService::apply_label()`: category label, created on first use
//! 3. `ReplyComposer::send()`: canned reply for the category
//! 4. `CheckpointStore::save()`: only after all of the above succeeded

pub mod classifier;
pub mod cycle;
pub mod labels;
pub mod reply;
pub mod types;

pub use classifier::MessageClassifier;
pub use cycle::{CycleConfig, PollCycle, PollerDeps};
pub use labels::LabelService;
pub use reply::ReplyComposer;
