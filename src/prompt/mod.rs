//! Prompt construction: category templates, refinement instructions and the
//! bounded refinement state machine.

pub mod cleanup;
pub mod engine;
pub mod refinement;
pub mod templates;

pub use cleanup::strip_preamble;
pub use engine::TeraEngine;
pub use refinement::{
    MAX_REFINEMENTS, PromptState, RefinementChoice, RefinementStage, RefinementStateMachine,
};
pub use templates::{TemplateCategory, TemplateLibrary};
