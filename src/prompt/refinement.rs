use super::cleanup::strip_preamble;
use super::templates::{TemplateCategory, TemplateLibrary};
use crate::error::{EnhancerError, Result};
use crate::llm::PromptGenerator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper bound on refinements applied to one generated prompt.
pub const MAX_REFINEMENTS: u32 = 3;

/// Client-owned prompt state, round-tripped over the wire between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptState {
    pub text: String,
    pub refinement_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementStage {
    Fresh,
    Refining(u32),
    Exhausted,
}

impl PromptState {
    pub fn new(text: impl Into<String>, refinement_count: u32) -> Self {
        Self {
            text: text.into(),
            refinement_count,
        }
    }

    pub fn stage(&self) -> RefinementStage {
        match self.refinement_count {
            0 => RefinementStage::Fresh,
            n if n >= MAX_REFINEMENTS => RefinementStage::Exhausted,
            n => RefinementStage::Refining(n),
        }
    }

    pub fn can_refine(&self) -> bool {
        self.refinement_count < MAX_REFINEMENTS
    }
}

/// Refinement strategy. `"add_context"` selects [`AddContext`](Self::AddContext);
/// anything else, including a missing value, selects [`Default`](Self::Default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum RefinementChoice {
    AddContext,
    #[default]
    Default,
}

impl From<&str> for RefinementChoice {
    fn from(value: &str) -> Self {
        if value.trim() == "add_context" {
            Self::AddContext
        } else {
            Self::Default
        }
    }
}

impl From<String> for RefinementChoice {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

/// Drives a prompt from generation through at most [`MAX_REFINEMENTS`]
/// refinements. Holds no per-prompt state of its own.
pub struct RefinementStateMachine {
    generator: PromptGenerator,
    templates: Arc<TemplateLibrary>,
    clean_output: bool,
}

impl RefinementStateMachine {
    pub fn new(generator: PromptGenerator, templates: Arc<TemplateLibrary>) -> Self {
        Self {
            generator,
            templates,
            clean_output: true,
        }
    }

    /// Toggle stripping of explanatory preambles from generated text.
    pub fn with_output_cleaning(mut self, enabled: bool) -> Self {
        self.clean_output = enabled;
        self
    }

    fn finish(&self, raw: String) -> String {
        if self.clean_output {
            strip_preamble(&raw)
        } else {
            raw
        }
    }

    /// Generate a fresh prompt for `topic`. The only way into `Fresh`.
    pub async fn start(&self, topic: &str, category: TemplateCategory) -> Result<PromptState> {
        let instruction = self.templates.render_topic(category, topic)?;
        let raw = self.generator.generate(&instruction).await?;
        tracing::debug!(category = %category, chars = raw.len(), "prompt generated");
        Ok(PromptState::new(self.finish(raw), 0))
    }

    /// Apply one refinement step. Fails without calling the model once the
    /// state is exhausted.
    pub async fn refine(
        &self,
        state: &PromptState,
        additional_input: &str,
        choice: RefinementChoice,
    ) -> Result<PromptState> {
        if !state.can_refine() {
            return Err(EnhancerError::RefinementBoundExceeded {
                max: MAX_REFINEMENTS,
            });
        }

        let instruction =
            self.templates
                .render_refinement(choice, &state.text, additional_input)?;
        let raw = self.generator.generate(&instruction).await?;
        let next = PromptState::new(self.finish(raw), state.refinement_count + 1);
        tracing::debug!(?choice, stage = ?next.stage(), "prompt refined");
        Ok(next)
    }

    /// Send caller-supplied text straight to the model.
    pub async fn test(&self, text: &str) -> Result<String> {
        Ok(self.generator.generate(text).await?)
    }
}
