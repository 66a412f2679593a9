use super::engine::TeraEngine;
use super::refinement::RefinementChoice;
use crate::error::PromptError;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tera::Context;

/// Named instruction pattern with a single `topic` slot.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum TemplateCategory {
    #[default]
    General,
    Research,
    Creative,
    Tech,
    TechnicalTutorial,
    BusinessCaseStudy,
    NarrativeEssay,
    CodeDocumentation,
}

impl TemplateCategory {
    /// Map a wire name to a category. Unknown names resolve to `General`.
    pub fn resolve(name: &str) -> Self {
        Self::from_str(name.trim()).unwrap_or_default()
    }

    pub fn names() -> Vec<&'static str> {
        Self::iter().map(Into::into).collect()
    }

    fn template(self) -> &'static str {
        match self {
            Self::General => GENERAL,
            Self::Research => RESEARCH,
            Self::Creative => CREATIVE,
            Self::Tech => TECH,
            Self::TechnicalTutorial => TECHNICAL_TUTORIAL,
            Self::BusinessCaseStudy => BUSINESS_CASE_STUDY,
            Self::NarrativeEssay => NARRATIVE_ESSAY,
            Self::CodeDocumentation => CODE_DOCUMENTATION,
        }
    }
}

const GENERAL: &str = "\
Generate a highly detailed and structured prompt based on the user input: '{{ topic }}'. This prompt must be comprehensive, \
including a clear instruction (e.g., 'Write', 'Explain', 'Describe'), specific details about the topic or task, guidance \
on tone (e.g., informative, creative), audience (e.g., general public, experts), and any relevant constraints (e.g., word count \
range of 500-2000 words), structured with numbered sections or bullet points where applicable, encouraging thorough exploration \
of the subject matter without any brevity restrictions.";

const RESEARCH: &str = "\
Generate a detailed prompt for a comprehensive research report on the topic: '{{ topic }}', including sections for introduction, \
methodology, findings, and conclusion, with a suggested word count range of 750-2000 words. The prompt must provide specific \
instructions (e.g., 'Write', 'Analyze'), define the audience (e.g., academic or general with basic knowledge), set an informative \
tone, include guidance on citing sources (where possible), and encourage a structured, in-depth exploration of the topic with \
multiple subsections and detailed requirements.";

const CREATIVE: &str = "\
Generate an elaborate prompt for a creative story about '{{ topic }}', specifying plot points, characters, and setting, \
with a suggested length of 500-1500 words. The prompt must include a clear instruction (e.g., 'Write', 'Create'), \
define a creative tone (e.g., adventurous, emotional), suggest a target audience (e.g., young adults, general readers), \
and provide detailed guidance on structure (e.g., beginning, climax, resolution) and character development, encouraging \
rich narrative depth without brevity constraints.";

const TECH: &str = "\
Generate a detailed prompt to explain the concept of '{{ topic }}', including its applications, implications, and technical details, \
with a suggested word count range of 500-2000 words. The prompt must include a clear instruction (e.g., 'Explain', 'Describe'), \
define an informative tone suitable for a technical audience with some background, provide guidance on using examples and diagrams \
where applicable, and encourage a thorough breakdown of the topic without any brevity restrictions.";

const TECHNICAL_TUTORIAL: &str = "\
Generate a detailed prompt for a step-by-step technical tutorial on the topic: '{{ topic }}', with a suggested word count range of \
500-2000 words. The prompt must include a clear instruction (e.g., 'Create', 'Guide'), define an educational tone for beginners \
with some technical knowledge, provide a structured format with numbered steps or sections (e.g., setup, execution, examples), \
include practical examples or scenarios, and encourage a thorough, actionable explanation without brevity restrictions.";

const BUSINESS_CASE_STUDY: &str = "\
Generate a detailed prompt for a business case study on the topic: '{{ topic }}', with a suggested word count range of 750-2000 words. \
The prompt must include a clear instruction (e.g., 'Analyze', 'Evaluate'), define a professional tone for business professionals, \
provide a structured format with sections (e.g., background, analysis, recommendations), include data-driven insights or hypothetical \
metrics where applicable, and encourage a comprehensive exploration of the topic without brevity constraints.";

const NARRATIVE_ESSAY: &str = "\
Generate a detailed prompt for a narrative essay on the topic: '{{ topic }}', with a suggested length of 500-1500 words. The prompt \
must include a clear instruction (e.g., 'Write', 'Narrate'), define a reflective or storytelling tone, suggest an audience (e.g., \
general readers, students), provide guidance on a chronological structure (e.g., introduction, events, reflection), and encourage \
a rich, personal narrative without brevity restrictions.";

const CODE_DOCUMENTATION: &str = "\
Generate a detailed prompt for documenting a code-related topic: '{{ topic }}', with a suggested word count range of 500-1500 words. \
The prompt must include a clear instruction (e.g., 'Document', 'Explain'), define a technical tone for developers, provide a \
structured format with sections (e.g., overview, usage, examples), include pseudocode or function signatures where applicable, \
and encourage a thorough explanation of the code's purpose and implementation without brevity restrictions.";

const REFINE_ADD_CONTEXT: &str = "\
Refine this detailed prompt by incorporating the extra context '{{ additional_input }}', preserving its comprehensive \
structure and depth, suitable for a 500-2000 word response. IMPORTANT: Do not include any explanatory text at the beginning \
like \"Here's the refined prompt\". Just output the refined prompt directly: '{{ prompt }}'";

const REFINE_DEFAULT: &str = "\
Refine this detailed prompt with the extra context '{{ additional_input }}', preserving its structure and depth. \
Output only the refined prompt: '{{ prompt }}'";

const REFINE_ADD_CONTEXT_NAME: &str = "refine/add_context";
const REFINE_DEFAULT_NAME: &str = "refine/default";

/// Every category template plus the two refinement instructions, compiled
/// once at startup and shared read-only afterwards.
pub struct TemplateLibrary {
    engine: TeraEngine,
}

impl TemplateLibrary {
    pub fn new() -> Result<Self, PromptError> {
        let mut engine = TeraEngine::new();
        for category in TemplateCategory::iter() {
            engine.add_template(category.as_ref(), category.template())?;
        }
        engine.add_template(REFINE_ADD_CONTEXT_NAME, REFINE_ADD_CONTEXT)?;
        engine.add_template(REFINE_DEFAULT_NAME, REFINE_DEFAULT)?;
        Ok(Self { engine })
    }

    /// Fill the category's topic slot.
    pub fn render_topic(
        &self,
        category: TemplateCategory,
        topic: &str,
    ) -> Result<String, PromptError> {
        let mut ctx = Context::new();
        ctx.insert("topic", topic);
        self.engine.render(category.as_ref(), &ctx)
    }

    /// Build the instruction that asks the model to refine `prompt`.
    pub fn render_refinement(
        &self,
        choice: RefinementChoice,
        prompt: &str,
        additional_input: &str,
    ) -> Result<String, PromptError> {
        let name = match choice {
            RefinementChoice::AddContext => REFINE_ADD_CONTEXT_NAME,
            RefinementChoice::Default => REFINE_DEFAULT_NAME,
        };

        let mut ctx = Context::new();
        ctx.insert("prompt", prompt);
        ctx.insert("additional_input", additional_input);
        self.engine.render(name, &ctx)
    }
}
