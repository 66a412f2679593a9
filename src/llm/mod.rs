pub mod gemini;
pub mod generator;
pub mod scrub;
pub mod traits;

pub use gemini::GeminiProvider;
pub use generator::PromptGenerator;
pub use scrub::sanitize_api_error;
pub use traits::{Provider, ProviderFuture};
