//! Model providers: the producers whose results get memoized.

pub mod error;
pub mod gemini;

pub use error::{parse_provider_error, ProviderError};
pub use gemini::{GeminiClient, DEFAULT_GEMINI_MODEL};
