//! Reply text generation.
//!
//! Generators are tried in order by a `GenerationChain`; the first reply
//! that arrives in time and clears the confidence bar wins. A static
//! template can sit at the end of the chain as a last resort.

mod chain;
mod generator;
mod http;

pub use chain::{GenerationChain, StaticReplyGenerator};
pub use generator::{ContentGenerator, GeneratedReply, GenerationContext, GenerationError};
pub use http::{HttpContentGenerator, HttpGeneratorConfig};
