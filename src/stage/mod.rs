//! Processing stages shared by the decode and encode nodes.
//!
//! Each stage is a plain synchronous value: nodes compose them per message.

mod decoder;
mod encoder;
mod resolver;
mod router;

pub use decoder::{Decoded, MessageDecoder};
pub use encoder::{EncodedMessage, MessageEncoder};
pub use resolver::TypeResolver;
pub use router::{OutputRouter, MAX_OUTPUTS};
