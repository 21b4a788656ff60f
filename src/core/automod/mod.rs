// Automod - content classification for inbound messages.

pub mod blacklist_matcher;
pub mod text_normalizer;

pub use blacklist_matcher::*;
pub use text_normalizer::*;
