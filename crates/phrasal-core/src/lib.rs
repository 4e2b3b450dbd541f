pub mod decoder;
pub mod engine;
pub mod features;
pub mod model;
pub mod sequence;
pub mod settings;
pub mod vocab;
pub(crate) mod worker;

pub use decoder::{DecodeError, PhraseStep, Translation};
pub use engine::{BatchSummary, DecodeOutcome, DecodeRequest, Decoder, Models};
