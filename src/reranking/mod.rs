// Optional reranking stage
//
// A secondary relevance pass over the retrieved candidates. Whether it runs
// is decided when the pipeline is built, not per query.

pub mod cross_encoder;
pub mod scorer;

pub use cross_encoder::CrossEncoderScorer;
pub use scorer::{KeywordScorer, ReRanker, RelevanceScorer};
