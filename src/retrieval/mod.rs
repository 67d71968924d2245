// Similarity search over the document vector store
pub mod engine;
pub mod qdrant;
pub mod supabase;

pub use engine::{RetrievalEngine, SearchParams, VectorStore};
pub use qdrant::QdrantStore;
pub use supabase::SupabaseStore;
