pub mod memory;
pub mod pinecone;
pub mod qdrant;

pub use memory::MemoryIndex;
pub use pinecone::PineconeStore;
pub use qdrant::QdrantStore;
