pub mod conversation;
pub mod embedding_service;
pub mod llm_service;
pub mod memory_service;
pub mod search_service;
pub mod storage_service;
pub mod vector_service;

pub use embedding_service::EmbeddingService;
pub use llm_service::LlmService;
pub use memory_service::MemoryService;
pub use search_service::SearchService;
pub use storage_service::StorageService;
pub use vector_service::VectorService;
