pub mod sqlite;
pub mod store;

pub use sqlite::SqliteVectorStore;
pub use store::{ChunkRecord, SearchHit, VectorStore};
