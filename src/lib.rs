pub mod context;
pub mod core;
pub mod embedding;
pub mod history;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod retrieval;
pub mod routing;
pub mod server;
pub mod service;
pub mod state;
pub mod stream;
