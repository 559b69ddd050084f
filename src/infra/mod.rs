pub mod document_store;
pub mod http_client;
pub mod memory_sink;

pub use document_store::SqliteDocumentStore;
pub use http_client::ReqwestHttp;
pub use memory_sink::InMemorySink;
