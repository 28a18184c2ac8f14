//! Per-document vector stores, their lifecycle handles, and the handle registry

mod handle;
mod paths;
mod registry;
mod vector_store;

pub use handle::{HandleState, StoreHandle};
pub use paths::{document_name, location_for, store_location};
pub use registry::StoreRegistry;
pub use vector_store::{cosine_similarity, VectorIndex, VectorStore};
