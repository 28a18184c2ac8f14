//! Multi-query retrieval over a document store

mod multi_query;

pub use multi_query::{merge_results, parse_variants, MultiQueryRetriever};
