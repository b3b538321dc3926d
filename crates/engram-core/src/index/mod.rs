//! Lexical indexing
//!
//! An in-process, incrementally updatable BM25 index over node text fields.

mod bm25;

pub use bm25::{
    tokenize, Bm25Index, FieldWeights, IndexedFields, LexicalHit, BM25_B, BM25_K1,
};
