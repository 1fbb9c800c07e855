//! # VectorStore
//!
//! In-memory similarity index over document chunks.
//!
//! This module wraps a [HNSW](https://arxiv.org/abs/1603.09320) approximate
//! nearest-neighbor index (`hora` crate) together with the chunk each vector
//! was computed from. A store is built once from a complete batch of
//! `(embedding, chunk)` pairs and is read-only afterwards: a new upload builds
//! a new store rather than mutating the old one.
//!
//! Vectors are L2-normalised on the way in (and so are queries), which makes
//! Euclidean ranking equivalent to cosine ranking whatever the embedding
//! service returns.
//!
//! ## Quick Example
//! ```
//! use doku::splitter::Chunk;
//! use doku::vector_store::VectorStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let chunk = |i: usize, text: &str| Chunk {
//!     source: "doc.txt".into(), index: i, start: 0, text: text.into(),
//! };
//! let store = VectorStore::build(vec![
//!     (vec![1.0, 0.0], chunk(0, "about rust")),
//!     (vec![0.0, 1.0], chunk(1, "about tea")),
//! ])?;
//! let hits = store.search(&[0.9, 0.1], 1)?;
//! assert_eq!(hits[0].chunk.text, "about rust");
//! # Ok(()) }
//! ```

use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;

use crate::error::{DokuError, Result};
use crate::splitter::Chunk;

/// A retrieved chunk and its distance to the query (smaller is closer).
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub distance: f32,
}

/// Immutable HNSW index plus the chunk behind every vector id.
pub struct VectorStore {
    index: HNSWIndex<f32, usize>,
    /// Dimensionality of every vector in the index.
    dimension: usize,
    /// Vector id `i` maps to `chunks[i]`.
    chunks: Vec<Chunk>,
}

impl VectorStore {
    /// Builds an index from `(embedding, chunk)` pairs.
    ///
    /// # Errors
    /// - [`DokuError::EmptyDocument`] if `pairs` is empty.
    /// - [`DokuError::Index`] if the vectors disagree on dimensionality or the
    ///   HNSW index rejects an insert or fails to build.
    pub fn build(pairs: Vec<(Vec<f32>, Chunk)>) -> Result<Self> {
        let dimension = match pairs.first() {
            Some((vector, _)) if !vector.is_empty() => vector.len(),
            Some(_) => return Err(DokuError::Index("zero-length embedding".to_string())),
            None => return Err(DokuError::EmptyDocument),
        };

        let mut index = HNSWIndex::<f32, usize>::new(dimension, &HNSWParams::default());
        let mut chunks = Vec::with_capacity(pairs.len());

        for (id, (vector, chunk)) in pairs.into_iter().enumerate() {
            if vector.len() != dimension {
                return Err(DokuError::Index(format!(
                    "dimension mismatch: expected {dimension}, got {} for chunk {}",
                    vector.len(),
                    chunk.index
                )));
            }
            index
                .add(&normalized(&vector), id)
                .map_err(|err| DokuError::Index(format!("add failed: {err}")))?;
            chunks.push(chunk);
        }

        index
            .build(Metric::Euclidean)
            .map_err(|err| DokuError::Index(format!("build failed: {err}")))?;

        Ok(Self {
            index,
            dimension,
            chunks,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Look up a chunk by vector id.
    pub fn get(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    /// Query the index for the `top_k` nearest chunks to `vector`, best first.
    ///
    /// # Errors
    /// `DokuError::Index` if `vector.len() != self.dimension()`.
    pub fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk<'_>>> {
        if vector.len() != self.dimension {
            return Err(DokuError::Index(format!(
                "dimension mismatch: index has {}, query has {}",
                self.dimension,
                vector.len()
            )));
        }

        let query = normalized(vector);
        let hits = self
            .index
            .search_nodes(&query, top_k.min(self.chunks.len()))
            .into_iter()
            .filter_map(|(node, distance)| {
                let id = (*node.idx())?;
                self.chunks.get(id).map(|chunk| ScoredChunk { chunk, distance })
            })
            .collect();

        Ok(hits)
    }
}

fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter().map(|v| v / norm).collect()
    } else {
        vector.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            source: "doc.txt".to_string(),
            index,
            start: 0,
            text: text.to_string(),
        }
    }

    fn axis(dimension: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_nearest_chunk_comes_first() {
        let store = VectorStore::build(vec![
            (axis(4, 0), chunk(0, "zero")),
            (axis(4, 1), chunk(1, "one")),
            (axis(4, 2), chunk(2, "two")),
            (axis(4, 3), chunk(3, "three")),
        ])
        .unwrap();

        let hits = store.search(&[0.1, 0.0, 5.0, 0.2], 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "two");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_top_k_larger_than_store() {
        let store = VectorStore::build(vec![(axis(3, 0), chunk(0, "only"))]).unwrap();
        let hits = store.search(&axis(3, 1), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).map(|c| c.text.as_str()), Some("only"));
    }

    #[test]
    fn test_scale_does_not_change_ranking() {
        let store = VectorStore::build(vec![
            (vec![10.0, 0.0], chunk(0, "east")),
            (vec![0.0, 0.5], chunk(1, "north")),
        ])
        .unwrap();
        let hits = store.search(&[0.0, 100.0], 1).unwrap();
        assert_eq!(hits[0].chunk.text, "north");
    }

    #[test]
    fn test_empty_input_is_empty_document() {
        assert!(matches!(
            VectorStore::build(Vec::new()),
            Err(DokuError::EmptyDocument)
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = VectorStore::build(vec![
            (axis(3, 0), chunk(0, "a")),
            (axis(2, 0), chunk(1, "b")),
        ]);
        assert!(matches!(result, Err(DokuError::Index(_))));

        let store = VectorStore::build(vec![(axis(3, 0), chunk(0, "a"))]).unwrap();
        assert!(store.search(&[1.0, 0.0], 1).is_err());
    }
}
