//! # atlas-index - Embedding Map Core
//!
//! In-memory engine behind a 3-D "map" of embedded items:
//! - Append-only vector store with stable identifiers
//! - Exact (brute-force) k-NN search, cosine or euclidean, rayon-parallel
//! - Deterministic fixed out-degree similarity graph
//! - Bounded, uniformly scaled 3-D coordinates for visualization
//!
//! Feature extraction, dimensionality reduction and label generation are
//! external; they plug in through the traits in [`collaborators`].
//!
//! ## Example
//!
//! ```rust
//! use atlas_index::{AtlasConfig, MapState, Metric};
//!
//! let map = MapState::new(AtlasConfig::new(4, Metric::Cosine)).unwrap();
//! let a = map.ingest(vec![1.0, 0.0, 0.0, 0.0]).unwrap();
//! map.ingest(vec![0.0, 1.0, 0.0, 0.0]).unwrap();
//!
//! let hits = map.search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
//! assert_eq!(hits[0].id, a);
//!
//! let graph = map.build_graph(1).unwrap();
//! assert_eq!(graph.num_edges, 2);
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod projection;
pub mod search;
pub mod state;
pub mod storage;
pub mod types;

#[cfg(feature = "pyo3")]
pub mod python_bindings;

pub use collaborators::{
    ClusterLabel, Descriptor, FeatureExtractor, LabelGenerator, PrecomputedProjection, Projector,
};
pub use config::{AtlasConfig, ProjectionConfig};
pub use error::{AtlasError, Collaborator, Result};
pub use export::{write_json, MapExport, MetadataEntry};
pub use graph::{GraphBuilder, GraphDocument, GraphEdge, KnnGraph};
pub use projection::{CoordinateDocument, ProjectionNormalizer};
pub use search::{IndexStats, SimilarityIndex};
pub use state::{MapState, MapStats, ProjectionSummary};
pub use storage::VectorStore;
pub use types::{Coords, Metadata, Metric, SearchHit, SearchResult, VectorId, VectorRecord};
