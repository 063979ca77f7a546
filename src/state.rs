//! Shared map state
//!
//! `MapState` ties the store, the index, the latest graph and the
//! projection flag together behind one `RwLock`:
//!
//! - ingestion appends to store and index inside a single write section, so
//!   readers never see one without the other
//! - searches take the read lock
//! - projection and graph builds copy what they need under the read lock,
//!   compute without holding it, then install results under the write lock,
//!   skipping identifiers the live store does not know
//! - each kind of rebuild also holds its own mutex from snapshot to install,
//!   so an older snapshot can never overwrite a newer result while ingestion
//!   keeps going on the `RwLock`
//!
//! Work done by collaborators (embedding, reduction, labeling) always
//! happens outside the lock, and a collaborator failure leaves the state
//! exactly as it was.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::collaborators::{
    name_cluster_or_fallback, ClusterLabel, Descriptor, FeatureExtractor, LabelGenerator, Projector,
};
use crate::config::AtlasConfig;
use crate::error::{AtlasError, Collaborator, Result};
use crate::export::{MapExport, MetadataEntry, FILENAME_KEY, LABELS_KEY};
use crate::graph::{GraphBuilder, GraphDocument, GraphEdge, KnnGraph};
use crate::projection::{CoordinateDocument, ProjectionNormalizer};
use crate::search::{IndexStats, SimilarityIndex};
use crate::storage::VectorStore;
use crate::types::{Coords, Metadata, Metric, SearchHit, SearchResult, VectorId, VectorRecord};

/// Minimum number of vectors for pairwise operations
const MIN_VECTORS: usize = 2;

struct Inner {
    store: VectorStore,
    index: SimilarityIndex,
    graph: Option<KnnGraph>,
    fitted: bool,
    projection_tag: Option<String>,
}

impl Inner {
    fn append(&mut self, embedding: Vec<f32>, metadata: Metadata) -> Result<VectorId> {
        // Checked up front so the index append below cannot fail halfway
        let expected = self.index.dimension();
        if embedding.len() != expected {
            return Err(AtlasError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }

        let Inner { store, index, .. } = self;
        let id = store.register(embedding)?;
        let record = store.get(&id)?;
        index.add(&[record.embedding.as_slice()], &[id])?;
        if !metadata.is_empty() {
            store.update_metadata(&id, metadata)?;
        }
        Ok(id)
    }
}

/// Result of a projection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectionSummary {
    /// Identifiers that received coordinates
    pub projected: usize,
    /// Identifiers dropped at install time because the store lacked them
    pub discarded: usize,
}

/// Index and store statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapStats {
    pub total_vectors: usize,
    pub dimension: usize,
    pub metric: Metric,
    pub fitted: bool,
    pub graph_nodes: Option<usize>,
    pub index: IndexStats,
}

/// Shared state behind the map API. Wrap in `Arc` to share across handlers.
pub struct MapState {
    config: AtlasConfig,
    normalizer: ProjectionNormalizer,
    inner: RwLock<Inner>,
    projection_gate: Mutex<()>,
    graph_gate: Mutex<()>,
}

impl MapState {
    /// Construct from a configuration, failing fast if it is invalid.
    pub fn new(config: AtlasConfig) -> Result<Self> {
        config.validate()?;
        info!(
            dimension = config.dimension,
            metric = %config.metric,
            default_k = config.default_k,
            "map state initialized"
        );
        Ok(Self {
            normalizer: ProjectionNormalizer::new(config.scale),
            inner: RwLock::new(Inner {
                store: VectorStore::with_dimension(config.dimension),
                index: SimilarityIndex::new(config.dimension, config.metric)?,
                graph: None,
                fitted: false,
                projection_tag: None,
            }),
            projection_gate: Mutex::new(()),
            graph_gate: Mutex::new(()),
            config,
        })
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// Register one embedding in the store and the index.
    pub fn ingest(&self, embedding: Vec<f32>) -> Result<VectorId> {
        self.ingest_with_metadata(embedding, Metadata::new())
    }

    pub fn ingest_with_metadata(&self, embedding: Vec<f32>, metadata: Metadata) -> Result<VectorId> {
        let mut inner = self.inner.write();
        let id = inner.append(embedding, metadata)?;
        debug!(%id, total = inner.store.count(), "ingested vector");
        Ok(id)
    }

    /// Ingest several embeddings at once. Nothing is appended unless every
    /// row has the right dimension.
    pub fn ingest_batch(&self, embeddings: Vec<Vec<f32>>) -> Result<Vec<VectorId>> {
        let expected = self.config.dimension;
        if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
            return Err(AtlasError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        let mut inner = self.inner.write();
        let mut ids = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            ids.push(inner.append(embedding, Metadata::new())?);
        }
        info!(added = ids.len(), total = inner.store.count(), "batch ingested");
        Ok(ids)
    }

    /// Embed a raw item with `extractor`, then ingest it.
    pub fn ingest_raw(
        &self,
        extractor: &dyn FeatureExtractor,
        raw: &[u8],
        metadata: Metadata,
    ) -> Result<VectorId> {
        self.check_extractor(extractor)?;
        let embedding = extractor
            .embed(raw)
            .map_err(|e| AtlasError::collaborator(Collaborator::FeatureExtractor, e))?;
        self.ingest_with_metadata(embedding, metadata)
    }

    pub fn get(&self, id: &VectorId) -> Result<VectorRecord> {
        self.inner.read().store.get(id).cloned()
    }

    /// All identifiers in canonical (insertion) order
    pub fn identifiers(&self) -> Vec<VectorId> {
        self.inner.read().store.all_identifiers()
    }

    pub fn len(&self) -> usize {
        self.inner.read().store.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_fitted(&self) -> bool {
        self.inner.read().fitted
    }

    pub fn update_metadata(&self, id: &VectorId, patch: Metadata) -> Result<()> {
        self.inner.write().store.update_metadata(id, patch)
    }

    /// Exact top-k search, enriched with coordinates and filenames.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let inner = self.inner.read();
        let results = inner.index.search(query, k)?;
        Ok(Self::enrich(&inner.store, results))
    }

    pub fn search_batch(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Vec<SearchResult>>> {
        self.inner.read().index.search_batch(queries, k)
    }

    /// Search by natural-language query.
    pub fn search_text(
        &self,
        extractor: &dyn FeatureExtractor,
        text: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.check_extractor(extractor)?;
        let query = extractor
            .embed_text(text)
            .map_err(|e| AtlasError::collaborator(Collaborator::FeatureExtractor, e))?;
        self.search(&query, k)
    }

    /// Search by an uploaded example item.
    pub fn search_raw(
        &self,
        extractor: &dyn FeatureExtractor,
        raw: &[u8],
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.check_extractor(extractor)?;
        let query = extractor
            .embed(raw)
            .map_err(|e| AtlasError::collaborator(Collaborator::FeatureExtractor, e))?;
        self.search(&query, k)
    }

    /// An extractor producing the wrong width is a deployment fault, not a
    /// caller error.
    fn check_extractor(&self, extractor: &dyn FeatureExtractor) -> Result<()> {
        let produced = extractor.dimension();
        if produced != self.config.dimension {
            return Err(AtlasError::CollaboratorUnavailable {
                collaborator: Collaborator::FeatureExtractor,
                reason: format!(
                    "extractor produces {produced}-dimensional embeddings, map expects {}",
                    self.config.dimension
                ),
            });
        }
        Ok(())
    }

    fn enrich(store: &VectorStore, results: Vec<SearchResult>) -> Vec<SearchHit> {
        results
            .into_iter()
            .filter_map(|r| {
                let record = store.get(&r.id).ok()?;
                Some(SearchHit {
                    id: r.id,
                    score: r.score,
                    coords: record.coords,
                    filename: record
                        .metadata
                        .get(FILENAME_KEY)
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                })
            })
            .collect()
    }

    /// Re-project every stored vector to 3-D and normalize.
    ///
    /// This is a full re-fit: every coordinate is recomputed. Concurrent calls
    /// run one after another. On any failure the fitted flag and existing
    /// coordinates are left as they were.
    pub fn project_all(&self, projector: &dyn Projector) -> Result<ProjectionSummary> {
        let _gate = self.projection_gate.lock();
        let (ids, vectors) = {
            let inner = self.inner.read();
            let count = inner.store.count();
            if count < MIN_VECTORS {
                return Err(AtlasError::InsufficientData {
                    required: MIN_VECTORS,
                    available: count,
                });
            }
            let snapshot: (Vec<VectorId>, Vec<Vec<f32>>) = inner
                .store
                .iter()
                .map(|r| (r.id, r.embedding.clone()))
                .unzip();
            snapshot
        };

        let params = self.config.projection.for_samples(vectors.len());
        if params.n_neighbors != self.config.projection.n_neighbors {
            warn!(
                samples = vectors.len(),
                n_neighbors = params.n_neighbors,
                "fewer samples than projection neighbors, clamping"
            );
        }
        info!(samples = vectors.len(), kind = projector.kind(), "projecting");

        let raw = projector
            .fit_transform(&vectors, &params)
            .map_err(|e| AtlasError::collaborator(Collaborator::Projector, e))?;
        if raw.len() != ids.len() {
            return Err(AtlasError::CollaboratorUnavailable {
                collaborator: Collaborator::Projector,
                reason: format!("returned {} rows for {} inputs", raw.len(), ids.len()),
            });
        }
        if raw.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AtlasError::CollaboratorUnavailable {
                collaborator: Collaborator::Projector,
                reason: "returned non-finite coordinates".into(),
            });
        }

        let normalized = self.normalizer.normalize(ids.into_iter().zip(raw).collect());

        let mut inner = self.inner.write();
        let mut summary = ProjectionSummary {
            projected: 0,
            discarded: 0,
        };
        for (id, coords) in normalized {
            match inner.store.set_coordinates(&id, coords) {
                Ok(()) => summary.projected += 1,
                Err(_) => summary.discarded += 1,
            }
        }
        if summary.discarded > 0 {
            warn!(discarded = summary.discarded, "projected identifiers missing from store");
        }
        inner.fitted = true;
        inner.projection_tag = Some(format!("{}-3d-{}", projector.kind(), self.config.metric));
        info!(projected = summary.projected, "projection installed");
        Ok(summary)
    }

    /// Build and install the k-NN graph, returning its document form.
    pub fn build_graph(&self, k: usize) -> Result<GraphDocument> {
        let _gate = self.graph_gate.lock();
        let snapshot = self.inner.read().index.clone();
        let mut graph = GraphBuilder::new(&snapshot).build(k)?;

        let mut inner = self.inner.write();
        let discarded = graph.retain_nodes(|id| inner.store.contains(id));
        if discarded > 0 {
            warn!(discarded, "graph nodes missing from store");
        }
        let document = graph.to_document();
        inner.graph = Some(graph);
        Ok(document)
    }

    /// [`build_graph`](Self::build_graph) with the configured default k.
    pub fn build_default_graph(&self) -> Result<GraphDocument> {
        self.build_graph(self.config.default_k)
    }

    /// Latest installed graph, if any
    pub fn graph(&self) -> Option<GraphDocument> {
        self.inner.read().graph.as_ref().map(KnnGraph::to_document)
    }

    /// Outgoing edges of one node in the latest graph
    pub fn neighbors(&self, id: &VectorId) -> Option<Vec<GraphEdge>> {
        let inner = self.inner.read();
        let edges = inner.graph.as_ref()?.neighbors(id)?.to_vec();
        Some(edges)
    }

    /// Name a cluster and attach the title to every member's `labels`.
    ///
    /// Members are checked before the generator is called; an unavailable
    /// generator degrades to the deterministic fallback label.
    pub fn label_cluster(
        &self,
        generator: &dyn LabelGenerator,
        members: &[VectorId],
        descriptors: &[Descriptor],
    ) -> Result<ClusterLabel> {
        {
            let inner = self.inner.read();
            if let Some(missing) = members.iter().find(|id| !inner.store.contains(id)) {
                return Err(AtlasError::NotFound(*missing));
            }
        }

        let label = name_cluster_or_fallback(generator, descriptors);

        let mut inner = self.inner.write();
        for id in members {
            let metadata = inner.store.metadata_mut(id)?;
            let labels = metadata
                .entry(LABELS_KEY)
                .or_insert_with(|| Value::Array(Vec::new()));
            match labels {
                Value::Array(list) => list.push(Value::String(label.title.clone())),
                other => *other = Value::Array(vec![Value::String(label.title.clone())]),
            }
        }
        debug!(members = members.len(), title = %label.title, "cluster labeled");
        Ok(label)
    }

    pub fn stats(&self) -> MapStats {
        let inner = self.inner.read();
        MapStats {
            total_vectors: inner.store.count(),
            dimension: inner.index.dimension(),
            metric: inner.index.metric(),
            fitted: inner.fitted,
            graph_nodes: inner.graph.as_ref().map(KnnGraph::node_count),
            index: inner.index.stats(),
        }
    }

    /// Compose coordinates, graph and metadata for every known identifier.
    pub fn export(&self) -> MapExport {
        let inner = self.inner.read();

        let coords = inner.projection_tag.as_ref().map(|tag| {
            CoordinateDocument::new(
                tag.clone(),
                inner
                    .store
                    .iter()
                    .filter_map(|r| r.coords.map(|c: Coords| (r.id, c))),
            )
        });

        MapExport {
            coords,
            graph: inner.graph.as_ref().map(KnnGraph::to_document),
            meta: inner.store.iter().map(MetadataEntry::from_record).collect(),
            fitted: inner.fitted,
        }
    }
}
