//! Boundaries to the external services around the core
//!
//! Feature extraction, dimensionality reduction and label generation are
//! done elsewhere. The core only sees these traits. Implementations report
//! failures through `anyhow`; the map converts them into
//! `CollaboratorUnavailable` without touching shared state.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ProjectionConfig;
use crate::types::Coords;

/// Turns raw inputs into fixed-length embeddings.
pub trait FeatureExtractor: Send + Sync {
    /// Output dimension, fixed per deployment
    fn dimension(&self) -> usize;

    /// Embed an uploaded item (already decoded bytes of any format the
    /// extractor understands).
    fn embed(&self, raw: &[u8]) -> Result<Vec<f32>>;

    /// Embed a free-text query into the same space.
    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

/// Nonlinear reducer from D dimensions to 3.
pub trait Projector: Send + Sync {
    /// Short tag naming the reduction, e.g. `"umap"`
    fn kind(&self) -> &str;

    /// Fit on the whole batch and return one 3-D point per input row, in
    /// input order.
    fn fit_transform(&self, vectors: &[Vec<f32>], params: &ProjectionConfig) -> Result<Vec<Coords>>;
}

/// Ranked descriptor of a cluster, e.g. a detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub confidence: f32,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLabel {
    pub title: String,
    pub description: String,
}

impl ClusterLabel {
    /// Deterministic label built from the top three descriptors.
    pub fn fallback(descriptors: &[Descriptor]) -> Self {
        if descriptors.is_empty() {
            return Self {
                title: "Cluster".into(),
                description: "Images grouped by visual similarity.".into(),
            };
        }
        let names = top_names(descriptors, 3).join(", ");
        Self {
            title: format!("Cluster: {names}"),
            description: format!("Images featuring {names}."),
        }
    }
}

/// Names cluster summaries.
pub trait LabelGenerator: Send + Sync {
    fn name_cluster(&self, descriptors: &[Descriptor]) -> Result<ClusterLabel>;
}

/// Label generator for deployments without a language model.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl LabelGenerator for Unconfigured {
    fn name_cluster(&self, _descriptors: &[Descriptor]) -> Result<ClusterLabel> {
        bail!("no label generator configured")
    }
}

/// Ask `generator` for a label, degrading to [`ClusterLabel::fallback`].
pub fn name_cluster_or_fallback(
    generator: &dyn LabelGenerator,
    descriptors: &[Descriptor],
) -> ClusterLabel {
    match generator.name_cluster(descriptors) {
        Ok(label) if !label.title.trim().is_empty() => label,
        Ok(_) => {
            warn!("label generator returned an empty title, using fallback");
            ClusterLabel::fallback(descriptors)
        }
        Err(err) => {
            let reason = format!("{err:#}");
            warn!(error = %reason, "label generator unavailable, using fallback");
            ClusterLabel::fallback(descriptors)
        }
    }
}

/// Fallback one-line explanation of why items share a cluster.
pub fn explain_fallback(descriptors: &[Descriptor]) -> String {
    let names = top_names(descriptors, 2).join(" and ");
    format!("These images share common visual elements like {names}.")
}

/// Pull a `{"title", "description"}` object out of free model text.
///
/// Takes the span from the first `{` to the last `}`; anything that does not
/// parse yields `None`.
pub fn parse_label_response(text: &str) -> Option<ClusterLabel> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn top_names(descriptors: &[Descriptor], n: usize) -> Vec<&str> {
    descriptors.iter().take(n).map(|d| d.name.as_str()).collect()
}

/// Projector that replays coordinates computed elsewhere.
///
/// Rows must be given in the map's canonical identifier order.
#[derive(Debug, Clone)]
pub struct PrecomputedProjection {
    kind: String,
    coords: Vec<Coords>,
}

impl PrecomputedProjection {
    pub fn new(kind: impl Into<String>, coords: Vec<Coords>) -> Self {
        Self {
            kind: kind.into(),
            coords,
        }
    }
}

impl Projector for PrecomputedProjection {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn fit_transform(&self, vectors: &[Vec<f32>], _params: &ProjectionConfig) -> Result<Vec<Coords>> {
        if vectors.len() != self.coords.len() {
            bail!(
                "precomputed projection has {} rows, map has {}",
                self.coords.len(),
                vectors.len()
            );
        }
        Ok(self.coords.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(&'static str);

    impl LabelGenerator for Scripted {
        fn name_cluster(&self, _descriptors: &[Descriptor]) -> Result<ClusterLabel> {
            parse_label_response(self.0).ok_or_else(|| anyhow::anyhow!("unparseable reply"))
        }
    }

    fn descriptors() -> Vec<Descriptor> {
        vec![
            Descriptor::new("desk", 0.91),
            Descriptor::new("coffee", 0.72),
            Descriptor::new("lamp", 0.40),
            Descriptor::new("cat", 0.12),
        ]
    }

    #[test]
    fn test_fallback_uses_top_three() {
        let label = ClusterLabel::fallback(&descriptors());
        assert_eq!(label.title, "Cluster: desk, coffee, lamp");
        assert_eq!(label.description, "Images featuring desk, coffee, lamp.");
    }

    #[test]
    fn test_explain_fallback() {
        assert_eq!(
            explain_fallback(&descriptors()),
            "These images share common visual elements like desk and coffee."
        );
    }

    #[test]
    fn test_fallback_without_descriptors() {
        let label = ClusterLabel::fallback(&[]);
        assert_eq!(label.title, "Cluster");
        assert!(!label.description.is_empty());
    }

    #[test]
    fn test_parse_label_response() {
        let reply = "Sure! {\"title\": \"Cozy workspaces\", \"description\": \"Desks with coffee.\"} Hope that helps.";
        let label = parse_label_response(reply).unwrap();
        assert_eq!(label.title, "Cozy workspaces");

        assert!(parse_label_response("no json here").is_none());
        assert!(parse_label_response("} backwards {").is_none());
        assert!(parse_label_response("{\"title\": 3}").is_none());
    }

    #[test]
    fn test_generator_or_fallback() {
        let good = Scripted("{\"title\": \"Night skies\", \"description\": \"Stars.\"}");
        assert_eq!(name_cluster_or_fallback(&good, &descriptors()).title, "Night skies");

        let broken = Scripted("I cannot help with that");
        assert_eq!(
            name_cluster_or_fallback(&broken, &descriptors()).title,
            "Cluster: desk, coffee, lamp"
        );

        let empty = Scripted("{\"title\": \"  \", \"description\": \"\"}");
        assert_eq!(
            name_cluster_or_fallback(&empty, &descriptors()).title,
            "Cluster: desk, coffee, lamp"
        );

        assert_eq!(name_cluster_or_fallback(&Unconfigured, &[]).title, "Cluster");
    }

    #[test]
    fn test_precomputed_projection_checks_rows() {
        let projector = PrecomputedProjection::new("fixed", vec![[0.0; 3]; 2]);
        let params = ProjectionConfig::default();
        assert_eq!(projector.kind(), "fixed");
        assert!(projector.fit_transform(&[vec![1.0], vec![2.0]], &params).is_ok());
        assert!(projector.fit_transform(&[vec![1.0]], &params).is_err());
    }
}
