//! Semantic clustering of sections
//!
//! Hierarchical agglomerative clustering with complete linkage over
//! cosine distance and no fixed cluster count: the closest pair of
//! clusters is merged repeatedly until the minimum inter-cluster
//! distance exceeds the threshold. With fewer than 2 embedded sections
//! the algorithm is skipped and each embedded section receives its own
//! singleton label.

use bookgraph_common::model::Section;
use tracing::{debug, info};

/// Merging stops once the closest pair of clusters is further apart
/// than this cosine distance
pub const DISTANCE_THRESHOLD: f64 = 0.7;

/// Cosine distance between two vectors: 1 - cosine similarity.
/// Zero-magnitude vectors are treated as maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Assign a cluster label to every section that carries an embedding.
/// Labels are `cluster_<N>` and unique to this run only.
pub fn assign_clusters(sections: &mut [Section]) {
    let embedded: Vec<usize> = sections
        .iter()
        .enumerate()
        .filter(|(_, s)| s.concepts_embedding.is_some())
        .map(|(i, _)| i)
        .collect();

    // The algorithm is undefined below 2 points; hand out singleton labels
    if embedded.len() < 2 {
        for (label, &idx) in embedded.iter().enumerate() {
            sections[idx].cluster = Some(format!("cluster_{}", label));
        }
        debug!(
            embedded_count = embedded.len(),
            "Too few embedded sections, skipped clustering"
        );
        return;
    }

    let points: Vec<&[f32]> = embedded
        .iter()
        .map(|&i| {
            sections[i]
                .concepts_embedding
                .as_deref()
                .unwrap_or_default()
        })
        .collect();

    let labels = agglomerate(&points, DISTANCE_THRESHOLD);
    let cluster_count = labels.iter().max().map(|m| m + 1).unwrap_or(0);

    for (&idx, label) in embedded.iter().zip(labels.iter()) {
        sections[idx].cluster = Some(format!("cluster_{}", label));
    }

    info!(
        embedded_count = embedded.len(),
        cluster_count, "Sections clustered"
    );
}

/// Complete-linkage agglomerative clustering. Returns one label per
/// input point; labels are assigned in order of each cluster's smallest
/// member index, so the output is deterministic.
fn agglomerate(points: &[&[f32]], threshold: f64) -> Vec<usize> {
    let n = points.len();

    // Pairwise distance matrix
    let mut dist = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = cosine_distance(points[i], points[j]);
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }

    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    loop {
        let mut best: Option<(usize, usize, f64)> = None;

        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let d = complete_linkage(&clusters[a], &clusters[b], &dist);
                if best.map(|(_, _, bd)| d < bd).unwrap_or(true) {
                    best = Some((a, b, d));
                }
            }
        }

        match best {
            Some((a, b, d)) if d <= threshold => {
                let merged = clusters.remove(b);
                clusters[a].extend(merged);
            }
            _ => break,
        }
    }

    // Label clusters by their smallest member index
    clusters.sort_by_key(|members| members.iter().min().copied().unwrap_or(usize::MAX));

    let mut labels = vec![0usize; n];
    for (label, members) in clusters.iter().enumerate() {
        for &member in members {
            labels[member] = label;
        }
    }

    labels
}

/// Complete linkage: the maximum pairwise distance between two clusters
fn complete_linkage(a: &[usize], b: &[usize], dist: &[Vec<f64>]) -> f64 {
    let mut max = 0.0f64;
    for &i in a {
        for &j in b {
            if dist[i][j] > max {
                max = dist[i][j];
            }
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedded_section(name: &str, embedding: Vec<f32>) -> Section {
        let mut section = Section::new(name, "text", vec![]);
        section.concepts = vec!["c".to_string()];
        section.concepts_embedding = Some(embedding);
        section
    }

    #[test]
    fn test_cosine_distance_identical_is_zero() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(cosine_distance(&v, &v).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_distance_orthogonal_is_one() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_distance_zero_vector_is_max() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_distance(&a, &b), 1.0);
    }

    #[test]
    fn test_identical_embeddings_share_a_cluster() {
        let mut sections = vec![
            embedded_section("A", vec![1.0, 0.0, 0.0]),
            embedded_section("B", vec![1.0, 0.0, 0.0]),
            embedded_section("C", vec![1.0, 0.0, 0.0]),
        ];

        assign_clusters(&mut sections);

        let labels: Vec<_> = sections.iter().map(|s| s.cluster.clone().unwrap()).collect();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
    }

    #[test]
    fn test_distant_sections_form_singletons() {
        // opposite directions: cosine distance 2.0, far above the threshold
        let mut sections = vec![
            embedded_section("A", vec![1.0, 0.0]),
            embedded_section("B", vec![-1.0, 0.0]),
        ];

        assign_clusters(&mut sections);

        assert_ne!(sections[0].cluster, sections[1].cluster);
        assert_eq!(sections[0].cluster.as_deref(), Some("cluster_0"));
        assert_eq!(sections[1].cluster.as_deref(), Some("cluster_1"));
    }

    #[test]
    fn test_near_sections_merge_and_far_stay_apart() {
        let mut sections = vec![
            embedded_section("A", vec![1.0, 0.0]),
            embedded_section("B", vec![0.95, 0.05]),
            embedded_section("C", vec![-1.0, 0.1]),
        ];

        assign_clusters(&mut sections);

        assert_eq!(sections[0].cluster, sections[1].cluster);
        assert_ne!(sections[0].cluster, sections[2].cluster);
    }

    #[test]
    fn test_single_embedded_section_gets_singleton_label() {
        let mut sections = vec![
            embedded_section("A", vec![1.0, 0.0]),
            Section::new("B", "no concepts here", vec![]),
        ];

        assign_clusters(&mut sections);

        assert_eq!(sections[0].cluster.as_deref(), Some("cluster_0"));
        assert!(sections[1].cluster.is_none());
    }

    #[test]
    fn test_no_embedded_sections_is_a_no_op() {
        let mut sections = vec![Section::new("A", "text", vec![])];
        assign_clusters(&mut sections);
        assert!(sections[0].cluster.is_none());
    }

    #[test]
    fn test_unembedded_sections_are_excluded() {
        let mut sections = vec![
            embedded_section("A", vec![1.0, 0.0]),
            Section::new("B", "plain", vec![]),
            embedded_section("C", vec![1.0, 0.0]),
        ];

        assign_clusters(&mut sections);

        assert_eq!(sections[0].cluster, sections[2].cluster);
        assert!(sections[1].cluster.is_none());
    }
}
