//! Edge case tests for lookalike.
//!
//! Tests unusual inputs and boundary conditions that could cause failures.

use lookalike::distance::normalize;
use lookalike::{Forest, ForestBuilder, ForestParams, ReducerModel, SearchError};

fn params(num_trees: usize, leaf_size: usize) -> ForestParams {
    ForestParams {
        num_trees,
        leaf_size,
        ..ForestParams::default()
    }
}

// =============================================================================
// Corpus shape
// =============================================================================

#[test]
fn single_item_corpus() {
    let forest = ForestBuilder::new(params(3, 4))
        .build_pairs([("only", vec![0.0, 0.0, 1.0])])
        .unwrap();
    let hits = forest.query(&[1.0, 0.0, 0.0], 10, 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id.as_str(), "only");
    for tree in forest.trees() {
        assert_eq!(tree.nodes().len(), 1);
    }
}

#[test]
fn one_dimensional_vectors() {
    let forest = ForestBuilder::new(params(2, 1))
        .build_pairs([("pos", vec![1.0]), ("neg", vec![-1.0]), ("pos2", vec![1.0])])
        .unwrap();
    let hits = forest.query(&[1.0], 3, 3).unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["pos", "pos2", "neg"]);
}

#[test]
fn k_larger_than_corpus_returns_everything() {
    let forest = ForestBuilder::new(params(2, 2))
        .build_pairs((0..5).map(|i| {
            let a = i as f32;
            (format!("{i}"), normalize(&[a.cos(), a.sin()]))
        }))
        .unwrap();
    assert_eq!(forest.query(&[1.0, 0.0], 100, 1000).unwrap().len(), 5);
}

#[test]
fn all_identical_vectors_still_split() {
    let v = normalize(&[1.0, 2.0, 3.0, 4.0]);
    let forest = ForestBuilder::new(params(2, 3))
        .build_pairs((0..50).map(|i| (format!("dup-{i:02}"), v.clone())))
        .unwrap();
    for tree in forest.trees() {
        // Parity splits halve the subset, so depth stays logarithmic.
        assert!(tree.depth() <= 6, "depth {}", tree.depth());
    }
    let hits = forest.query(&v, 3, 50).unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["dup-00", "dup-01", "dup-02"]);
}

#[test]
fn leaf_size_one_isolates_every_item() {
    let forest = ForestBuilder::new(params(1, 1))
        .build_pairs((0..17).map(|i| {
            let a = i as f32 * 0.37;
            (format!("p{i}"), normalize(&[a.cos(), a.sin(), 0.1]))
        }))
        .unwrap();
    for node in forest.trees()[0].nodes() {
        if let lookalike::forest::Node::Leaf { items } = node {
            assert_eq!(items.len(), 1);
        }
    }
}

// =============================================================================
// Invalid input
// =============================================================================

#[test]
fn empty_corpus_is_an_error() {
    let err = ForestBuilder::new(params(1, 1)).build(Vec::new());
    assert!(matches!(err, Err(SearchError::EmptyCorpus)));
}

#[test]
fn zero_trees_or_leaf_size_is_config_error() {
    for p in [params(0, 4), params(4, 0)] {
        let err = ForestBuilder::new(p).build_pairs([("a", vec![1.0])]);
        assert!(matches!(err, Err(SearchError::Config(_))));
    }
}

#[test]
fn ragged_corpus_is_dimension_mismatch() {
    let err = ForestBuilder::new(params(1, 1)).build_pairs([("a", vec![1.0, 0.0]), ("b", vec![1.0])]);
    assert!(matches!(
        err,
        Err(SearchError::DimensionMismatch {
            expected: 2,
            actual: 1
        })
    ));
}

#[test]
fn duplicate_ids_are_rejected() {
    let err = ForestBuilder::new(params(1, 1)).build_pairs([("a", vec![1.0]), ("a", vec![-1.0])]);
    assert!(matches!(err, Err(SearchError::Config(_))));
}

#[test]
fn empty_forest_answers_nothing_but_still_validates() {
    let forest = Forest::empty(4);
    assert!(forest.query(&[0.5; 4], 3, 10).unwrap().is_empty());
    assert!(matches!(
        forest.query(&[0.5; 3], 3, 10),
        Err(SearchError::DimensionMismatch { .. })
    ));
    assert!(matches!(forest.query(&[0.5; 4], 0, 10), Err(SearchError::InvalidQuery(_))));
}

// =============================================================================
// Reducer
// =============================================================================

#[test]
fn reducer_rejects_bad_targets() {
    let training = vec![vec![1.0, 2.0, 3.0]; 5];
    assert!(matches!(ReducerModel::fit(&training, 0), Err(SearchError::Config(_))));
    assert!(matches!(ReducerModel::fit(&training, 4), Err(SearchError::Config(_))));
    assert!(matches!(
        ReducerModel::fit(&training[..2], 3),
        Err(SearchError::RankDeficiency {
            samples: 2,
            required: 3
        })
    ));
}

#[test]
fn reducer_with_full_dimension_preserves_distances() {
    let training: Vec<Vec<f32>> = (0..20)
        .map(|i| {
            let t = i as f32;
            vec![t.sin(), (0.7 * t).cos(), 0.1 * t]
        })
        .collect();
    let model = ReducerModel::fit(&training, 3).unwrap();
    let a = model.transform(&training[3]).unwrap();
    let b = model.transform(&training[11]).unwrap();
    let projected: f32 = a.iter().zip(&b).map(|(x, y)| (x - y) * (x - y)).sum();
    let original: f32 = training[3]
        .iter()
        .zip(&training[11])
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    assert!((projected - original).abs() < 1e-4, "{projected} vs {original}");
}

#[test]
fn reducer_transform_checks_length() {
    let training: Vec<Vec<f32>> = (0..6).map(|i| vec![i as f32, (i * i) as f32]).collect();
    let model = ReducerModel::fit(&training, 1).unwrap();
    assert!(matches!(
        model.transform(&[1.0, 2.0, 3.0]),
        Err(SearchError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
}
