#![allow(missing_docs)]

use std::collections::BTreeSet;

use dyngraph::{
    build_storage, AggFunc, BackendKind, DgError, DgStorage, Event, FeatureKind, NodeId,
    SliceTracker, StorageOptions, TimeDelta, TimeUnit,
};
use ndarray::{arr1, Array2, ArrayD, IxDyn};

fn build(kind: BackendKind, events: Vec<Event>) -> Box<dyn DgStorage> {
    build_storage(events, &StorageOptions::new().backend(kind)).expect("build storage")
}

fn each_backend(mut check: impl FnMut(BackendKind)) {
    for kind in BackendKind::ALL {
        check(kind);
    }
}

fn two_edges() -> Vec<Event> {
    vec![Event::edge(1, 2u64, 3u64), Event::edge(5, 10u64, 20u64)]
}

fn feats(vals: &[f32]) -> ArrayD<f32> {
    arr1(vals).into_dyn()
}

fn ids(nodes: &BTreeSet<NodeId>) -> Vec<u64> {
    nodes.iter().map(|n| n.0).collect()
}

#[test]
fn scalar_queries_over_two_edges() {
    each_backend(|kind| {
        let s = build(kind, two_edges());
        let full = SliceTracker::full();
        assert_eq!(s.get_start_time(&full), Some(1), "{kind}");
        assert_eq!(s.get_end_time(&full), Some(5), "{kind}");
        assert_eq!(s.get_num_nodes(&full), 21, "{kind}");
        assert_eq!(s.get_num_edges(&full), 2, "{kind}");
        assert_eq!(s.get_num_timestamps(&full), 2, "{kind}");
        assert_eq!(s.get_num_events(&full), 2, "{kind}");
        assert_eq!(s.get_time_granularity(&full), Some(4), "{kind}");
        assert_eq!(ids(&s.get_nodes(&full)), vec![2, 3, 10, 20], "{kind}");

        let stats = s.stats();
        assert_eq!(stats.start_time, Some(1));
        assert_eq!(stats.num_nodes, 21);
        assert_eq!(stats.time_granularity, Some(4));
    });
}

#[test]
fn time_slice_is_half_open() {
    each_backend(|kind| {
        let s = build(kind, two_edges());
        let slice = SliceTracker::time_range(Some(1), Some(2)).unwrap();
        assert_eq!(s.to_events(&slice), vec![Event::edge(1, 2u64, 3u64)], "{kind}");
        assert_eq!(s.get_num_nodes(&slice), 4);
        assert_eq!(s.get_num_edges(&slice), 1);

        let excl = SliceTracker::time_range(Some(2), Some(5)).unwrap();
        assert_eq!(s.get_num_events(&excl), 0, "{kind}");
        assert_eq!(s.get_start_time(&excl), None);
        assert_eq!(s.get_end_time(&excl), None);
        assert_eq!(s.get_num_nodes(&excl), 0);
    });
}

#[test]
fn duplicate_edges_count_once_as_edges() {
    each_backend(|kind| {
        let mut events = two_edges();
        events.push(Event::edge(1, 2u64, 3u64));
        events.push(Event::edge(1, 2u64, 3u64));
        let s = build(kind, events);
        let full = SliceTracker::full();
        assert_eq!(s.get_num_edges(&full), 2, "{kind}");
        assert_eq!(s.get_num_events(&full), 4, "{kind}");
    });
}

#[test]
fn node_ids_from_endpoints_bound_num_nodes() {
    each_backend(|kind| {
        let s = build(kind, vec![Event::node(0, 3u64), Event::edge(1, 0u64, 41u64)]);
        assert_eq!(s.get_num_nodes(&SliceTracker::full()), 42, "{kind}");
    });
}

#[test]
fn granularity_needs_two_timestamps() {
    each_backend(|kind| {
        let s = build(kind, vec![Event::edge(3, 0u64, 1u64), Event::edge(3, 1u64, 2u64)]);
        assert_eq!(s.get_time_granularity(&SliceTracker::full()), None, "{kind}");
    });
}

#[test]
fn node_filter_keeps_touching_events() {
    each_backend(|kind| {
        let events = vec![
            Event::edge(1, 0u64, 1u64),
            Event::node(2, 5u64),
            Event::edge(3, 1u64, 2u64),
            Event::edge(4, 3u64, 4u64),
        ];
        let s = build(kind, events);
        let slice = SliceTracker::nodes([NodeId(1)]);
        assert_eq!(s.get_num_events(&slice), 2, "{kind}");
        assert_eq!(s.get_start_time(&slice), Some(1));
        assert_eq!(s.get_end_time(&slice), Some(3));
        assert_eq!(ids(&s.get_nodes(&slice)), vec![0, 1, 2]);
    });
}

#[test]
fn edges_come_back_in_time_order() {
    each_backend(|kind| {
        let events = vec![
            Event::edge(7, 1u64, 2u64),
            Event::node(3, 9u64),
            Event::edge(2, 4u64, 5u64),
        ];
        let s = build(kind, events);
        let edges = s.get_edges(&SliceTracker::full());
        assert_eq!(edges.src, arr1(&[4, 1]), "{kind}");
        assert_eq!(edges.dst, arr1(&[5, 2]));
        assert_eq!(edges.time, arr1(&[2, 7]));

        let empty = s.get_edges(&SliceTracker::time_range(Some(3), Some(4)).unwrap());
        assert!(empty.is_empty());
    });
}

#[test]
fn dynamic_node_features_are_sparse_and_last_write_wins() {
    each_backend(|kind| {
        let events = vec![
            Event::node(1, 2u64).with_features(feats(&[1.0, 1.0])),
            Event::node(1, 2u64).with_features(feats(&[5.0, 6.0])),
            Event::node(3, 0u64).with_features(feats(&[2.0, 2.0])),
            Event::edge(4, 1u64, 3u64),
        ];
        let s = build(kind, events);
        let sparse = s
            .get_dynamic_node_feats(&SliceTracker::full())
            .unwrap()
            .expect("node features");
        assert_eq!(sparse.shape(), &[5, 4, 2], "{kind}");
        assert_eq!(sparse.nnz(), 2);
        let dense = sparse.to_dense().unwrap();
        assert_eq!(dense[&[1, 2, 0][..]], 5.0);
        assert_eq!(dense[&[1, 2, 1][..]], 6.0);
        assert_eq!(dense[&[3, 0, 0][..]], 2.0);

        let alias = s.get_node_feats(&SliceTracker::full()).unwrap();
        assert_eq!(alias.as_ref(), Some(&sparse));
    });
}

#[test]
fn feature_queries_are_none_without_features() {
    each_backend(|kind| {
        let s = build(kind, two_edges());
        assert!(s.get_node_feats(&SliceTracker::full()).unwrap().is_none(), "{kind}");
        assert!(s.get_edge_feats(&SliceTracker::full()).unwrap().is_none());
    });
}

#[test]
fn edge_features_index_time_src_dst() {
    each_backend(|kind| {
        let events = vec![
            Event::edge(1, 2u64, 3u64).with_features(feats(&[1.0, 2.0, 3.0])),
            Event::edge(5, 10u64, 20u64).with_features(feats(&[4.0, 5.0, 6.0])),
        ];
        let s = build(kind, events);
        let sparse = s.get_edge_feats(&SliceTracker::full()).unwrap().unwrap();
        assert_eq!(sparse.shape(), &[6, 21, 21, 3], "{kind}");
        assert_eq!(sparse.index_row(0), arr1(&[1, 5]));
        assert_eq!(sparse.index_row(1), arr1(&[2, 10]));
        assert_eq!(sparse.index_row(2), arr1(&[3, 20]));

        let sliced = s
            .get_edge_feats(&SliceTracker::time_range(Some(1), Some(2)).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(sliced.shape(), &[2, 4, 4, 3]);
        assert_eq!(sliced.nnz(), 1);
    });
}

#[test]
fn mismatched_feature_shapes_fail_at_ingestion() {
    each_backend(|kind| {
        let events = vec![
            Event::edge(1, 0u64, 1u64).with_features(feats(&[1.0, 2.0])),
            Event::edge(2, 1u64, 2u64).with_features(ArrayD::zeros(IxDyn(&[2, 2]))),
        ];
        let err = build_storage(events, &StorageOptions::new().backend(kind)).unwrap_err();
        assert!(
            matches!(err, DgError::FeatureShapeMismatch { kind: FeatureKind::Edge, .. }),
            "{kind}: {err}"
        );
    });
}

#[test]
fn append_checks_shapes_against_existing_events() {
    each_backend(|kind| {
        let mut s = build(kind, vec![Event::edge(1, 0u64, 1u64).with_features(feats(&[1.0]))]);
        let bad = vec![Event::edge(2, 0u64, 1u64).with_features(feats(&[1.0, 2.0]))];
        assert!(s.append(bad).is_err(), "{kind}");
        assert_eq!(s.len(), 1);

        s.append(vec![Event::edge(2, 0u64, 1u64).with_features(feats(&[3.0]))])
            .unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.stats().num_events, 2);
    });
}

#[test]
fn append_to_empty_storage_adopts_shape() {
    each_backend(|kind| {
        let mut s = build(kind, Vec::new());
        assert!(s.is_empty());
        s.append(vec![Event::node(1, 0u64).with_features(feats(&[1.0, 2.0, 3.0]))])
            .unwrap();
        assert_eq!(s.node_feats_shape(), Some(&[3usize][..]), "{kind}");
    });
}

#[test]
fn slice_time_and_nodes_build_new_backends() {
    each_backend(|kind| {
        let s = build(kind, two_edges());
        let sliced = s.slice_time(Some(2), Some(6)).unwrap();
        assert_eq!(sliced.kind(), kind);
        assert_eq!(sliced.len(), 1);
        assert_eq!(sliced.get_start_time(&SliceTracker::full()), Some(5));
        assert!(s.slice_time(Some(6), Some(2)).is_err());

        let by_node = s.slice_nodes(&[NodeId(3)]).unwrap();
        assert_eq!(by_node.to_events(&SliceTracker::full()), vec![Event::edge(1, 2u64, 3u64)]);
        assert_eq!(s.len(), 2, "{kind}: parent untouched");
    });
}

#[test]
fn neighbours_are_one_hop_in_both_directions() {
    each_backend(|kind| {
        let s = build(kind, vec![Event::edge(3, 2u64, 1u64), Event::edge(20, 10u64, 5u64)]);
        let nbrs = s
            .get_nbrs(&[NodeId(0), NodeId(2), NodeId(10)], 1, &SliceTracker::full())
            .unwrap();
        assert_eq!(nbrs.len(), 2, "{kind}");
        assert_eq!(nbrs[&NodeId(2)], vec![(NodeId(1), 3)]);
        assert_eq!(nbrs[&NodeId(10)], vec![(NodeId(5), 20)]);
        assert!(!nbrs.contains_key(&NodeId(0)));

        let err = s.get_nbrs(&[NodeId(2)], 2, &SliceTracker::full()).unwrap_err();
        assert!(matches!(err, DgError::Unsupported(_)));
    });
}

#[test]
fn coarsening_rebuckets_and_aggregates() {
    each_backend(|kind| {
        let events = vec![
            Event::edge(10, 1u64, 2u64).with_features(feats(&[1.0])),
            Event::edge(50, 1u64, 2u64).with_features(feats(&[2.0])),
            Event::edge(70, 1u64, 2u64).with_features(feats(&[4.0])),
        ];
        let s = build(kind, events);
        let sec = TimeDelta::new(TimeUnit::Second, 1).unwrap();
        let min = TimeDelta::new(TimeUnit::Minute, 1).unwrap();
        let coarse = s
            .temporal_coarsening(&SliceTracker::full(), &sec, &min, AggFunc::Mean)
            .unwrap();
        let out = coarse.to_events(&SliceTracker::full());
        assert_eq!(out.len(), 2, "{kind}");
        assert_eq!(out[0].time(), 0);
        assert_eq!(out[0].features(), Some(&feats(&[1.5])));
        assert_eq!(out[1].time(), 1);
        assert_eq!(coarse.kind(), kind);
    });
}

#[test]
fn coarsening_with_uneven_unit_ratio_bins_by_elapsed_time() {
    each_backend(|kind| {
        // 0s and 7s share the first 10s bin; 14s lands in the second.
        let s = build(
            kind,
            vec![Event::node(0, 1u64), Event::node(1, 1u64), Event::node(2, 1u64)],
        );
        let seven = TimeDelta::new(TimeUnit::Second, 7).unwrap();
        let ten = TimeDelta::new(TimeUnit::Second, 10).unwrap();
        let coarse = s
            .temporal_coarsening(&SliceTracker::full(), &seven, &ten, AggFunc::Sum)
            .unwrap();
        let times: Vec<i64> = coarse.to_events(&SliceTracker::full()).iter().map(Event::time).collect();
        assert_eq!(times, vec![0, 1], "{kind}");
    });
}

#[test]
fn coarsening_rejects_bad_deltas_and_empty_input() {
    each_backend(|kind| {
        let s = build(kind, two_edges());
        let full = SliceTracker::full();
        let sec = TimeDelta::new(TimeUnit::Second, 1).unwrap();
        let min = TimeDelta::new(TimeUnit::Minute, 1).unwrap();
        let ordered = TimeDelta::ordered();
        assert!(s.temporal_coarsening(&full, &ordered, &min, AggFunc::Sum).is_err());
        assert!(s.temporal_coarsening(&full, &sec, &ordered, AggFunc::Sum).is_err());
        assert!(s.temporal_coarsening(&full, &min, &sec, AggFunc::Sum).is_err());

        let nothing = SliceTracker::time_range(Some(100), Some(200)).unwrap();
        assert!(s.temporal_coarsening(&nothing, &sec, &min, AggFunc::Sum).is_err(), "{kind}");
        assert!("median".parse::<AggFunc>().is_err());
    });
}

#[test]
fn static_node_features_need_a_row_per_node() {
    each_backend(|kind| {
        let ok = StorageOptions::new()
            .backend(kind)
            .static_node_feats(Array2::ones((21, 4)));
        let s = build_storage(two_edges(), &ok).unwrap();
        assert_eq!(s.static_node_feats().map(|f| f.dim()), Some((21, 4)));

        let short = StorageOptions::new()
            .backend(kind)
            .static_node_feats(Array2::ones((20, 4)));
        let err = build_storage(two_edges(), &short).unwrap_err();
        assert!(matches!(
            err,
            DgError::FeatureShapeMismatch { kind: FeatureKind::StaticNode, .. }
        ));
    });
}

#[test]
fn backend_names_parse() {
    assert_eq!("dict".parse::<BackendKind>().unwrap(), BackendKind::Bucket);
    assert_eq!("ARRAY".parse::<BackendKind>().unwrap(), BackendKind::EventList);
    assert!("columnar-ish".parse::<BackendKind>().is_err());
    assert_eq!(BackendKind::default(), BackendKind::Bucket);
}

#[test]
fn node_ids_must_fit_a_tensor_index() {
    each_backend(|kind| {
        let top = NodeId::MAX.0;
        let s = build(kind, vec![Event::edge(0, 0u64, top)]);
        assert_eq!(s.get_num_nodes(&SliceTracker::full()), NodeId::MAX.extent(), "{kind}");
        assert_eq!(s.get_edges(&SliceTracker::full()).dst[0], i64::MAX, "{kind}");

        let err = build_storage(
            vec![Event::node(0, u64::MAX)],
            &StorageOptions::new().backend(kind),
        )
        .unwrap_err();
        assert!(matches!(err, DgError::InvalidArgument(_)), "{kind}");

        let mut s = build(kind, two_edges());
        assert!(s.append(vec![Event::edge(9, u64::MAX, 1u64)]).is_err(), "{kind}");
        assert_eq!(s.get_num_events(&SliceTracker::full()), 2, "{kind}");
    });
}

#[test]
fn featured_events_before_time_zero_fail_feature_queries() {
    each_backend(|kind| {
        let s = build(
            kind,
            vec![
                Event::edge(-3, 0u64, 1u64).with_features(feats(&[1.0])),
                Event::node(-2, 1u64).with_features(feats(&[2.0])),
            ],
        );
        let full = SliceTracker::full();
        assert!(matches!(s.get_edge_feats(&full), Err(DgError::InvalidArgument(_))), "{kind}");
        assert!(matches!(s.get_node_feats(&full), Err(DgError::InvalidArgument(_))), "{kind}");

        let unfeatured = build(
            kind,
            vec![Event::edge(-3, 0u64, 1u64), Event::edge(2, 1u64, 2u64).with_features(feats(&[1.0]))],
        );
        let edge_feats = unfeatured.get_edge_feats(&full).unwrap().expect("edge feats");
        assert_eq!(edge_feats.shape(), &[3, 3, 3, 1]);
    });
}
