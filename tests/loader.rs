#![allow(missing_docs)]

use std::cell::Cell;
use std::rc::Rc;

use dyngraph::{
    DgBatch, DgLoader, Event, GraphView, LoaderOptions, NodeId, TimeDelta, TimeUnit,
};
use ndarray::{arr1, ArrayD};

fn seconds() -> TimeDelta {
    TimeDelta::new(TimeUnit::Second, 1).unwrap()
}

fn chain(times: &[i64], delta: TimeDelta) -> GraphView {
    let events = times
        .iter()
        .enumerate()
        .map(|(i, &t)| Event::edge(t, i as u64, i as u64 + 1))
        .collect();
    GraphView::new(events, delta).unwrap()
}

fn collect(loader: DgLoader) -> Vec<DgBatch> {
    loader.map(|batch| batch.unwrap()).collect()
}

#[test]
fn ordered_batches_split_by_event_count() {
    let view = chain(&[1, 1, 2, 3], TimeDelta::ordered());
    let mut loader = DgLoader::new(view, LoaderOptions::new(2)).unwrap();
    assert_eq!(loader.num_batches(), 2);
    assert_eq!(loader.len(), 2);

    let first = loader.next().unwrap().unwrap();
    assert_eq!(first.time, arr1(&[1, 1]));
    assert_eq!(loader.remaining(), 1);
    let second = loader.next().unwrap().unwrap();
    assert_eq!(second.src, arr1(&[2, 3]));
    assert!(loader.next().is_none());
    assert!(loader.next().is_none());
}

#[test]
fn ordered_tail_is_kept_unless_dropped() {
    let view = chain(&[0, 1, 2, 3, 4], TimeDelta::ordered());
    let kept = collect(DgLoader::new(view.clone(), LoaderOptions::new(2)).unwrap());
    assert_eq!(kept.iter().map(DgBatch::len).collect::<Vec<_>>(), vec![2, 2, 1]);

    let dropped =
        collect(DgLoader::new(view, LoaderOptions::new(2).drop_last(true)).unwrap());
    assert_eq!(dropped.len(), 2);
}

#[test]
fn ordered_batches_over_a_slice_use_its_events() {
    let view = chain(&[0, 1, 2, 3, 4, 5], TimeDelta::ordered());
    let sliced = view.slice_time(Some(2), None).unwrap();
    let batches = collect(DgLoader::new(sliced, LoaderOptions::new(3)).unwrap());
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].time, arr1(&[2, 3, 4]));
    assert_eq!(batches[1].time, arr1(&[5]));
}

#[test]
fn physical_batches_split_by_duration() {
    let view = chain(&[0, 1, 2, 3, 4], seconds());
    let options = LoaderOptions::new(2).batch_unit(TimeUnit::Second);
    let batches = collect(DgLoader::new(view.clone(), options.clone()).unwrap());
    assert_eq!(batches.iter().map(DgBatch::len).collect::<Vec<_>>(), vec![2, 2, 1]);

    let dropped = collect(DgLoader::new(view, options.drop_last(true)).unwrap());
    assert_eq!(dropped.len(), 2);
}

#[test]
fn physical_batches_convert_units() {
    let view = chain(&[0, 30, 61, 125], seconds());
    let options = LoaderOptions::new(1).batch_unit(TimeUnit::Minute);
    let batches = collect(DgLoader::new(view, options).unwrap());
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].time, arr1(&[0, 30]));
    assert_eq!(batches[1].time, arr1(&[61]));
    assert_eq!(batches[2].time, arr1(&[125]));
}

#[test]
fn physical_gaps_produce_empty_batches() {
    let view = chain(&[0, 9], seconds());
    let options = LoaderOptions::new(2).batch_unit(TimeUnit::Second);
    let batches = collect(DgLoader::new(view, options).unwrap());
    assert_eq!(batches.len(), 5);
    assert_eq!(batches.iter().filter(|b| b.is_empty()).count(), 3);
}

#[test]
fn invalid_configurations_are_rejected() {
    let ordered = chain(&[0, 1], TimeDelta::ordered());
    let physical = chain(&[0, 1], seconds());

    assert!(DgLoader::new(ordered.clone(), LoaderOptions::new(0)).is_err());
    assert!(DgLoader::new(
        ordered,
        LoaderOptions::new(1).batch_unit(TimeUnit::Second)
    )
    .is_err());
    assert!(DgLoader::new(physical.clone(), LoaderOptions::new(1)).is_err());

    let minutes = chain(&[0, 1], TimeDelta::new(TimeUnit::Minute, 1).unwrap());
    let err = DgLoader::new(minutes, LoaderOptions::new(30).batch_unit(TimeUnit::Second))
        .unwrap_err();
    assert!(err.to_string().contains("coarser"));

    let empty = physical.slice_time(Some(10), Some(20)).unwrap();
    assert!(DgLoader::new(empty, LoaderOptions::new(1).batch_unit(TimeUnit::Second)).is_err());
}

#[test]
fn hook_runs_once_per_window() {
    let view = chain(&[0, 1, 2, 3], TimeDelta::ordered());
    let calls = Rc::new(Cell::new(0usize));
    let seen = Rc::clone(&calls);
    let loader = DgLoader::new(view, LoaderOptions::new(2))
        .unwrap()
        .with_hook(move |batch: GraphView| -> dyngraph::Result<GraphView> {
            seen.set(seen.get() + 1);
            Ok(batch.slice_nodes([NodeId(1)]))
        });
    let batches = collect(loader);
    assert_eq!(calls.get(), 2);
    assert_eq!(batches[0].src, arr1(&[0, 1]));
    assert!(batches[1].is_empty());
}

#[test]
fn features_can_be_skipped() {
    let events = vec![
        Event::edge(0, 0u64, 1u64).with_features(arr1(&[1.0f32]).into_dyn()),
        Event::edge(1, 1u64, 2u64).with_features(arr1(&[2.0f32]).into_dyn()),
    ];
    let view = GraphView::new(events, TimeDelta::ordered()).unwrap();

    let with = collect(DgLoader::new(view.clone(), LoaderOptions::new(1)).unwrap());
    let expected: ArrayD<f32> = ndarray::arr2(&[[2.0f32]]).into_dyn();
    assert_eq!(with[1].edge_feats.as_ref(), Some(&expected));

    let without = collect(
        DgLoader::new(view, LoaderOptions::new(1).materialize_features(false)).unwrap(),
    );
    assert!(without.iter().all(|b| b.edge_feats.is_none()));
}

#[test]
fn options_deserialize_with_defaults() {
    let options: LoaderOptions = serde_json::from_str(r#"{"batch_size": 8}"#).unwrap();
    assert_eq!(options.batch_size, 8);
    assert_eq!(options.batch_unit, TimeUnit::Ordered);
    assert!(!options.drop_last);
    assert!(options.materialize_features);
}
