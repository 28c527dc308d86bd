use catch_samplekit::schema::{label, method, qualitative};
use catch_samplekit::{
    flat_list_to_tree, tree_to_flat_list, Batch, BatchId, CatchTree, FlatBatch, PmfmId, PmfmValue,
    ReferenceRef, SamplingRatio, Weight,
};
use proptest::prelude::*;
use proptest::test_runner::Config;

/// Catch with one taxon group, a landing split, its sampling child, and one
/// measured individual. Internal nodes all carry ids.
fn sample_tree() -> CatchTree {
    let mut tree = CatchTree::new(Batch::catch().with_id(BatchId(1)));
    let group = tree.push_child(
        tree.root(),
        Batch::new(label::sorting_batch(1), 1)
            .with_id(BatchId(2))
            .with_weight(Weight::entered(120.5))
            .with_taxon_group(ReferenceRef::new(44, "COD")),
    );
    let landing = tree.push_child(
        group,
        Batch::new(
            label::qualitative(&label::sorting_batch(1), qualitative::LANDING),
            1,
        )
        .with_id(BatchId(3)),
    );
    let sampling = tree.push_child(
        landing,
        Batch::new(label::sampling(&tree.get(landing).label), 1)
            .with_id(BatchId(4))
            .with_weight(Weight::computed(30.13, method::CALCULATED)),
    );
    tree.get_mut(sampling).sampling_ratio = Some(SamplingRatio::derived(25.0, 30.13, 120.5));
    tree.push_child(
        sampling,
        Batch::new(label::individual(1), 1).with_individual_count(3),
    );
    tree
}

#[test]
fn empty_list_decodes_to_none() {
    assert!(flat_list_to_tree(&[]).is_none());
}

#[test]
fn list_without_a_catch_root_decodes_to_none() {
    let flat = tree_to_flat_list(&sample_tree()).expect("internal ids present");
    let headless: Vec<FlatBatch> = flat.into_iter().skip(1).collect();
    assert!(flat_list_to_tree(&headless).is_none());
}

#[test]
fn flatten_emits_every_parent_before_its_children() {
    let flat = tree_to_flat_list(&sample_tree()).expect("internal ids present");
    assert_eq!(flat.len(), 5);
    assert_eq!(flat[0].parent_id, None);
    for (pos, record) in flat.iter().enumerate().skip(1) {
        let parent_id = record.parent_id.expect("non-root records carry a parent id");
        let parent_pos = flat
            .iter()
            .position(|r| r.id == Some(parent_id))
            .expect("parent record exists");
        assert!(parent_pos < pos, "parent of {} came after it", record.label);
    }
    // pre-order, sibling order preserved
    let labels: Vec<&str> = flat.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "CATCH_BATCH",
            "SORTING_BATCH#1",
            "SORTING_BATCH#1.LANDING",
            "SORTING_BATCH#1.LANDING.%",
            "SORTING_BATCH_INDIVIDUAL#1",
        ]
    );
}

#[test]
fn round_trip_reflattens_to_the_same_records() {
    let flat = tree_to_flat_list(&sample_tree()).expect("internal ids present");
    let decoded = flat_list_to_tree(&flat).expect("root present");
    let again = tree_to_flat_list(&decoded).expect("ids survive the round trip");
    assert_eq!(flat, again);
}

#[test]
fn internal_node_without_an_id_is_an_error() {
    let mut tree = CatchTree::new(Batch::catch().with_id(BatchId(1)));
    let group = tree.push_child(tree.root(), Batch::new(label::sorting_batch(1), 1));
    tree.push_child(group, Batch::new(label::individual(1), 1));

    let err = tree_to_flat_list(&tree).expect_err("group has children but no id");
    assert_eq!(err.label, "SORTING_BATCH#1");

    // a childless node without an id is fine
    tree.get_mut(group).id = Some(BatchId(2));
    assert!(tree_to_flat_list(&tree).is_ok());
}

#[test]
fn records_link_in_any_order() {
    let mut flat = tree_to_flat_list(&sample_tree()).expect("internal ids present");
    flat.reverse();
    let decoded = flat_list_to_tree(&flat).expect("root still found");
    let group = decoded.children(decoded.root())[0];
    assert_eq!(decoded.get(group).id, Some(BatchId(2)));
    assert_eq!(decoded.subtree(decoded.root()).len(), 5);
}

#[test]
fn unresolvable_parents_are_dropped_not_fatal() {
    let mut flat = tree_to_flat_list(&sample_tree()).expect("internal ids present");
    // orphan pointing at an id nobody carries, and a record pointing at itself
    let mut orphan = flat[4].clone();
    orphan.parent_id = Some(BatchId(99));
    let mut selfish = flat[4].clone();
    selfish.id = Some(BatchId(7));
    selfish.parent_id = Some(BatchId(7));
    flat.push(orphan);
    flat.push(selfish);

    let decoded = flat_list_to_tree(&flat).expect("root present");
    assert_eq!(decoded.subtree(decoded.root()).len(), 5);
}

#[test]
fn first_catch_root_wins() {
    let mut flat = tree_to_flat_list(&sample_tree()).expect("internal ids present");
    let mut second_root = flat[0].clone();
    second_root.id = Some(BatchId(50));
    flat.push(second_root);

    let decoded = flat_list_to_tree(&flat).expect("root present");
    assert_eq!(decoded.get(decoded.root()).id, Some(BatchId(1)));
    assert_eq!(decoded.subtree(decoded.root()).len(), 5);
}

#[test]
fn wire_records_are_camel_cased() {
    let flat = tree_to_flat_list(&sample_tree()).expect("internal ids present");
    let json = serde_json::to_value(&flat).expect("records serialize");

    assert_eq!(json[1]["parentId"], serde_json::json!(1));
    assert_eq!(json[1]["rankOrder"], serde_json::json!(1));
    assert_eq!(json[1]["taxonGroup"]["label"], serde_json::json!("COD"));
    assert_eq!(json[1]["weight"]["unit"], serde_json::json!("kg"));
    assert_eq!(json[1]["weight"]["computed"], serde_json::json!(false));
    assert_eq!(json[3]["weight"]["methodId"], serde_json::json!(4));
    assert_eq!(json[3]["samplingRatio"], serde_json::json!(25.0));
    assert_eq!(json[3]["samplingRatioText"], serde_json::json!("30.13/120.5"));
    // absent fields stay off the wire
    assert!(json[0].get("parentId").is_none());
    assert!(json[0].get("weight").is_none());
}

#[test]
fn legacy_rows_parse_link_and_type() {
    let data = serde_json::json!([
        {"id": 10, "label": "CATCH_BATCH", "rankOrder": 1},
        {"id": 11, "parentId": 10, "label": "SORTING_BATCH#1", "rankOrder": 1,
         "weight": {"value": 100.0, "unit": "kg"}},
        {"id": 12, "parentId": 11, "label": "SORTING_BATCH#1.%", "rankOrder": 1,
         "weight": {"value": 25.0, "unit": "kg", "computed": true, "methodId": 4},
         "samplingRatio": 25.0, "samplingRatioText": "25/100",
         "measurementValues": {"60": "5"}}
    ]);
    let records: Vec<FlatBatch> = serde_json::from_value(data).expect("wire rows parse");
    let tree = flat_list_to_tree(&records).expect("root present");

    let group = tree.children(tree.root())[0];
    assert_eq!(tree.get(group).weight, Some(Weight::entered(100.0)));

    let sampling = tree.sampling_child(group).expect("sampling child linked");
    let batch = tree.get(sampling);
    assert_eq!(batch.weight, Some(Weight::computed(25.0, method::CALCULATED)));
    assert_eq!(
        batch.sampling_ratio,
        Some(SamplingRatio::derived(25.0, 25.0, 100.0))
    );
    assert_eq!(
        batch.measurement(PmfmId(60)),
        Some(&PmfmValue::Text("5".to_string()))
    );
}

proptest! {
    #![proptest_config(Config::with_cases(64))]
    #[test]
    fn round_trip_is_stable_for_generated_trees(
        groups in prop::collection::vec((0.0f64..500.0, 0u32..40, any::<bool>()), 0..6)
    ) {
        let mut tree = CatchTree::new(Batch::catch().with_id(BatchId(1)));
        let mut next_id = 2;
        for (pos, (weight, count, with_sampling)) in groups.iter().enumerate() {
            let rank = (pos + 1) as u32;
            let group = tree.push_child(
                tree.root(),
                Batch::new(label::sorting_batch(rank), rank)
                    .with_id(BatchId(next_id))
                    .with_weight(Weight::entered(*weight)),
            );
            next_id += 1;
            if *with_sampling {
                let sampling = tree.ensure_sampling_child(group);
                tree.get_mut(sampling).id = Some(BatchId(next_id));
                tree.get_mut(sampling).individual_count = Some(*count);
                next_id += 1;
            }
        }

        let flat = tree_to_flat_list(&tree).expect("generated parents carry ids");
        let decoded = flat_list_to_tree(&flat).expect("flattened trees always have a root");
        let again = tree_to_flat_list(&decoded).expect("decoded parents keep their ids");
        prop_assert_eq!(flat, again);
    }
}
