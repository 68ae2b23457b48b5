use super::*;
use crate::config::FusionRule;
use crate::error::DeinlineError;
use crate::grouper::{group_occurrences, Group};
use crate::model::Occurrence;

fn occurrences(blocks: &[&[&str]]) -> Vec<Occurrence> {
    blocks
        .iter()
        .enumerate()
        .map(|(i, lines)| Occurrence::parse(format!("o{i}"), lines).unwrap())
        .collect()
}

fn single_group(input: &[Occurrence]) -> Group<'_> {
    let mut grouping = group_occurrences(input);
    assert_eq!(grouping.groups.len(), 1);
    grouping.groups.remove(0)
}

#[test]
fn test_slot_table_is_statement_major() {
    let input = occurrences(&[&["a(1, 2);", "b();", "c(3);"]]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    assert_eq!(table.len(), 3);
    assert_eq!(table.slot(2), Slot::new(2, 0));
    assert_eq!(table.index_of(Slot::new(0, 1)), 1);
    assert!(table.statement_range(1).is_empty());
    assert_eq!(table.callee(2), "c");
}

#[test]
fn test_constants_exclude_frame_variables() {
    let input = occurrences(&[
        &["a(0, GL_RGBA, global_int_1, param_int_0, 5);"],
        &["a(0, GL_RGBA, global_int_1, param_int_0, 6);"],
    ]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    assert!(eq.is_constant(0));
    assert!(eq.is_constant(1));
    assert!(eq.is_constant(2));
    assert!(!eq.is_constant(3));
    assert!(!eq.is_constant(4));
    assert_eq!(eq.constant_count(), 3);
}

#[test]
fn test_meet_is_by_partition_shape_not_name() {
    let input = occurrences(&[
        &["a(param_int_0, param_int_1, param_int_0);"],
        &["a(param_int_2, param_int_3, param_int_2);"],
    ]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    assert_eq!(eq.class_of(0), eq.class_of(2));
    assert_ne!(eq.class_of(0), eq.class_of(1));
    assert_eq!(eq.members(0), vec![0, 2]);
}

#[test]
fn test_partial_meet_splits_classes() {
    let input = occurrences(&[&["a(x, x, x);"], &["a(y, y, z);"]]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    assert!(eq.partition(0).same_class(0, 2));
    assert!(!eq.partition(1).same_class(0, 2));
    assert_eq!(eq.class_of(0), eq.class_of(1));
    assert_ne!(eq.class_of(0), eq.class_of(2));
}

#[test]
fn test_address_of_edge() {
    let input = occurrences(&[&["openAsset(mgr, name, &p);", "getAssetBuffer(p);"]]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let graph = AliasGraph::build(&table, group.occurrences[0]);
    let edges: Vec<AliasEdge> = graph.edges().into_iter().collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].producer, 2);
    assert_eq!(edges[0].consumer, 3);
    assert_eq!(edges[0].storage, StorageKind::Variable);
    assert_eq!(edges[0].path(), AccessPath::Direct);
}

#[test]
fn test_pointee_edge_for_index() {
    let input = occurrences(&[&["openAsset(mgr, name, pp);", "getAssetBuffer(pp[1]);"]]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let edges: Vec<AliasEdge> = AliasGraph::build(&table, group.occurrences[0])
        .edges()
        .into_iter()
        .collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].storage, StorageKind::Pointee);
    assert_eq!(edges[0].path(), AccessPath::Index("1".to_string()));
}

#[test]
fn test_consumer_binds_nearest_producer() {
    let input = occurrences(&[&["open(&p);", "get(p);", "open(&p);", "get(p);", "get(*p);"]]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let edges: Vec<(usize, usize)> = AliasGraph::build(&table, group.occurrences[0])
        .edges()
        .into_iter()
        .map(|e| (e.producer, e.consumer))
        .collect();
    assert_eq!(edges, vec![(0, 1), (2, 3), (2, 4)]);
}

#[test]
fn test_plain_reuse_is_not_aliasing() {
    let input = occurrences(&[&["a(p);", "b(p);", "c(&q);"]]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    assert_eq!(AliasGraph::build(&table, group.occurrences[0]).edge_count(), 0);
}

#[test]
fn test_same_statement_reads_value_before_the_call() {
    let input = occurrences(&[&["f(&p, p);", "g(p);"], &["f(&q, q);", "g(q);"]]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let edges: Vec<(usize, usize)> = AliasGraph::build(&table, group.occurrences[0])
        .edges()
        .into_iter()
        .map(|e| (e.producer, e.consumer))
        .collect();
    assert_eq!(edges, vec![(0, 2)]);

    let eq = Equivalence::analyze(&table, &group.occurrences);
    let aliases = AliasAnalysis::resolve(&group, &table, &eq).unwrap();
    assert!(aliases.edge_for_consumer(1).is_none());
    assert_eq!(aliases.consumers_of(0), &[2]);
}

#[test]
fn test_localize_resolution() {
    let input = occurrences(&[
        &["openAsset(mgr, name, &p);", "getAssetBuffer(p);"],
        &["openAsset(m2, n2, &q);", "getAssetBuffer(q);"],
    ]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    let aliases = AliasAnalysis::resolve(&group, &table, &eq).unwrap();
    assert_eq!(aliases.resolution(2), Some(Resolution::Localize));
    assert_eq!(aliases.edge_for_consumer(3).map(|e| e.producer), Some(2));
    assert_eq!(aliases.consumers_of(2), &[3]);
}

#[test]
fn test_live_out_forces_pointer_resolution() {
    let mut input = occurrences(&[
        &["openAsset(mgr, name, &p);", "getAssetBuffer(p);"],
        &["openAsset(mgr, name, &q);", "getAssetBuffer(q);"],
    ]);
    input[1] = input[1].clone().with_live_out(["q"]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    let aliases = AliasAnalysis::resolve(&group, &table, &eq).unwrap();
    assert_eq!(aliases.resolution(2), Some(Resolution::Pointer));
}

#[test]
fn test_global_resolution() {
    let input = occurrences(&[
        &["openAsset(mgr, \"a\", &global_AAsset_ptr_0);", "getAssetBuffer(global_AAsset_ptr_0);"],
        &["openAsset(mgr, \"b\", &global_AAsset_ptr_0);", "getAssetBuffer(global_AAsset_ptr_0);"],
    ]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    let aliases = AliasAnalysis::resolve(&group, &table, &eq).unwrap();
    assert_eq!(aliases.resolution(2), Some(Resolution::Global));
}

#[test]
fn test_mixed_aliasing_is_rejected() {
    let input = occurrences(&[
        &["openAsset(mgr, name, &p);", "getAssetBuffer(p);"],
        &["openAsset(mgr, name, &p);", "getAssetBuffer(p);"],
        &["openAsset(mgr, name, &p);", "getAssetBuffer(other);"],
    ]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    match AliasAnalysis::resolve(&group, &table, &eq) {
        Err(DeinlineError::UnsupportedAliasing {
            producer,
            consumer,
            occurrences,
            ..
        }) => {
            assert_eq!(producer, Slot::new(0, 2));
            assert_eq!(consumer, Slot::new(1, 0));
            let points: Vec<&str> = occurrences.iter().map(|p| p.as_str()).collect();
            assert_eq!(points, vec!["o0", "o2"]);
        }
        other => panic!("expected aliasing error, got {other:?}"),
    }
}

#[test]
fn test_different_index_is_rejected() {
    let input = occurrences(&[
        &["open(pp);", "get(pp[1]);"],
        &["open(pp);", "get(pp[2]);"],
    ]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    assert!(matches!(
        AliasAnalysis::resolve(&group, &table, &eq),
        Err(DeinlineError::UnsupportedAliasing { .. })
    ));
}

#[test]
fn test_frame_variable_index_is_rejected() {
    let input = occurrences(&[&["open(pp);", "get(pp[i]);"], &["open(pp);", "get(pp[i]);"]]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    match AliasAnalysis::resolve(&group, &table, &eq) {
        Err(DeinlineError::UnsupportedAliasing { reason, .. }) => {
            assert!(reason.contains("index"));
        }
        other => panic!("expected aliasing error, got {other:?}"),
    }
}

#[test]
fn test_fusion_plan_requires_localizable_storage() {
    let rules = vec![FusionRule::new("openAsset", "getAssetBuffer")];

    let input = occurrences(&[
        &["openAsset(mgr, \"a\", &p);", "getAssetBuffer(p);", "glFlush();"],
        &["openAsset(mgr, \"b\", &q);", "getAssetBuffer(q);", "glFlush();"],
    ]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    let aliases = AliasAnalysis::resolve(&group, &table, &eq).unwrap();
    let pairs = aliases.plan_fusions(&table, &eq, &rules);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].statement, 0);
    assert_eq!(pairs[0].helper, "openAssetAndGetAssetBuffer");
    assert_eq!(pairs[0].producers, vec![2]);

    let escaping = vec![
        input[0].clone(),
        input[1].clone().with_live_out(["q"]),
    ];
    let group = single_group(&escaping);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    let aliases = AliasAnalysis::resolve(&group, &table, &eq).unwrap();
    assert!(aliases.plan_fusions(&table, &eq, &rules).is_empty());
}

#[test]
fn test_fusion_requires_all_consumers_in_next_call() {
    let rules = vec![FusionRule::new("openAsset", "getAssetBuffer")];
    let input = occurrences(&[
        &["openAsset(mgr, &p);", "getAssetBuffer(p);", "closeAsset(p);"],
        &["openAsset(mgr, &q);", "getAssetBuffer(q);", "closeAsset(q);"],
    ]);
    let group = single_group(&input);
    let table = SlotTable::for_group(&group);
    let eq = Equivalence::analyze(&table, &group.occurrences);
    let aliases = AliasAnalysis::resolve(&group, &table, &eq).unwrap();
    assert_eq!(aliases.resolution(1), Some(Resolution::Localize));
    assert!(aliases.plan_fusions(&table, &eq, &rules).is_empty());
}
