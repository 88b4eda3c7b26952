use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rrtree::prelude::*;
use rrtree::trace::RecordingTracer;
use rrtree::{ObjectTracer, Operation, TraceEvent};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn item(id: u64, x: f64, y: f64) -> SpatialItem {
    SpatialItem::from_point(id, Point::new(x, y))
}

fn everywhere() -> BoundingBox {
    BoundingBox::new(-1e9, -1e9, 1e9, 1e9)
}

fn ids(found: &[SpatialItem]) -> BTreeSet<u64> {
    found.iter().map(|item| item.id).collect()
}

fn small_config() -> RRTreeConfig {
    RRTreeConfig::default()
        .with_node_capacity(2, 6)
        .with_max_buffer_size(8)
}

/// Replays a seeded workload and compares every query with a plain set.
struct Workload {
    rng: StdRng,
    live: Vec<SpatialItem>,
    removed: Vec<SpatialItem>,
    next_id: u64,
}

impl Workload {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            live: Vec::new(),
            removed: Vec::new(),
            next_id: 0,
        }
    }

    fn step(&mut self, tree: &mut RRTree<SpatialItem>) {
        let roll: f64 = self.rng.random();
        if roll < 0.55 || self.live.is_empty() {
            let x = self.rng.random_range(0.0..100.0);
            let y = self.rng.random_range(0.0..100.0);
            let data = item(self.next_id, x, y);
            self.next_id += 1;
            tree.insert(data).unwrap();
            self.live.push(data);
        } else if roll < 0.9 || self.removed.is_empty() {
            let index = self.rng.random_range(0..self.live.len());
            let data = self.live.swap_remove(index);
            tree.remove(data).unwrap();
            self.removed.push(data);
        } else {
            let index = self.rng.random_range(0..self.removed.len());
            let data = self.removed.swap_remove(index);
            tree.insert(data).unwrap();
            self.live.push(data);
        }
    }

    fn check_window(&mut self, tree: &mut RRTree<SpatialItem>) {
        let x = self.rng.random_range(0.0..80.0);
        let y = self.rng.random_range(0.0..80.0);
        let window = BoundingBox::new(x, y, x + 20.0, y + 20.0);
        let expected: BTreeSet<u64> = self
            .live
            .iter()
            .filter(|data| window.contains(&data.bbox))
            .map(|data| data.id)
            .collect();
        let found = tree.range_query(&window).unwrap();
        assert_eq!(found.len(), expected.len(), "duplicate results in {window:?}");
        assert_eq!(ids(&found), expected);
    }

    fn check_all(&self, tree: &mut RRTree<SpatialItem>) {
        let expected: BTreeSet<u64> = self.live.iter().map(|data| data.id).collect();
        let found = tree.range_query(&everywhere()).unwrap();
        assert_eq!(found.len(), expected.len());
        assert_eq!(ids(&found), expected);
    }
}

fn run_workload(config: RRTreeConfig, seed: u64, steps: usize) -> RRTree<SpatialItem> {
    init_logging();
    let mut tree = RRTree::new(config).unwrap();
    let mut workload = Workload::new(seed);
    for step in 0..steps {
        workload.step(&mut tree);
        tree.check_invariants().unwrap();
        if step % 25 == 0 {
            workload.check_window(&mut tree);
        }
    }
    workload.check_all(&mut tree);
    tree.on_next_empty_buffer_force_full();
    tree.force_empty_buffer().unwrap();
    assert_eq!(tree.buffer_len(), 0);
    tree.check_invariants().unwrap();
    workload.check_all(&mut tree);
    tree
}

fn push_down_strategies() -> Vec<PushDownConfig> {
    vec![
        PushDownConfig::PushDownAll,
        PushDownConfig::Threshold {
            threshold: 3,
            by_insertions: false,
        },
        PushDownConfig::RootLevelThreshold {
            threshold: 3,
            by_insertions: true,
        },
        PushDownConfig::LargestGroup {
            by_insertions: false,
        },
        PushDownConfig::ThresholdBelowRoot {
            root: Box::new(PushDownConfig::LargestGroup {
                by_insertions: true,
            }),
            threshold: 2,
            by_insertions: false,
        },
        PushDownConfig::DivideByFanoutBelowRoot {
            root: Box::new(PushDownConfig::PushDownAll),
            constant: 1.5,
            by_insertions: false,
        },
        PushDownConfig::DivideByConstantBelowRoot {
            root: Box::new(PushDownConfig::LargestGroup {
                by_insertions: false,
            }),
            coefficient: 0.5,
            by_insertions: false,
        },
        PushDownConfig::LargestGroupSplitDeletes {
            by_insertions: false,
        },
    ]
}

/// Counters summed over several seeded churn workloads on tiny nodes.
fn churn_stats(grouping: GroupingConfig, representation: DiskRepresentation) -> RRTreeStats {
    let mut total = RRTreeStats::default();
    for seed in 0..4 {
        let config = RRTreeConfig::default()
            .with_node_capacity(2, 4)
            .with_max_buffer_size(16)
            .with_grouping(grouping)
            .with_representation(representation)
            .with_push_down(PushDownConfig::PushDownAll);
        let tree = run_workload(config, 500 + seed, 2_000);
        let stats = tree.stats();
        total.restarts += stats.restarts;
        total.failed_emptyings += stats.failed_emptyings;
        total.subtree_merges += stats.subtree_merges;
        total.elided_nodes += stats.elided_nodes;
        total.index_piggybacked += stats.index_piggybacked;
        total.pushed_group_sizes.merge(&stats.pushed_group_sizes);
    }
    total
}

#[test]
fn test_buffer_emptying_scenario() {
    init_logging();
    let config = RRTreeConfig::default()
        .with_node_capacity(2, 4)
        .with_max_buffer_size(4)
        .with_push_down(PushDownConfig::PushDownAll);
    let mut tree = RRTree::new(config).unwrap();

    for id in 0..3 {
        tree.insert(item(id, id as f64, 0.0)).unwrap();
        assert!(!tree.was_buffer_emptied());
    }
    assert_eq!(tree.buffer_len(), 3);
    assert_eq!(tree.height(), 0);

    tree.insert(item(3, 3.0, 0.0)).unwrap();
    assert!(tree.was_buffer_emptied());
    assert_eq!(tree.buffer_len(), 0);
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.stats().emptyings, 1);
    assert_eq!(tree.stats().completed_insertions, 4);

    let found = tree
        .range_query(&BoundingBox::new(0.5, -1.0, 2.5, 1.0))
        .unwrap();
    assert_eq!(ids(&found), BTreeSet::from([1, 2]));
}

#[test]
fn test_annihilation_scenario() {
    let mut tree: RRTree<SpatialItem> = RRTree::new(small_config()).unwrap();
    let data = item(1, 5.0, 5.0);

    tree.insert(data).unwrap();
    assert_eq!(tree.remove(data).unwrap(), Some(data));
    assert_eq!(tree.buffer_len(), 0);
    assert_eq!(tree.deletion_insertion_annihilations(), 1);
    assert_eq!(tree.container_stats().io(), 0);
    assert!(tree.range_query(&everywhere()).unwrap().is_empty());

    tree.remove(data).unwrap();
    tree.insert(data).unwrap();
    assert_eq!(tree.insertion_deletion_annihilations(), 1);
    assert_eq!(tree.buffer_len(), 0);
}

#[test]
fn test_random_workloads_tombstones() {
    for (seed, push_down) in push_down_strategies().into_iter().enumerate() {
        for grouping in [
            GroupingConfig::Trivial,
            GroupingConfig::DeletionsAsInsertions,
            GroupingConfig::InsertionsOnly,
        ] {
            let config = small_config()
                .with_representation(DiskRepresentation::Tombstones)
                .with_grouping(grouping)
                .with_push_down(push_down.clone());
            let tree = run_workload(config, seed as u64, 400);
            assert!(tree.stats().emptyings > 0);
        }
    }
}

#[test]
fn test_random_workloads_physical() {
    for (seed, push_down) in push_down_strategies().into_iter().enumerate() {
        for grouping in [
            GroupingConfig::Trivial,
            GroupingConfig::DeletionsAsInsertions,
            GroupingConfig::InsertionsOnly,
        ] {
            let config = small_config()
                .with_representation(DiskRepresentation::Physical)
                .with_grouping(grouping)
                .with_push_down(push_down.clone());
            let mut tree = run_workload(config, 100 + seed as u64, 400);
            assert_eq!(tree.stats().discarded_deletions, 0);
            assert!((tree.physical_to_logical_ratio().unwrap() - 1.0).abs() < 1e-9);
        }
    }
}

#[test]
fn test_random_workload_without_piggybacking() {
    let config = small_config().with_piggybacking(false);
    let tree = run_workload(config, 7, 500);
    assert_eq!(tree.stats().leaf_piggybacked, 0);
    assert_eq!(tree.stats().index_piggybacked, 0);
    assert_eq!(tree.stats().query_piggybacked, 0);
}

#[test]
fn test_random_workload_with_piggyback_epsilon() {
    let config = small_config().with_piggyback_epsilon(0.25);
    run_workload(config, 11, 500);
}

#[test]
fn test_larger_tree_default_capacities() {
    let config = RRTreeConfig::default().with_max_buffer_size(64);
    let tree = run_workload(config, 42, 3_000);
    assert!(tree.height() >= 2);
    assert!(tree.stats().group_updates > 0);
}

#[test]
fn test_query_results_combine_buffer_and_tree() {
    let config = small_config().with_push_down(PushDownConfig::PushDownAll);
    let mut tree = RRTree::new(config).unwrap();
    for id in 0..8 {
        tree.insert(item(id, id as f64, id as f64)).unwrap();
    }
    assert_eq!(tree.buffer_len(), 0);

    // One stored datum deleted from the buffer, one new datum buffered.
    tree.remove(item(2, 2.0, 2.0)).unwrap();
    tree.insert(item(20, 2.5, 2.5)).unwrap();

    let found = tree
        .range_query(&BoundingBox::new(1.5, 1.5, 3.5, 3.5))
        .unwrap();
    assert_eq!(ids(&found), BTreeSet::from([3, 20]));
}

#[test]
fn test_tracer_counts_match_updates() {
    let tracer = Rc::new(RefCell::new(RecordingTracer::new()));

    struct Shared(Rc<RefCell<RecordingTracer<SpatialItem>>>);
    impl ObjectTracer<SpatialItem> for Shared {
        fn trace(&mut self, event: TraceEvent, data: &SpatialItem) {
            self.0.borrow_mut().trace(event, data);
        }
    }

    let mut tree = RRTreeBuilder::new()
        .config(small_config())
        .tracer(Box::new(Shared(Rc::clone(&tracer))))
        .build()
        .unwrap();
    for id in 0..30 {
        tree.insert(item(id, id as f64, 0.0)).unwrap();
    }
    tree.remove(item(5, 5.0, 0.0)).unwrap();

    let recorded = tracer.borrow();
    assert_eq!(recorded.count(TraceEvent::InsertToBuffer), 30);
    assert_eq!(recorded.count(TraceEvent::RemoveFromBuffer), 1);
}

#[test]
fn test_operations_compare_by_data_and_kind() {
    let data = item(1, 0.0, 0.0);
    assert_eq!(Operation::insertion(data).opposite(), Operation::deletion(data));
    assert_ne!(Operation::insertion(data), Operation::deletion(data));
}

#[test]
fn test_churn_restarts_group_updates() {
    let stats = churn_stats(GroupingConfig::InsertionsOnly, DiskRepresentation::Tombstones);
    assert!(stats.restarts > 0, "{stats:?}");
    assert!(stats.subtree_merges > 0, "{stats:?}");
    assert!(stats.elided_nodes > 0, "{stats:?}");
    assert!(stats.index_piggybacked > 0, "{stats:?}");
    // Restarted updates record their group sizes too.
    assert!(stats.pushed_group_sizes.count() > stats.restarts);
}

#[test]
fn test_churn_restarts_with_deletions_grouped() {
    let stats = churn_stats(
        GroupingConfig::DeletionsAsInsertions,
        DiskRepresentation::Tombstones,
    );
    assert!(stats.restarts > 0, "{stats:?}");
    assert!(stats.subtree_merges > 0, "{stats:?}");
    assert!(stats.index_piggybacked > 0, "{stats:?}");
}

#[test]
fn test_buffer_of_deletions_fails_selective_emptying() {
    init_logging();
    let config = RRTreeConfig::default()
        .with_node_capacity(2, 4)
        .with_max_buffer_size(8)
        .with_grouping(GroupingConfig::InsertionsOnly)
        .with_push_down(PushDownConfig::PushDownAll);
    let mut tree = RRTree::new(config).unwrap();
    let data: Vec<SpatialItem> = (0..40)
        .map(|id| item(id, (id % 8) as f64 * 3.0, (id / 8) as f64 * 3.0))
        .collect();
    for datum in &data {
        tree.insert(*datum).unwrap();
    }
    assert_eq!(tree.buffer_len(), 0);
    assert!(tree.height() >= 2);
    tree.check_invariants().unwrap();

    let before = tree.stats().clone();
    for datum in data.iter().take(8) {
        tree.remove(*datum).unwrap();
    }
    assert!(tree.was_buffer_emptied());
    assert_eq!(tree.stats().failed_emptyings, before.failed_emptyings + 1);
    assert_eq!(tree.stats().full_emptyings, before.full_emptyings + 1);
    assert!(tree.stats().grouping.orphaned_deletions >= before.grouping.orphaned_deletions + 8);
    assert_eq!(tree.buffer_len(), 0);
    tree.check_invariants().unwrap();

    let expected: BTreeSet<u64> = (8..40).collect();
    assert_eq!(ids(&tree.range_query(&everywhere()).unwrap()), expected);
}

#[test]
fn test_split_deletions_descend_together() {
    let config = small_config()
        .with_grouping(GroupingConfig::Trivial)
        .with_push_down(PushDownConfig::LargestGroupSplitDeletes {
            by_insertions: false,
        });
    let tree = run_workload(config, 77, 800);
    assert!(tree.stats().grouping.deletion_splits.count() > 0);
}
