// tests/test_tree.rs -- Structural properties of the tree under mutation.

use faster_learn::offsets::OffsetTable;
use faster_learn::tree::Node;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn offsets() -> OffsetTable {
    OffsetTable::generate(3)
}

#[test]
fn invariant_survives_long_mutation_runs() {
    let table = offsets();
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tree = Node::random(4, true, table.len(), &mut rng);
        assert!(tree.eq_invariant_holds());
        for step in 0..1000 {
            tree.mutate(table.len(), &mut rng);
            assert!(
                tree.eq_invariant_holds(),
                "eq invariant broken: seed {seed}, step {step}",
            );
        }
    }
}

#[test]
fn node_count_never_drifts() {
    let table = offsets();
    let mut rng = StdRng::seed_from_u64(7);
    let mut tree = Node::random(3, true, table.len(), &mut rng);
    for _ in 0..500 {
        tree.mutate(table.len(), &mut rng);
        // flatten() visits every node exactly once, independently of
        // num_nodes()'s recursion.
        assert_eq!(tree.num_nodes(), tree.flatten().len());
        // Arity is always 0 or 3, so the count is ≡ 1 (mod 3).
        assert_eq!(tree.num_nodes() % 3, 1);
    }
}

#[test]
fn grown_eq_leaf_stays_plain() {
    // The grow operator replaces a leaf with Node::random(1, is_eq, ..):
    // whatever the draws, the fresh subtree's eq leaf must be plain, so an
    // eq-reachable leaf that grows keeps the invariant.
    let table = offsets();
    for seed in 0..100u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let grown = Node::random(1, true, table.len(), &mut rng);
        assert!(!grown.is_leaf());
        assert!(grown.eq_invariant_holds(), "seed {seed}");
    }
}

#[test]
fn depth_one_tree_mutations_hold_invariant() {
    // Smallest interesting tree: the eq leaf can only ever grow, never
    // flip. Hammer it with mutations and check after each one.
    let table = offsets();
    let mut rng = StdRng::seed_from_u64(123);
    for trial in 0..50 {
        let mut tree = Node::random(1, true, table.len(), &mut rng);
        for _ in 0..200 {
            tree.mutate(table.len(), &mut rng);
            assert!(tree.eq_invariant_holds(), "trial {trial}");
        }
    }
}

#[test]
fn splat_produces_leaf_with_no_children() {
    // Run mutations on small trees until a splat reduces one to a single
    // leaf. The result must be a childless leaf, and since the root is
    // eq-reachable, a plain one.
    let table = offsets();
    let mut rng = StdRng::seed_from_u64(50);
    let mut seen_single_leaf = false;
    for _ in 0..300 {
        let mut tree = Node::random(1, true, table.len(), &mut rng);
        for _ in 0..30 {
            tree.mutate(table.len(), &mut rng);
            if tree.is_leaf() {
                assert_eq!(tree.num_nodes(), 1);
                assert!(!tree.is_corner);
                seen_single_leaf = true;
                break;
            }
        }
    }
    assert!(seen_single_leaf, "no run ever splatted down to the root");
}

#[test]
fn mutation_is_reproducible_for_a_seed() {
    let table = offsets();
    let build = || {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut tree = Node::random(3, true, table.len(), &mut rng);
        for _ in 0..300 {
            tree.mutate(table.len(), &mut rng);
        }
        tree
    };
    assert_eq!(build(), build());
}

#[test]
fn copy_then_mutate_leaves_original_untouched() {
    let table = offsets();
    let mut rng = StdRng::seed_from_u64(9);
    let original = Node::random(3, true, table.len(), &mut rng);
    let snapshot = original.clone();
    let mut working = original.clone();
    for _ in 0..100 {
        working.mutate(table.len(), &mut rng);
    }
    assert_eq!(original, snapshot);
}

#[test]
fn flatten_roundtrip_after_heavy_mutation() {
    let table = offsets();
    let mut rng = StdRng::seed_from_u64(31);
    let mut tree = Node::random(4, true, table.len(), &mut rng);
    for _ in 0..500 {
        tree.mutate(table.len(), &mut rng);
    }
    let rebuilt = Node::from_flat(&tree.flatten()).expect("flat form is well-formed");
    assert_eq!(rebuilt, tree);

    // And through JSON, which is what the binary writes.
    let json = serde_json::to_string(&tree.flatten()).unwrap();
    let nodes: Vec<faster_learn::tree::FlatNode> = serde_json::from_str(&json).unwrap();
    assert_eq!(Node::from_flat(&nodes).unwrap(), tree);
}
