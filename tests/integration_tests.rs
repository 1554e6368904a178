//! Integration tests for the schedule optimization pipeline.

use schedopt::prelude::*;
use schedopt::transform::{optimize_scop, ScheduleTreeOptimizer, MACRO_KERNEL, REGISTER_TILING};
use std::collections::{BTreeMap, HashMap};

type InstanceKey = (StmtId, Vec<i64>);

/// `C[i][j] += A[i][k] * B[k][j]` over an `n^3` box.
fn gemm(n: i64) -> Scop {
    let stmt = StatementBuilder::new(StmtId(0), "gemm")
        .iterators(&["i", "j", "k"])
        .domain(IntegerSet::rectangular(&[n, n, n]))
        .read("C", AffineMap::projection(3, 0, &[0, 1]))
        .read("A", AffineMap::projection(3, 0, &[0, 2]))
        .read("B", AffineMap::projection(3, 0, &[2, 1]))
        .write("C", AffineMap::projection(3, 0, &[0, 1]))
        .build()
        .unwrap();
    let builder = ScopBuilder::new("gemm").statement(stmt);
    let tree = ScheduleTree::single_band(
        builder.domains(),
        vec![
            BandMember::permutable(true),
            BandMember::permutable(true),
            BandMember::permutable(false),
        ],
    );
    builder.build(tree).unwrap()
}

/// `B[i][j] = A[i][j]` over `0 <= i, j < N`.
fn copy2d() -> Scop {
    let stmt = StatementBuilder::new(StmtId(0), "copy")
        .iterators(&["i", "j"])
        .domain(IntegerSet::parametric_box(&[0, 0], 1))
        .read("A", AffineMap::identity(2, 1))
        .write("B", AffineMap::identity(2, 1))
        .build()
        .unwrap();
    let builder = ScopBuilder::new("copy2d").parameters(&["N"]).statement(stmt);
    let tree = ScheduleTree::single_band(builder.domains(), vec![BandMember::permutable(true); 2]);
    builder.build(tree).unwrap()
}

/// `A[i][j] = A[i-1][j] + A[i][j-1]`: permutable, nothing coincident.
fn seidel(n: i64) -> Scop {
    let shifted = |dim: usize| {
        let outputs = (0..2)
            .map(|d| {
                let v = AffineExpr::var(d, 2, 0);
                if d == dim { v - AffineExpr::constant(1, 2, 0) } else { v }
            })
            .collect();
        AffineMap::from_outputs(2, 0, outputs)
    };
    let stmt = StatementBuilder::new(StmtId(0), "seidel")
        .iterators(&["i", "j"])
        .domain(IntegerSet::rectangular(&[n, n]))
        .read("A", shifted(0))
        .read("A", shifted(1))
        .write("A", AffineMap::identity(2, 0))
        .build()
        .unwrap();
    let builder = ScopBuilder::new("seidel").statement(stmt);
    let tree = ScheduleTree::single_band(builder.domains(), vec![BandMember::permutable(false); 2]);
    builder.build(tree).unwrap()
}

/// `S0: C[i][j] = 0` followed by `S1: C[i][j] += A[i][k]`, each with its
/// own band below a sequence.
fn init_then_reduce(n: i64) -> Scop {
    let mut ids = StmtIdGen::new();
    let init = StatementBuilder::new(ids.next(), "init")
        .iterators(&["i", "j"])
        .domain(IntegerSet::rectangular(&[n, n]))
        .write("C", AffineMap::identity(2, 0))
        .build()
        .unwrap();
    let reduce = StatementBuilder::new(ids.next(), "reduce")
        .iterators(&["i", "j", "k"])
        .domain(IntegerSet::rectangular(&[n, n, n]))
        .read("C", AffineMap::projection(3, 0, &[0, 1]))
        .read("A", AffineMap::projection(3, 0, &[0, 2]))
        .write("C", AffineMap::projection(3, 0, &[0, 1]))
        .build()
        .unwrap();
    let (s0, s1) = (init.id, reduce.id);
    let builder = ScopBuilder::new("init_reduce").statement(init).statement(reduce);
    let domains = builder.domains();

    let mut tree = ScheduleTree::from_domain(domains.clone());
    let leaf = tree.children(tree.root())[0];
    let copies = tree
        .insert_sequence(
            leaf,
            vec![
                Filter::Statements([s0].into_iter().collect()),
                Filter::Statements([s1].into_iter().collect()),
            ],
        )
        .unwrap();
    let only = |s: StmtId| -> BTreeMap<StmtId, IntegerSet> {
        domains.iter().filter(|(k, _)| **k == s).map(|(k, v)| (*k, v.clone())).collect()
    };
    tree.insert_above(
        copies[0],
        NodeKind::Band(Band::identity(&only(s0), vec![BandMember::permutable(true); 2])),
    )
    .unwrap();
    tree.insert_above(
        copies[1],
        NodeKind::Band(Band::identity(
            &only(s1),
            vec![
                BandMember::permutable(true),
                BandMember::permutable(true),
                BandMember::permutable(false),
            ],
        )),
    )
    .unwrap();
    builder.build(tree).unwrap()
}

/// Every pair of accesses to the same memory cell, at least one a write,
/// keeps its relative order.
fn assert_preserves_dependences(scop: &Scop, optimized: &ScheduleTree, params: &[i64]) {
    let before = scop.schedule.execution_order(params).unwrap();
    let after = optimized.execution_order(params).unwrap();
    assert_eq!(before.len(), after.len(), "instance count changed");

    let position: HashMap<InstanceKey, usize> = after.iter()
        .enumerate()
        .map(|(n, inst)| ((inst.stmt, inst.point.clone()), n))
        .collect();
    assert_eq!(position.len(), after.len(), "an instance is scheduled twice");

    let mut cells: HashMap<(String, Vec<i64>), Vec<(InstanceKey, bool)>> = HashMap::new();
    for inst in &before {
        let stmt = scop.get_stmt(inst.stmt).unwrap();
        for access in &stmt.accesses {
            let cell = (access.array.clone(), access.relation.apply(&inst.point, params));
            cells.entry(cell)
                .or_default()
                .push(((inst.stmt, inst.point.clone()), access.is_write()));
        }
    }
    for (cell, accesses) in &cells {
        for (n, (first, first_writes)) in accesses.iter().enumerate() {
            for (second, second_writes) in &accesses[n + 1..] {
                if first != second && (*first_writes || *second_writes) {
                    assert!(
                        position[first] < position[second],
                        "dependence on {:?} reversed: {:?} -> {:?}",
                        cell, first, second
                    );
                }
            }
        }
    }
}

fn sorted_instances(tree: &ScheduleTree, params: &[i64]) -> Vec<InstanceKey> {
    let mut instances: Vec<InstanceKey> = tree.execution_order(params)
        .unwrap()
        .into_iter()
        .map(|inst| (inst.stmt, inst.point))
        .collect();
    instances.sort();
    instances
}

#[test]
fn test_gemm_pipeline() {
    let scop = gemm(6);
    let target = TargetInfo::avx2();
    let result = optimize_scop(&scop, &PipelineConfig::default(), Some(&target)).unwrap();
    assert!(result.profitable);
    assert_eq!(result.decisions.len(), 1);
    match &result.decisions[0].action {
        BandAction::MatMul { shape, .. } => assert_eq!(shape.permutation(), [2, 0, 1]),
        other => panic!("expected a matmul decision, got {:?}", other),
    }

    let tree = &result.schedule;
    let marks: Vec<String> = tree.bands().into_iter()
        .flat_map(|b| tree.band(b).unwrap().marks.iter().map(|m| m.to_string()).collect::<Vec<_>>())
        .collect();
    assert!(marks.contains(&format!("{} - Tiles", MACRO_KERNEL)));
    assert!(marks.contains(&format!("{} - Points", REGISTER_TILING)));
    assert_preserves_dependences(&scop, tree, &[]);
}

#[test]
fn test_tiling_round_trip() {
    // N = 12, T = 4: point members stay in [0, 4) and tile * 4 + point
    // reconstructs the iterator
    let scop = copy2d();
    let config = PipelineConfig {
        first_level: TilingLevel { enabled: true, tile_sizes: vec![4, 4], default_tile_size: 4 },
        enable_vectorization: false,
        ..Default::default()
    };
    let result = optimize_scop(&scop, &config, None).unwrap();
    let tree = &result.schedule;
    let bands = tree.bands();
    assert_eq!(bands.len(), 2);
    let tile = tree.band(bands[0]).unwrap();
    let point = tree.band(bands[1]).unwrap();
    for i in 0..12 {
        for j in 0..12 {
            for d in 0..2 {
                let t = tile.member_expr(StmtId(0), d).unwrap().evaluate(&[i, j], &[12]);
                let p = point.member_expr(StmtId(0), d).unwrap().evaluate(&[i, j], &[12]);
                assert!((0..4).contains(&p));
                assert_eq!(t * 4 + p, [i, j][d]);
            }
        }
    }
    assert_preserves_dependences(&scop, tree, &[12]);
}

#[test]
fn test_full_partial_coverage() {
    // N = 10, V = 4, tiles of 8: every instance runs exactly once, in the
    // full-tile branch iff its vector group lies inside the domain
    let scop = copy2d();
    let config = PipelineConfig {
        first_level: TilingLevel::new(true, 8),
        ..Default::default()
    };
    let result = optimize_scop(&scop, &config, None).unwrap();
    assert_eq!(
        result.decisions[0].action,
        BandAction::Standard {
            tiling: vec!["1st level tiling".to_string()],
            vectorized_member: Some(1),
            vector_width: Some(4),
        }
    );
    assert_eq!(sorted_instances(&result.schedule, &[10]), sorted_instances(&scop.schedule, &[10]));
    assert_preserves_dependences(&scop, &result.schedule, &[10]);

    let tree = &result.schedule;
    let full = tree.subtree(tree.root()).into_iter()
        .find_map(|id| match tree.kind(id) {
            Some(NodeKind::Filter(f @ Filter::Tiles(tiles))) if tiles.kind == TileKind::Full => Some(f.clone()),
            _ => None,
        })
        .expect("full tile filter");
    for i in 0..10 {
        for j in 0..10 {
            // j groups [0,3] and [4,7] are full, [8,9] are partial
            assert_eq!(full.admits(StmtId(0), &[i, j], &[10]), j < 8, "({}, {})", i, j);
        }
    }
}

#[test]
fn test_matcher_precision() {
    let scop = gemm(4);
    let band = ScheduleNode::root(scop.schedule.clone()).child(0).unwrap();
    assert!(is_matr_mult_pattern(&band, &scop));

    // a second write disqualifies
    let mut extra_write = scop.clone();
    extra_write.statements[0].accesses.push(MemoryAccess::write("D", AffineMap::projection(3, 0, &[0, 1])));
    assert!(!is_matr_mult_pattern(&band, &extra_write));

    // two-dimensional bands never match
    let flat = copy2d();
    let band = ScheduleNode::root(flat.schedule.clone()).child(0).unwrap();
    assert!(!is_matr_mult_pattern(&band, &flat));
}

#[test]
fn test_deterministic() {
    let scop = init_then_reduce(5);
    let config = PipelineConfig::for_locality();
    let first = optimize_scop(&scop, &config, None).unwrap();
    let second = optimize_scop(&scop, &config, None).unwrap();
    assert_eq!(first.schedule, second.schedule);
    assert_eq!(first.decisions, second.decisions);
    assert_eq!(first.schedule.pretty(), second.schedule.pretty());
}

#[test]
fn test_one_decision_per_band() {
    let config = PipelineConfig::default();
    for scop in [gemm(4), copy2d(), seidel(6), init_then_reduce(4)] {
        let mut bands = scop.schedule.bands();
        bands.sort();
        let mut optimizer = ScheduleTreeOptimizer::new(&scop, &config, None);
        optimizer.optimize_schedule(scop.schedule.clone()).unwrap();
        let mut seen: Vec<NodeId> = optimizer.decisions().iter().map(|d| d.node).collect();
        seen.sort();
        assert_eq!(seen, bands, "{}", scop.name);
    }
}

#[test]
fn test_unchanged_schedule_is_not_profitable() {
    let scop = copy2d();
    let result = optimize_scop(&scop, &PipelineConfig::no_tiling(), None).unwrap();
    assert!(!result.profitable);
    assert!(result.decisions.is_empty());
    assert_eq!(result.schedule, scop.schedule);
    assert!(!is_profitable_schedule(&scop, &scop.schedule));
}

#[test]
fn test_multi_statement_scop() {
    let scop = init_then_reduce(5);
    let result = optimize_scop(&scop, &PipelineConfig::for_locality(), None).unwrap();
    assert!(result.profitable);
    assert_eq!(result.decisions.len(), 2);
    assert!(result.decisions.iter().all(|d| d.statements.len() == 1));
    let action_of = |stmt: StmtId| {
        result.decisions.iter().find(|d| d.statements == vec![stmt]).map(|d| d.action.clone())
    };
    assert!(matches!(action_of(StmtId(0)), Some(BandAction::Standard { .. })));
    // the reduction writes C[i][j] last and reads with unit steps
    assert!(matches!(action_of(StmtId(1)), Some(BandAction::MatMul { .. })));
    assert_preserves_dependences(&scop, &result.schedule, &[]);
}

#[test]
fn test_carried_dependences_survive_tiling() {
    let scop = seidel(9);
    let config = PipelineConfig {
        first_level: TilingLevel::new(true, 4),
        ..Default::default()
    };
    let result = optimize_scop(&scop, &config, None).unwrap();
    assert_eq!(
        result.decisions[0].action,
        BandAction::Standard {
            tiling: vec!["1st level tiling".to_string()],
            vectorized_member: None,
            vector_width: None,
        }
    );
    assert_preserves_dependences(&scop, &result.schedule, &[]);
}

#[test]
fn test_non_permutable_band_untouched() {
    let mut scop = seidel(4);
    let band = scop.schedule.children(scop.schedule.root())[0];
    for member in &mut scop.schedule.band_mut(band).unwrap().members {
        member.permutable = false;
    }
    let result = optimize_scop(&scop, &PipelineConfig::default(), None).unwrap();
    assert_eq!(result.decisions[0].action, BandAction::NotTileable);
    assert!(!result.profitable);
    assert_eq!(result.schedule, scop.schedule);
}

#[test]
fn test_scop_json_round_trip_through_loader() {
    let scop = copy2d();
    let json = serde_json::to_string(&scop).unwrap();
    let loaded = schedopt::load_scop(&json).unwrap();
    assert_eq!(loaded, scop);
    let result = schedopt::optimize(&loaded, &PipelineConfig::default(), None).unwrap();
    let text = NamedTree::new(&result.schedule, &loaded).pretty();
    assert!(text.contains("SIMD"));
}
