//! Model-based property tests: random operation sequences are replayed
//! against a set-backed reference model and the engine must agree with it
//! after every step.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use filament::{AdjacencyList, EdgeType, NodeId, TypeFilter, Word};

#[derive(Debug, Clone)]
enum Operation {
    AddNode,
    AddEdge { from: usize, to: usize, ty: u32 },
    RemoveEdge { from: usize, to: usize, ty: u32 },
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        2 => Just(Operation::AddNode),
        5 => (0usize..16, 0usize..16, 1u32..=4).prop_map(|(from, to, ty)| {
            Operation::AddEdge { from, to, ty }
        }),
        3 => (0usize..16, 0usize..16, 1u32..=4).prop_map(|(from, to, ty)| {
            Operation::RemoveEdge { from, to, ty }
        }),
    ]
}

/// Replays `ops` against both the engine and a `HashSet` model, checking
/// the headline accounting invariants after every operation. Returns the
/// engine and the model's live-edge set.
fn replay<W: Word>(
    ops: &[Operation],
) -> (AdjacencyList<W>, HashSet<(u32, u32, u32)>) {
    let mut graph = AdjacencyList::<W>::new();
    let mut nodes: Vec<NodeId> = vec![graph.add_node().expect("node")];
    let mut live: HashSet<(u32, u32, u32)> = HashSet::new();

    for op in ops {
        match *op {
            Operation::AddNode => {
                nodes.push(graph.add_node().expect("node"));
            }
            Operation::AddEdge { from, to, ty } => {
                let from = nodes[from % nodes.len()];
                let to = nodes[to % nodes.len()];
                let inserted = graph.add_edge(from, to, EdgeType(ty)).expect("add_edge");
                assert_eq!(inserted, live.insert((from.0, to.0, ty)));
            }
            Operation::RemoveEdge { from, to, ty } => {
                let from = nodes[from % nodes.len()];
                let to = nodes[to % nodes.len()];
                let removed = graph.remove_edge(from, to, EdgeType(ty)).expect("remove_edge");
                assert_eq!(removed, live.remove(&(from.0, to.0, ty)));
            }
        }
        assert_eq!(graph.edge_count(), live.len());
        assert_eq!(graph.node_count() as usize, nodes.len());
    }
    (graph, live)
}

proptest! {
    #[test]
    fn counts_track_any_operation_sequence(ops in prop::collection::vec(arb_operation(), 1..200)) {
        let (graph, live) = replay::<u32>(&ops);

        let enumerated: HashSet<(u32, u32, u32)> = graph
            .all_edges()
            .map(|edge| (edge.from.0, edge.to.0, edge.ty.0))
            .collect();
        prop_assert_eq!(enumerated.len(), graph.edge_count());
        prop_assert_eq!(enumerated, live);
        graph.verify().expect("verify");
    }

    #[test]
    fn has_edge_agrees_with_liveness(ops in prop::collection::vec(arb_operation(), 1..150)) {
        let (graph, live) = replay::<u32>(&ops);

        for from in 0..graph.node_count() {
            for to in 0..graph.node_count() {
                for ty in 1u32..=4 {
                    prop_assert_eq!(
                        graph.has_edge(NodeId(from), NodeId(to), EdgeType(ty)),
                        live.contains(&(from, to, ty))
                    );
                }
                prop_assert_eq!(
                    graph.has_edge(NodeId(from), NodeId(to), TypeFilter::All),
                    (1u32..=4).any(|ty| live.contains(&(from, to, ty)))
                );
            }
        }
    }

    #[test]
    fn connected_from_matches_has_edge(ops in prop::collection::vec(arb_operation(), 1..150)) {
        let (graph, live) = replay::<u32>(&ops);

        for from in 0..graph.node_count() {
            for ty in 1u32..=4 {
                let connected = graph.get_node_ids_connected_from(NodeId(from), EdgeType(ty));
                // No duplicates.
                let as_set: HashSet<NodeId> = connected.iter().copied().collect();
                prop_assert_eq!(as_set.len(), connected.len());
                // Exactly the targets the model knows about.
                let expected: HashSet<NodeId> = live
                    .iter()
                    .filter(|&&(f, _, t)| f == from && t == ty)
                    .map(|&(_, to, _)| NodeId(to))
                    .collect();
                prop_assert_eq!(as_set, expected);
            }
        }
    }

    #[test]
    fn connected_to_matches_the_model(ops in prop::collection::vec(arb_operation(), 1..150)) {
        let (graph, live) = replay::<u32>(&ops);

        for to in 0..graph.node_count() {
            let connected = graph.get_node_ids_connected_to(NodeId(to), TypeFilter::All);
            let as_set: HashSet<NodeId> = connected.iter().copied().collect();
            prop_assert_eq!(as_set.len(), connected.len());
            let expected: HashSet<NodeId> = live
                .iter()
                .filter(|&&(_, t, _)| t == to)
                .map(|&(from, _, _)| NodeId(from))
                .collect();
            prop_assert_eq!(as_set, expected);
        }
    }

    #[test]
    fn inbound_entries_match_the_model(ops in prop::collection::vec(arb_operation(), 1..120)) {
        let (graph, live) = replay::<u32>(&ops);

        for to in 0..graph.node_count() {
            let mut counted: HashMap<(u32, u32), usize> = HashMap::new();
            for entry in graph.get_inbound_edges_by_type(NodeId(to)) {
                *counted.entry((entry.from.0, entry.ty.0)).or_insert(0) += 1;
            }
            // One entry per live (from, ty) edge into `to`, no repeats.
            let expected: HashSet<(u32, u32)> = live
                .iter()
                .filter(|&&(_, t, _)| t == to)
                .map(|&(from, _, ty)| (from, ty))
                .collect();
            prop_assert_eq!(counted.len(), expected.len());
            for (key, count) in counted {
                prop_assert_eq!(count, 1);
                prop_assert!(expected.contains(&key));
            }
            prop_assert_eq!(
                graph.has_inbound_edges(NodeId(to)),
                !expected.is_empty()
            );
        }
    }

    #[test]
    fn snapshot_round_trip_is_lossless(ops in prop::collection::vec(arb_operation(), 1..150)) {
        let (graph, _) = replay::<u32>(&ops);

        let bytes = graph.to_bytes();
        let copy = AdjacencyList::<u32>::deserialize(graph.serialize()).expect("deserialize");
        prop_assert_eq!(copy.to_bytes(), bytes.clone());

        let reparsed = AdjacencyList::<u32>::from_bytes(&bytes).expect("from_bytes");
        prop_assert_eq!(reparsed.edge_count(), graph.edge_count());
        prop_assert_eq!(
            reparsed.all_edges().collect::<Vec<_>>(),
            graph.all_edges().collect::<Vec<_>>()
        );
    }

    #[test]
    fn add_then_remove_returns_to_the_same_live_set(
        ops in prop::collection::vec(arb_operation(), 1..100),
        from in 0u32..8,
        to in 0u32..8,
        ty in 1u32..=4,
    ) {
        let (mut graph, live) = replay::<u32>(&ops);
        prop_assume!(from < graph.node_count() && to < graph.node_count());
        let triple = (from, to, ty);
        let present = live.contains(&triple);
        let from = NodeId(from);
        let to = NodeId(to);
        let ty = EdgeType(ty);

        // Double add: second call is a no-op.
        prop_assert_eq!(graph.add_edge(from, to, ty).expect("add"), !present);
        prop_assert!(!graph.add_edge(from, to, ty).expect("add"));
        // Double remove: second call is a no-op.
        prop_assert!(graph.remove_edge(from, to, ty).expect("remove"));
        prop_assert!(!graph.remove_edge(from, to, ty).expect("remove"));
        prop_assert_eq!(graph.edge_count(), live.len() - usize::from(present));
        graph.verify().expect("verify");
    }

    #[test]
    fn narrow_widths_agree_with_u32(ops in prop::collection::vec(arb_operation(), 1..40)) {
        // Small op counts keep every width inside its capacity ceiling.
        let mut bounded = Vec::new();
        let mut nodes = 1usize;
        let mut edges = 0usize;
        for op in ops {
            match op {
                Operation::AddNode if nodes < 8 => {
                    nodes += 1;
                    bounded.push(op);
                }
                Operation::AddNode => {}
                Operation::AddEdge { .. } if edges < 12 => {
                    edges += 1;
                    bounded.push(op);
                }
                Operation::AddEdge { .. } => {}
                Operation::RemoveEdge { .. } => bounded.push(op),
            }
        }
        prop_assume!(!bounded.is_empty());

        let (narrow, narrow_live) = replay::<u8>(&bounded);
        let (medium, medium_live) = replay::<u16>(&bounded);
        let (wide, wide_live) = replay::<u32>(&bounded);

        prop_assert_eq!(&narrow_live, &wide_live);
        prop_assert_eq!(&medium_live, &wide_live);
        prop_assert_eq!(narrow.edge_count(), wide.edge_count());
        for from in 0..wide.node_count() {
            prop_assert_eq!(
                narrow.get_node_ids_connected_from(NodeId(from), TypeFilter::All),
                wide.get_node_ids_connected_from(NodeId(from), TypeFilter::All)
            );
            prop_assert_eq!(
                medium.get_node_ids_connected_from(NodeId(from), TypeFilter::All),
                wide.get_node_ids_connected_from(NodeId(from), TypeFilter::All)
            );
        }
        narrow.verify().expect("verify");
        medium.verify().expect("verify");
        wide.verify().expect("verify");
    }
}
