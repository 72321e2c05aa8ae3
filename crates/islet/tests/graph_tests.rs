// Script construction tests: ordering, structural validation
//
// Kernels are never invoked here, so every operation carries an unset kernel.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use islet::{DataTag, ErrorKind, ExecutionScript, Graph, KernelUnit, Meta, NodeId, Operand};
    use islet_core::Error;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn op(g: &mut Graph, name: &str, reads: &[NodeId], writes: &[NodeId]) -> NodeId {
        let operands = reads.iter().map(|&r| Operand::from(r)).collect();
        g.add_op(name, KernelUnit::unset(name), operands, writes.to_vec())
    }

    /// Every data operand is an input or was produced by an earlier entry.
    fn assert_topological(script: &ExecutionScript) {
        let mut ready: HashSet<usize> = script
            .data()
            .iter()
            .enumerate()
            .filter(|(_, d)| d.tag == DataTag::Input)
            .map(|(slot, _)| slot)
            .collect();
        for entry in script.entries() {
            for arg in &entry.args {
                if let islet::exec::ArgRef::Slot(slot) = arg {
                    assert!(
                        ready.contains(slot),
                        "'{}' reads '{}' before it is produced",
                        entry.name,
                        script.data()[*slot].name
                    );
                }
            }
            ready.extend(entry.outputs.iter().copied());
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ordering
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn test_random_dags_are_ordered() {
        let mut rng = StdRng::seed_from_u64(0x15_1e7);
        for _ in 0..50 {
            let mut g = Graph::new();
            let mut nodes = Vec::new();
            let mut pool = Vec::new();
            for i in 0..rng.gen_range(1..4) {
                let id = g.input(format!("in{i}"), Meta::Empty);
                nodes.push(id);
                pool.push(id);
            }
            let n_ops = rng.gen_range(1..20);
            for i in 0..n_ops {
                let tag = if i + 1 == n_ops {
                    DataTag::Output
                } else {
                    DataTag::Internal
                };
                let out = g.add_data(format!("d{i}"), tag, Meta::Empty);
                let k = rng.gen_range(1..=pool.len().min(3));
                let reads: Vec<NodeId> = pool.choose_multiple(&mut rng, k).copied().collect();
                let id = op(&mut g, &format!("op{i}"), &reads, &[out]);
                nodes.extend([out, id]);
                pool.push(out);
            }
            nodes.shuffle(&mut rng);

            let script = ExecutionScript::build(&g, &nodes).unwrap();
            assert_eq!(script.len(), n_ops);
            assert_topological(&script);

            let again = ExecutionScript::build(&g, &nodes).unwrap();
            assert_eq!(script.order(), again.order());
        }
    }

    #[test]
    fn test_ties_follow_node_list_order() {
        let mut g = Graph::new();
        let src = g.input("src", Meta::Empty);
        let outs: Vec<NodeId> = (0..3)
            .map(|i| g.output(format!("out{i}"), Meta::Empty))
            .collect();
        let a = op(&mut g, "a", &[src], &[outs[0]]);
        let b = op(&mut g, "b", &[src], &[outs[1]]);
        let c = op(&mut g, "c", &[src], &[outs[2]]);

        let mut nodes = vec![src];
        nodes.extend(&outs);
        nodes.extend([c, a, b]);
        let script = ExecutionScript::build(&g, &nodes).unwrap();
        assert_eq!(script.order(), vec![c, a, b]);
    }

    #[test]
    fn test_dependencies_override_list_order() {
        let mut g = Graph::new();
        let src = g.input("src", Meta::Empty);
        let mid = g.internal("mid", Meta::Empty);
        let dst = g.output("dst", Meta::Empty);
        let side = g.output("side", Meta::Empty);
        let consumer = op(&mut g, "consumer", &[mid], &[dst]);
        let producer = op(&mut g, "producer", &[src], &[mid]);
        let other = op(&mut g, "other", &[src], &[side]);

        let nodes = [src, mid, dst, side, consumer, other, producer];
        let script = ExecutionScript::build(&g, &nodes).unwrap();
        // consumer is listed first but must wait; once producer runs it is
        // the lowest ready position again.
        assert_eq!(script.order(), vec![other, producer, consumer]);
    }

    #[test]
    fn test_slots_and_constants() {
        let mut g = Graph::new();
        let src = g.input("src", Meta::Scalar);
        let dst = g.output("dst", Meta::Scalar);
        let id = g.add_op(
            "scale",
            KernelUnit::unset("scale"),
            vec![src.into(), Operand::constant(2.5f64)],
            vec![dst],
        );
        let script = ExecutionScript::build(&g, &[dst, id, src]).unwrap();
        assert_eq!(script.slot(dst), Some(0));
        assert_eq!(script.slot(src), Some(1));
        assert_eq!(script.slot(id), None);

        let entry = &script.entries()[0];
        assert_eq!(entry.outputs, vec![0]);
        assert_eq!(entry.out_metas, vec![Meta::Scalar]);
        match &entry.args[1] {
            islet::exec::ArgRef::Const(c) => {
                assert_eq!(c.value().downcast_ref::<f64>(), Some(&2.5));
            }
            other => panic!("expected a constant, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_island() {
        let script = ExecutionScript::build(&Graph::new(), &[]).unwrap();
        assert!(script.is_empty());
        assert!(script.data().is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Structural errors
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn test_cycle_detected() {
        let mut g = Graph::new();
        let d1 = g.internal("d1", Meta::Empty);
        let d2 = g.internal("d2", Meta::Empty);
        let first = op(&mut g, "first", &[d2], &[d1]);
        let second = op(&mut g, "second", &[d1], &[d2]);

        let err = ExecutionScript::build(&g, &[d1, d2, first, second]).unwrap_err();
        assert!(matches!(err, Error::Cycle(_)));
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn test_self_loop_detected() {
        let mut g = Graph::new();
        let d = g.internal("d", Meta::Empty);
        let id = op(&mut g, "loop", &[d], &[d]);
        let err = ExecutionScript::build(&g, &[d, id]).unwrap_err();
        assert!(matches!(err, Error::Cycle(ref name) if name == "loop"));
    }

    #[test]
    fn test_dangling_references() {
        let mut g = Graph::new();
        let src = g.input("src", Meta::Empty);
        let dst = g.output("dst", Meta::Empty);
        let id = op(&mut g, "copy", &[src], &[dst]);

        // src is outside the island.
        let err = ExecutionScript::build(&g, &[dst, id]).unwrap_err();
        assert!(matches!(
            err,
            Error::DanglingNode { ref node, target } if node == "copy" && target == src.0
        ));
        assert_eq!(err.kind(), ErrorKind::Structural);

        // An id the graph never handed out.
        let err = ExecutionScript::build(&g, &[src, dst, id, NodeId(42)]).unwrap_err();
        assert!(matches!(err, Error::DanglingNode { target: 42, .. }));
    }

    #[test]
    fn test_producer_rules() {
        let mut g = Graph::new();
        let src = g.input("src", Meta::Empty);
        let mid = g.internal("mid", Meta::Empty);
        let dst = g.output("dst", Meta::Empty);
        let to_mid = op(&mut g, "to_mid", &[src], &[mid]);
        let to_dst = op(&mut g, "to_dst", &[mid], &[dst]);
        let also_dst = op(&mut g, "also_dst", &[src], &[dst]);
        let to_src = op(&mut g, "to_src", &[mid], &[src]);

        let cases: [(&[NodeId], &str); 4] = [
            (&[src, mid, dst, to_mid, to_dst, also_dst], "dst"),
            (&[src, mid, dst, to_mid, to_dst, to_src], "src"),
            (&[src, mid, dst, to_dst], "mid"),
            (&[src, mid, dst, to_mid], "dst"),
        ];
        for (nodes, culprit) in cases {
            let err = ExecutionScript::build(&g, nodes).unwrap_err();
            assert!(
                matches!(err, Error::Producer { ref node, .. } if node == culprit),
                "expected producer error on '{culprit}', got {err}"
            );
            assert_eq!(err.kind(), ErrorKind::Structural);
        }
    }

    #[test]
    fn test_node_listed_twice() {
        let mut g = Graph::new();
        let src = g.input("src", Meta::Empty);
        let dst = g.output("dst", Meta::Empty);
        let id = op(&mut g, "copy", &[src], &[dst]);

        for nodes in [[src, dst, id, src], [src, dst, id, id]] {
            let err = ExecutionScript::build(&g, &nodes).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
    }
}
