use normalmaker::gpu::CpuBackend;
use normalmaker::layers::LayerStore;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add,
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Add), (0usize..12).prop_map(Op::Remove)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Size equals successful adds minus successful removes, and survivors
    /// keep their relative order.
    #[test]
    fn add_remove_preserves_order(ops in prop::collection::vec(op(), 0..40)) {
        let mut store = LayerStore::new(Box::new(CpuBackend::new()));
        let mut model: Vec<String> = Vec::new();
        let mut next = 0u32;

        for op in ops {
            match op {
                Op::Add => {
                    let index = store.add_blank(1, 1).unwrap();
                    let name = format!("L{next}");
                    next += 1;
                    store.layer_mut(index).unwrap().name = name.clone();
                    model.push(name);
                }
                Op::Remove(i) => {
                    let removed = store.remove_at(i);
                    if i < model.len() {
                        prop_assert_eq!(removed.map(|l| l.name), Some(model.remove(i)));
                    } else {
                        prop_assert!(removed.is_none());
                    }
                }
            }
        }

        let names: Vec<String> = store.layers().iter().map(|l| l.name.clone()).collect();
        prop_assert_eq!(names, model);
    }
}
