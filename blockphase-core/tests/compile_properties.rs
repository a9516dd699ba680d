use blockphase_core::block::RESERVED_WORDS;
use blockphase_core::{Block, BlockGraph, BlockId, Literal, Port, compile};
use proptest::prelude::*;

/// Appends `calls` as a chain of one-argument actions after `after`,
/// returning the last block of the chain.
fn chain(graph: &mut BlockGraph, mut after: BlockId, from_port: Port, calls: &[(String, i64)]) -> BlockId {
    let mut port = from_port;
    for (name, arg) in calls {
        let action = graph.add_block(Block::action(name.clone(), 1)).unwrap();
        let literal = graph.add_block(Block::literal(Literal::Int(*arg))).unwrap();
        graph.connect(after, port, action, Port::FlowIn).unwrap();
        graph.connect(literal, Port::Out, action, Port::Arg(0)).unwrap();
        after = action;
        port = Port::Next;
    }
    after
}

fn calls() -> impl Strategy<Value = Vec<(String, i64)>> {
    let name = "[a-z][a-zA-Z0-9]{0,8}"
        .prop_filter("reserved word", |n| !RESERVED_WORDS.contains(&n.as_str()));
    prop::collection::vec((name, any::<i64>()), 0..12)
}

proptest! {
    #[test]
    fn straight_line_emits_one_statement_per_action(calls in calls()) {
        let mut graph = BlockGraph::new("line");
        let source = graph.source();
        chain(&mut graph, source, Port::Next, &calls);

        let text = compile(&graph).unwrap();
        let expected: String = calls
            .iter()
            .map(|(name, arg)| format!("{name}({arg})\n"))
            .collect();
        prop_assert_eq!(text, expected);
    }

    #[test]
    fn compile_is_deterministic_across_persistence(calls in calls()) {
        let mut graph = BlockGraph::new("persisted");
        let source = graph.source();
        chain(&mut graph, source, Port::Next, &calls);

        let reloaded = BlockGraph::from_text(&graph.to_text().unwrap()).unwrap();
        prop_assert_eq!(&reloaded, &graph);
        prop_assert_eq!(compile(&graph).unwrap(), compile(&graph).unwrap());
        prop_assert_eq!(compile(&reloaded).unwrap(), compile(&graph).unwrap());
    }

    #[test]
    fn branch_paths_are_indented_under_if(
        then_calls in calls(),
        else_calls in calls(),
    ) {
        let mut graph = BlockGraph::new("branch");
        let source = graph.source();
        let branch = graph.add_block(Block::branch()).unwrap();
        let flag = graph.add_block(Block::variable("flag")).unwrap();
        graph.connect(source, Port::Next, branch, Port::FlowIn).unwrap();
        graph.connect(flag, Port::Out, branch, Port::Condition).unwrap();
        chain(&mut graph, branch, Port::Then, &then_calls);
        chain(&mut graph, branch, Port::Else, &else_calls);

        let text = compile(&graph).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        prop_assert_eq!(lines[0], "if (flag) {");
        prop_assert_eq!(*lines.last().unwrap(), "}");
        let else_lines = if else_calls.is_empty() { 0 } else { else_calls.len() + 1 };
        prop_assert_eq!(lines.len(), 2 + then_calls.len() + else_lines);
        for line in &lines[1..=then_calls.len()] {
            prop_assert!(line.starts_with("    "));
        }
    }

    #[test]
    fn shared_producer_renders_identically(uses in 1_usize..8) {
        let mut graph = BlockGraph::new("shared");
        let source = graph.source();
        let sum = graph.add_block(Block::binary(blockphase_core::BinaryOp::Add)).unwrap();
        let a = graph.add_block(Block::variable("a")).unwrap();
        let b = graph.add_block(Block::literal(Literal::Int(1))).unwrap();
        graph.connect(a, Port::Out, sum, Port::Arg(0)).unwrap();
        graph.connect(b, Port::Out, sum, Port::Arg(1)).unwrap();

        let mut after = source;
        for i in 0..uses {
            let assign = graph.add_block(Block::assign(format!("v{i}"))).unwrap();
            graph.connect(after, Port::Next, assign, Port::FlowIn).unwrap();
            graph.connect(sum, Port::Out, assign, Port::Arg(0)).unwrap();
            after = assign;
        }

        let text = compile(&graph).unwrap();
        prop_assert_eq!(text.lines().count(), uses);
        for (i, line) in text.lines().enumerate() {
            prop_assert_eq!(line.to_string(), format!("v{i} = (a + 1)"));
        }
    }
}
