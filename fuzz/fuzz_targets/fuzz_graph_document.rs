#![no_main]

use blockphase_core::{BlockGraph, compile};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Any graph that loads must compile or fail cleanly, and compile the
    // same way twice.
    if let Ok(graph) = BlockGraph::from_text(text) {
        let first = compile(&graph);
        assert_eq!(first, compile(&graph));
    }
});
