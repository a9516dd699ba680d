#![no_main]

use std::path::Path;

use blockphase::config::MachineLoader;
use blockphase::phase::PhaseDb;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut loader = MachineLoader::with_defaults();
    // A machine that passes validation must also build.
    if let Ok(loaded) = loader.load_str(text, Path::new("fuzz.yaml")) {
        assert!(PhaseDb::from_config(&loaded.config).is_ok());
    }
});
