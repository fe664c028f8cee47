#![no_main]

use automate_me::manifest::Manifest;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(manifest) = Manifest::parse(data) {
        assert!(!manifest.id().is_empty());
        for task in &manifest.tasks {
            assert!(!task.name.is_empty());
            assert!(!task.title.is_empty());
        }
    }
});
