#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(profile) = grinder_config::load_toml(text) {
            let _ = profile.validate();
        }
    }
});
