#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing and validation may reject anything but must never panic. A config
    // that validates must also pass the core's own checks once converted.
    let Ok(cfg) = gate_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        let core = gate_core::GateCfg::from(&cfg);
        if let Err(e) = gate_core::builder::validate(&core) {
            panic!("validated config rejected by the core: {e}");
        }
    }
});
