mod common;

use sky_bridge::{load_bridge_config_from_env, BridgeConfig};

#[test]
fn env_config_overrides_builtin_values() {
    common::ensure_test_config();
    let config = load_bridge_config_from_env();
    assert_eq!(config.remote.base_url, "http://127.0.0.1:18090");
    assert_eq!(config.remote.poll_interval_ms, 20);
    assert_eq!(config.remote.delta_failure_threshold, 2);
    assert_eq!(config.site.name, "Test Site");
    assert_eq!(config.site.north_angle_deg, 90.0);
    assert!(!config.snapshot.watch);

    let builtin = BridgeConfig::builtin();
    assert_eq!(config.remote.api_prefix, builtin.remote.api_prefix);
    assert_eq!(config.skybox_script, builtin.skybox_script);
}
