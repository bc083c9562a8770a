//! Registry behavior with HDMI support compiled out
//!
//! Run with `--no-default-features`.

#![cfg(not(feature = "hdmi"))]

mod common;

use common::{plugged_tv, ScriptedProvider};
use hdmi_display::config::Config;
use hdmi_display::DisplayRegistry;

#[test]
fn nothing_is_registered() {
    let config = Config::default();
    let provider = ScriptedProvider::new(vec![plugged_tv()]);
    let mut registry = DisplayRegistry::from_config(&config, provider);
    assert_eq!(registry.num_of_displays(), 0);
    assert!(registry.displays(8).is_empty());
    assert!(registry.probe(&config.displays[0]).unwrap().is_none());
}
