//! Debug output
//!
//! Each display gets `<debug dir>/<name>/` holding `dump_info` (state
//! summary) and `edid` (raw sink EDID, empty when none). Files are
//! rewritten whenever the state they describe changes.

use log::debug;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::DisplayState;
use crate::edid::HdrOutputMetadata;

/// Create the per-display debug directory
pub(crate) fn create_root(base: &Path, name: &str) -> io::Result<PathBuf> {
    let root = base.join(name);
    fs::create_dir_all(&root)?;
    Ok(root)
}

/// State summary
pub(crate) fn dump_info(name: &str, st: &DisplayState) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "name = {}", name);
    let _ = writeln!(out, "display_type = {}", st.info.display_type.as_str());
    let _ = writeln!(out, "hdmi_ctrl_idx = {}", st.ctrl.hdmi_ctrl_idx);
    let _ = writeln!(out, "initialized = {}", st.ctrl.ctrl.is_some());
    let _ = writeln!(
        out,
        "encoder = {}",
        st.encoder.map_or("none".to_string(), |e| e.0.to_string())
    );
    let _ = writeln!(
        out,
        "connector = {}",
        st.connector.map_or("none".to_string(), |c| c.0.to_string())
    );
    let _ = writeln!(out, "hot_pluggable = {}", st.info.is_hot_pluggable);
    let _ = writeln!(out, "connected = {}", st.connected);
    let _ = writeln!(out, "tpg = {}", st.is_tpg_enabled);
    let _ = writeln!(out, "size_mm = {}x{}", st.info.width_mm, st.info.height_mm);
    let _ = writeln!(out, "num_of_modes = {}", st.mode_list.len());
    for m in &st.mode_list {
        let _ = writeln!(out, "  {}", m);
    }

    match &st.edid {
        Some(edid) => {
            let _ = writeln!(
                out,
                "sink = {} {:04x} \"{}\"",
                edid.manufacturer,
                edid.product_code,
                edid.monitor_name.as_deref().unwrap_or("")
            );
            let _ = writeln!(out, "sink_hdmi = {}", edid.is_hdmi());
            let _ = writeln!(out, "sink_audio = {}", edid.supports_audio());
            if let Some(khz) = edid.max_tmds_clock_khz() {
                let _ = writeln!(out, "sink_max_tmds_khz = {}", khz);
            }
            match HdrOutputMetadata::for_sink(&edid.hdr) {
                Some(meta) => {
                    let _ = writeln!(
                        out,
                        "sink_hdr = {:?}, max_cll = {}",
                        meta.eotf(),
                        meta.hdmi_type1.max_cll
                    );
                }
                None => {
                    let _ = writeln!(out, "sink_hdr = none");
                }
            }
        }
        None => {
            let _ = writeln!(out, "sink = none");
        }
    }
    out
}

/// Rewrite the debug files; no-op without a debug directory
pub(crate) fn refresh(name: &str, st: &DisplayState) {
    let Some(root) = &st.root else {
        return;
    };
    if let Err(e) = write_files(root, name, st) {
        debug!("{}: debug files not updated: {}", name, e);
    }
}

fn write_files(root: &Path, name: &str, st: &DisplayState) -> io::Result<()> {
    fs::write(root.join("dump_info"), dump_info(name, st))?;
    let edid = st.edid.as_ref().map(|e| e.raw()).unwrap_or(&[]);
    fs::write(root.join("edid"), edid)
}
