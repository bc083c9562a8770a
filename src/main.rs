//! hdmi-display - HDMI display manager for Linux DRM
//!
//! Probes the configured HDMI displays, binds each to its DRM connector,
//! and keeps connection state and mode lists current as sinks come and go.

use anyhow::{bail, Result};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use hdmi_display::config::{self, Config};
use hdmi_display::constants::EVENT_LOOP_SLEEP_MS;
use hdmi_display::display::attach;
use hdmi_display::hw::drm::{Device, DrmControllerProvider};
use hdmi_display::{
    Connector, ConnectorId, ConnectorStatus, DisplayRegistry, EncoderId, HdmiDisplay,
    HotplugEvent,
};

/// Shutdown requested via signal (SIGTERM/SIGINT/SIGHUP)
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Handles SIGTERM (systemd stop), SIGINT (Ctrl+C), and SIGHUP (terminal hangup).
fn setup_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGTERM,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGINT,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGHUP,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
    }
}

extern "C" fn shutdown_signal_handler(_signo: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

fn print_help() {
    println!(
        r#"hdmi-display {} - HDMI display manager for Linux DRM

USAGE:
    hdmi-display [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    -c, --config PATH       Use this config file
    -d, --device PATH       DRM device (overrides drm.device)
    --once                  Probe, print modes and exit
    --dump                  Print per-display state and exit

EXAMPLES:
    hdmi-display                        Run as a daemon
    hdmi-display --once                 List modes of connected sinks
    RUST_LOG=debug hdmi-display --dump  Inspect display state

CONFIG FILE:
    $HDMI_DISPLAY_CONFIG
    ~/.config/hdmi-display/config.toml
    /etc/hdmi-display/config.toml
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Value following `short`/`long` on the command line
fn arg_value(args: &[String], short: &str, long: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == short || a == long) else {
        return Ok(None);
    };
    match args.get(pos + 1) {
        Some(v) if !v.starts_with('-') => Ok(Some(v.clone())),
        _ => bail!("{} needs a value", long),
    }
}

/// A display bound to its DRM connector
struct Output {
    display: Arc<HdmiDisplay>,
    connector: Connector,
}

impl Output {
    /// Re-run detection and mode probing, then report the result
    fn refresh(&mut self, force: bool) {
        let status = self.display.connector_detect(&mut self.connector, force);
        let count = self.display.connector_get_modes(&mut self.connector);
        info!(
            "{}: {:?}, {} modes",
            self.display.name(),
            status,
            count
        );
        for mode in &self.connector.probed_modes {
            let verdict = self.display.mode_valid(&self.connector, mode);
            debug!("{}:   {} -> {}", self.display.name(), mode, verdict);
        }
    }

    fn print_summary(&self) {
        let status = match self.connector.status {
            ConnectorStatus::Connected => "connected",
            ConnectorStatus::Disconnected => "disconnected",
            ConnectorStatus::Unknown => "unknown",
        };
        println!(
            "{} ({}): {}, {} modes",
            self.display.name(),
            self.display.display_type().as_str(),
            status,
            self.connector.probed_modes.len()
        );
        for mode in &self.connector.probed_modes {
            let verdict = self.display.mode_valid(&self.connector, mode);
            println!(
                "  {}{} {}",
                mode,
                if mode.is_preferred() { " *" } else { "" },
                verdict
            );
        }
    }
}

/// Registry plus the outputs brought up from it
struct Session {
    registry: DisplayRegistry,
    outputs: Vec<Output>,
    events: Receiver<HotplugEvent>,
}

impl Session {
    fn start(cfg: &Config, provider: &Arc<DrmControllerProvider>) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut registry = DisplayRegistry::new(provider.clone(), cfg.hpd.clone())
            .with_debug_dir(cfg.debug_dir())
            .with_events(tx);
        registry.probe_all(&cfg.displays);

        let mut outputs = Vec::new();
        for display in registry.displays(registry.num_of_displays()) {
            let entry_ctrl = display.hdmi_ctrl_idx();
            let Some((connector_id, encoder_id)) = provider.object_ids(entry_ctrl) else {
                warn!(
                    "{}: no DRM connector for controller {}",
                    display.name(),
                    entry_ctrl
                );
                continue;
            };
            match attach(
                display.as_ref(),
                ConnectorId(connector_id),
                EncoderId(encoder_id),
            ) {
                Ok(connector) => {
                    let mut output = Output { display, connector };
                    output.refresh(true);
                    outputs.push(output);
                }
                Err(e) => warn!("{}: bring-up failed: {} ({})", display.name(), e, e.errno()),
            }
        }

        info!(
            "{} of {} displays active",
            outputs.len(),
            registry.num_of_displays()
        );
        Self {
            registry,
            outputs,
            events: rx,
        }
    }

    /// Handle pending hot-plug events
    fn process_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            let Some(output) = self
                .outputs
                .iter_mut()
                .find(|o| o.display.name() == event.display)
            else {
                continue;
            };
            info!(
                "{}: hotplug {}",
                event.display,
                if event.connected { "connect" } else { "disconnect" }
            );
            output.refresh(false);
        }
    }

    /// Kick the HPD work of displays a uevent concerns
    #[cfg(target_os = "linux")]
    fn handle_uevent(&self, uevent: &hdmi_display::hw::hotplug::DrmUevent) {
        for output in &self.outputs {
            if uevent.affects(output.connector.id.0) {
                output.display.hpd_irq();
            }
        }
    }

    fn shutdown(mut self) {
        for output in &mut self.outputs {
            if let Err(e) = output.display.connector_pre_deinit(&mut output.connector) {
                debug!("{}: {}", output.display.name(), e);
            }
        }
        let names: Vec<String> = self
            .registry
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        for name in names {
            if let Err(e) = self.registry.remove(&name) {
                warn!("{}", e);
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();

    // --help
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // --version
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("hdmi-display {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    info!("hdmi-display starting...");

    let config_arg = arg_value(&args, "-c", "--config")?;
    let device_arg = arg_value(&args, "-d", "--device")?;
    let once = args.iter().any(|a| a == "--once");
    let dump = args.iter().any(|a| a == "--dump");

    let config_path: Option<PathBuf> = match &config_arg {
        Some(p) => Some(PathBuf::from(p)),
        None => Config::config_path(),
    };
    let load = |path: &Option<PathBuf>| -> Result<Config> {
        match (&config_arg, path) {
            (Some(_), Some(p)) => Config::load_from_file(p),
            _ => Ok(Config::load()),
        }
    };
    let mut cfg = load(&config_path)?;
    if let Some(device) = &device_arg {
        cfg.drm.device = device.clone();
    }

    setup_signal_handlers();

    let device = Arc::new(Device::open(&cfg.drm.device)?);
    let provider = Arc::new(DrmControllerProvider::new(device));
    if provider.is_empty() {
        warn!("{} has no HDMI connectors", cfg.drm.device);
    }

    let mut session = Session::start(&cfg, &provider);

    if once || dump {
        for output in &session.outputs {
            if dump {
                println!("[{}]", output.display.name());
                print!("{}", output.display.dump_info());
                match provider.kernel_modes(output.display.hdmi_ctrl_idx()) {
                    Ok(modes) => {
                        println!("kernel_modes = {}", modes.len());
                        for mode in &modes {
                            println!("  {}", mode);
                        }
                    }
                    Err(e) => debug!("{}: {:#}", output.display.name(), e),
                }
            } else {
                output.print_summary();
            }
        }
        session.shutdown();
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    let mut hotplug_monitor = match hdmi_display::hw::hotplug::HotplugMonitor::new() {
        Ok(m) => Some(m),
        Err(e) => {
            info!("Hotplug monitor unavailable, relying on HPD polling: {:#}", e);
            None
        }
    };

    #[cfg(target_os = "linux")]
    let config_watcher = match &config_path {
        Some(path) => match config::ConfigWatcher::new(path) {
            Ok(w) => Some(w),
            Err(e) => {
                info!("Config watcher unavailable: {:#}", e);
                None
            }
        },
        None => None,
    };

    // Notify systemd that we're ready
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);
    info!("Event loop started");

    loop {
        if shutdown_requested() {
            info!("Shutdown requested, stopping...");
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            break;
        }

        #[cfg(target_os = "linux")]
        if let Some(ref mut monitor) = hotplug_monitor {
            for uevent in monitor.poll() {
                session.handle_uevent(&uevent);
            }
        }

        session.process_events();

        // Config hot-reload (Linux only)
        #[cfg(target_os = "linux")]
        if let Some(ref watcher) = config_watcher {
            if watcher.check_reload() {
                info!("Config file change detected, reloading...");
                match load(&config_path) {
                    Ok(mut new_cfg) => {
                        if let Some(device) = &device_arg {
                            new_cfg.drm.device = device.clone();
                        }
                        session.shutdown();
                        session = Session::start(&new_cfg, &provider);
                        cfg = new_cfg;
                        info!("Config reload complete ({} displays)", cfg.displays.len());
                    }
                    Err(e) => warn!("Keeping previous config: {:#}", e),
                }
            }
        }

        std::thread::sleep(Duration::from_millis(EVENT_LOOP_SLEEP_MS));
    }

    session.shutdown();
    info!("hdmi-display stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_arg_value() {
        let a = args(&["hdmi-display", "--config", "/tmp/c.toml", "--once"]);
        assert_eq!(
            arg_value(&a, "-c", "--config").unwrap().as_deref(),
            Some("/tmp/c.toml")
        );
        assert_eq!(arg_value(&a, "-d", "--device").unwrap(), None);

        let missing = args(&["hdmi-display", "--device", "--once"]);
        assert!(arg_value(&missing, "-d", "--device").is_err());
    }
}
