use anyhow::Context;
use gear_vr_bridge::domain::models::ConnectionStatus;
use gear_vr_bridge::domain::settings::SettingsService;
use gear_vr_bridge::infrastructure::bluetooth::replay::{self, ReplayTransport};
use gear_vr_bridge::infrastructure::bluetooth::scanner::{BondedDevice, StaticDirectory};
use gear_vr_bridge::infrastructure::bluetooth::BluetoothService;
use gear_vr_bridge::infrastructure::logging;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut settings_service = SettingsService::new()?;
    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)?;
    info!("Starting Gear VR Bridge");
    info!("Settings file: {}", settings_service.path().display());

    let frames = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => replay::load_capture(&path).context("Failed to load capture")?,
        None => replay::demo_frames(),
    };

    let directory = Arc::new(StaticDirectory::new(vec![BondedDevice::new(
        Some(replay::REPLAY_DEVICE_NAME),
        replay::REPLAY_DEVICE_ADDRESS,
    )]));
    let (handle, task) = BluetoothService::spawn(settings_service.get(), directory, |sink| {
        ReplayTransport::new(frames, sink)
    });

    let devices = handle.list_paired_devices();
    let last = settings_service.get().last_connected_address.clone();
    let device = devices
        .iter()
        .find(|d| Some(&d.address) == last.as_ref())
        .or_else(|| devices.first())
        .cloned();

    match device {
        Some(device) => {
            info!("Connecting to {} ({})", device.name, device.address);
            handle.connect(device);
        }
        None => warn!("No paired Gear VR Controller found"),
    }

    let mut status = handle.subscribe_status();
    let mut snapshots = handle.subscribe_snapshot();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                info!("Status: {:?}", current);
                if current == ConnectionStatus::Connected {
                    if let Some(device) = handle.current_handle() {
                        let saved = settings_service.set_last_connected_address(&device.address);
                        if let Err(e) = saved {
                            error!("Failed to save settings: {}", e);
                        }
                    }
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = *snapshots.borrow_and_update();
                info!(
                    "trigger={} home={} back={} vol+={} vol-={} pad={} touch={:?} moving={}",
                    snapshot.trigger_button,
                    snapshot.home_button,
                    snapshot.back_button,
                    snapshot.volume_up_button,
                    snapshot.volume_down_button,
                    snapshot.touchpad_button,
                    snapshot.touchpad_direction(),
                    snapshot.is_moving,
                );
            }
        }
    }

    handle.shutdown();
    task.await?;
    info!("Gear VR Bridge stopped");
    Ok(())
}
