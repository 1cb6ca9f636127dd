mod command;
mod config;
mod device;
mod listener;
mod metrics;
mod settings;
mod transport;

use command::CommandExecutor;
use config::{FirmwareConfig, StorageBackend};
use device::{SimulatedActuator, SimulatedSensors};
use listener::{ListenerTimeouts, RequestListener};
use metrics::MetricsExporter;
use settings::{FilePersistence, MemoryPersistence, SettingsPersistence, SettingsStore};
use std::sync::Arc;
use transport::TcpTransportListener;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let (config, origin) = FirmwareConfig::load_or_default();

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    origin.log();

    info!("Incubator controller starting: unit {}", config.unit.id);

    let persistence: Arc<dyn SettingsPersistence> = match config.storage.backend {
        StorageBackend::File => {
            info!("  Settings directory: {}", config.storage.settings_dir.display());
            Arc::new(FilePersistence::new(&config.storage.settings_dir))
        }
        StorageBackend::Memory => {
            warn!("  Settings are kept in memory and lost on restart");
            Arc::new(MemoryPersistence::new())
        }
    };

    let settings = Arc::new(SettingsStore::new(
        config.unit.id,
        persistence,
        config.storage.write_timeout(),
    ));
    let active = settings.load().await;
    info!(
        "  Network identity: ip={} mask={} mac={}",
        active.ip_address, active.subnet_mask, active.mac_address
    );

    let actuator = Arc::new(SimulatedActuator::new());
    let sensors = Arc::new(SimulatedSensors::new(settings.reader()));
    let metrics = Arc::new(MetricsExporter::new()?);
    let executor = Arc::new(CommandExecutor::new(actuator, sensors, settings, metrics));

    let transport = TcpTransportListener::bind(config.network.listen_address).await?;
    let timeouts = ListenerTimeouts {
        read: config.network.read_timeout(),
        request: config.network.request_timeout(),
        write: config.network.write_timeout(),
    };
    let listener = RequestListener::new(transport, executor, timeouts);

    tokio::select! {
        result = listener.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    Ok(())
}
