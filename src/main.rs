use std::sync::Arc;

use thumbnail_server::collaborator::{self, PassthroughThumbnailer};
use thumbnail_server::config::{Config, DEFAULT_CONFIG_PATH};
use thumbnail_server::http::HttpBus;
use thumbnail_server::logger;
use thumbnail_server::server::{self, Server, ServerOptions};
use thumbnail_server::shutdown::{ShutdownCoordinator, ShutdownGate};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Worker threads default to the number of CPU cores
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    let options = ServerOptions::from_config(&cfg)?;

    let gate = Arc::new(ShutdownGate::new());
    let bus = Arc::new(HttpBus::new());
    collaborator::register_all(&bus, &cfg, &gate, PassthroughThumbnailer);

    let server = Server::start(options, bus)?;
    logger::log_server_start(&server.local_addr(), &cfg);

    server::start_signal_handler(Arc::clone(&gate))?;

    let coordinator = ShutdownCoordinator::new(gate);
    coordinator.run(&server).await;
    Ok(())
}
