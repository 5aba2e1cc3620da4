use clap::Parser;
use log::{error, info};
use scanlink::configuration::config::{CommandLine, Config};
use scanlink::controller::controller_handler::Controller;
use scanlink::web_interface::web_server::WebServer;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    info!("scanlink v{}", env!("CARGO_PKG_VERSION"));
    info!("Importing configuration");

    let cli = CommandLine::parse();

    let config = Config::load(&cli).unwrap_or_else(|e| {
        error!("Unable to import configuration: {}", e);
        std::process::exit(1);
    });

    info!("Configuration imported successfully");

    let controller = Controller::new(config.clone()).unwrap_or_else(|e| {
        error!("Unable to create a controller instance: {}, exiting...", e);
        std::process::exit(1);
    });

    if config.api.enabled {
        let server = WebServer::new(controller.handle(), &config.api).unwrap_or_else(|e| {
            error!("Unable to start the operator API: {}, exiting...", e);
            std::process::exit(1);
        });
        tokio::spawn(server.start());
    } else {
        info!("Operator API disabled");
    }

    let result = tokio::spawn(async move {
        info!("Spawning the controller");
        controller.run().await
    });

    match result.await {
        Ok(Ok(())) => info!("Bye"),
        Ok(Err(e)) => {
            error!("Error occured in the controller process: {}, exiting...", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Error joining at the end of execution: {:?}", e);
            std::process::exit(1);
        }
    }
}
