use std::sync::Arc;

use pingora::services::{background::background_service, listening::Service};
use pingora_core::server::{configuration::Opt, Server};

use provisiond::{
    config::Config, logging, orchestration::ProvisioningOrchestrator, queue::QueueSubscriber,
    repository,
};

const QUEUE_SERVICE: &str = "provisiond queue";

fn main() {
    // Read command-line arguments
    let opt = Opt::parse_args();

    let config = match Config::load_yaml_with_opt_override(&opt) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    let log_sink = logging::init(config.log.as_ref());

    match repository::manager(&config.repository.provider) {
        Ok(manager) => log::info!("Repository provider: {}", manager.name()),
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    }

    log::info!(
        "Provisioning with runtime {} and failure policy {:?}",
        config.runtime.endpoint,
        config.provisioning.failure_policy
    );
    let orchestrator = Arc::new(ProvisioningOrchestrator::from_config(&config));
    let subscriber = QueueSubscriber::new(config.etcd.clone(), &config.queue, orchestrator);

    let mut server = Server::new_with_opt_and_conf(Some(opt), config.pingora);

    if let Some(sink) = log_sink {
        log::info!("Adding log sink service...");
        server.add_service(sink);
    }

    log::info!("Adding queue subscriber for {}...", config.queue.prefix);
    server.add_service(background_service(QUEUE_SERVICE, subscriber));

    if let Some(prometheus_cfg) = &config.prometheus {
        log::info!("Adding Prometheus HTTP...");
        let mut prometheus_service_http = Service::prometheus_http_service();
        prometheus_service_http.add_tcp(&prometheus_cfg.address.to_string());
        server.add_service(prometheus_service_http);
    }

    log::info!("Bootstrapping...");
    server.bootstrap();

    log::info!("Starting Server...");
    server.run_forever();
}
