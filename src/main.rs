use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};

use employee_directory::config::Config;
use employee_directory::db;
use employee_directory::handlers;
use employee_directory::sync::Synchronizer;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|err| {
        error!("{}", err);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
    })?;

    let store = db::open_store(&config).await.map_err(|err| {
        error!("Failed to open the employee store: {}", err);
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    })?;

    let sync = web::Data::new(Synchronizer::start(store).await);
    info!(
        "Starting server at {} ({} backend, live updates {})",
        config.bind_addr,
        config.backend,
        if sync.is_live() { "on" } else { "off" }
    );

    let app_sync = sync.clone();
    let result = HttpServer::new(move || {
        App::new()
            .app_data(app_sync.clone())
            .configure(handlers::employee::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await;

    sync.shutdown();
    result
}
