// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use log::info;

use tryon::AppState;
use tryon::config::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting try-on service...");

    // Fail before binding if the environment is incomplete.
    let config = Config::from_env()?;
    let bind_addr = config.bind_addr.clone();
    if config.is_mock() {
        info!(
            "Mock mode enabled; serving {}",
            config.mock_image_path.display()
        );
    }

    let app_state = AppState::from_config(config);

    info!("Starting HTTP server on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(tryon::configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
