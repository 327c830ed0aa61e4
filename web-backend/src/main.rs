use actix_cors::Cors;
use actix_files::Files;
use actix_web::{middleware::DefaultHeaders, web, App, HttpServer};
use anyhow::Result;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod state;

use api::configure_routes;
use config::AppConfig;
use state::AppState;

#[actix_web::main]
async fn main() -> Result<()> {
    // .env 文件可选
    dotenv::dotenv().ok();

    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "scanrelay_web=debug,scanrelay_core=debug,actix_web=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 配置只在启动时读取一次
    let config = AppConfig::from_env()?;
    let state = AppState::new(&config)?;

    let static_dir = config.static_dir.clone();
    tracing::info!(
        "ScanRelay listening on {}:{} (default analyzer: {})",
        config.host,
        config.port,
        config.analyzer
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("Referrer-Policy", "no-referrer")),
            )
            // API 路由
            .configure(configure_routes)
            // 静态页面
            .service(Files::new("/", static_dir.clone()).index_file("index.html"))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
