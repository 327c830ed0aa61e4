use actix_web::{error, web, HttpResponse, Responder};
use serde::Serialize;

use crate::state::AppState;

pub mod scan;
pub mod upload;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let response = scan::query_error_response(&err);
        error::InternalError::from_response(err, response).into()
    }))
    .route("/file", web::post().to(scan::scan_file))
    .route("/health", web::get().to(health_check))
    .route("/analyzers", web::get().to(list_analyzers));
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Serialize)]
struct AnalyzerList<'a> {
    default: Option<&'a str>,
    analyzers: Vec<&'a str>,
}

async fn list_analyzers(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(AnalyzerList {
        default: state.registry.default_name(),
        analyzers: state.registry.names(),
    })
}
