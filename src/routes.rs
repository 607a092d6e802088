use crate::{
    api::{advance_deduction, attendance_type, client_type, salary_slip, supervisor_site},
    auth::middleware::auth_middleware,
    config::Config,
    error::AppError,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{HttpResponse, middleware::from_fn, web};

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let burst = requests_per_min.max(1);
        let per_ms = 60_000 / burst as u64;
        let cfg = GovernorConfigBuilder::default()
            .milliseconds_per_request(per_ms.max(1))
            .burst_size(burst)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .expect("burst size and period are non-zero");
        Governor::new(&cfg)
    }

    let protected_limiter = build_limiter(config.rate_protected_per_min);

    // Public routes
    cfg.route("/health", web::get().to(health));

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .app_data(query_config())
            .app_data(json_config())
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::resource("/advance-deductions")
                    .route(web::get().to(advance_deduction::query_advance_deductions))
                    .route(web::post().to(advance_deduction::command_advance_deductions)),
            )
            .service(
                web::resource("/attendance-types")
                    .route(web::get().to(attendance_type::query_attendance_types))
                    .route(web::post().to(attendance_type::command_attendance_types)),
            )
            .service(
                web::resource("/client-types")
                    .route(web::get().to(client_type::query_client_types)),
            )
            .service(
                web::resource("/salary-slips")
                    .route(web::get().to(salary_slip::query_salary_slips)),
            )
            .service(
                web::resource("/supervisor-sites")
                    .route(web::get().to(supervisor_site::query_supervisor_sites))
                    .route(web::post().to(supervisor_site::command_supervisor_sites)),
            ),
    );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "success": true, "status": "ok" }))
}

/// Malformed query strings get the same envelope as any other validation failure.
fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}
