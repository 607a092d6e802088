use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::json;

/// `{"success": true, "data": ...}`
pub fn success<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "data": data
    }))
}

pub fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(json!({
        "success": true,
        "data": data
    }))
}

pub fn message(text: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": text
    }))
}
