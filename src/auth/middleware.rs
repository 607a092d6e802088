use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::AppError;
use crate::model::role::Role;
use crate::models::TokenType;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::Internal("App config missing".to_string()))?;

    let verified = bearer_token(&req).and_then(|token| {
        verify_token(token, &config.jwt_secret)
            .map_err(|e| AppError::Unauthorized(format!("Invalid or expired token: {e}")))
    });

    let claims = match verified {
        Ok(c) => c,
        Err(e) => return Ok(req.into_response(e.error_response())),
    };

    if claims.token_type != TokenType::Access {
        let e = AppError::Unauthorized("Access token required".to_string());
        return Ok(req.into_response(e.error_response()));
    }

    let role = match Role::from_id(claims.role) {
        Some(role) => role,
        None => {
            let e = AppError::Unauthorized("Invalid role".to_string());
            return Ok(req.into_response(e.error_response()));
        }
    };

    let auth_user = AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        employee_id: claims.employee_id,
    };

    tracing::debug!(user_id = auth_user.user_id, role = ?auth_user.role, "Authenticated request");
    req.extensions_mut().insert(auth_user);

    next.call(req).await
}

fn bearer_token(req: &ServiceRequest) -> Result<&str, AppError> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header encoding".to_string()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| {
            AppError::Unauthorized("Authorization header must start with Bearer".to_string())
        })
}
