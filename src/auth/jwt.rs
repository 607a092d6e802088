use crate::models::Claims;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::Error};

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Signs an access token the way the auth service does.
#[cfg(test)]
pub fn issue_access_token(
    user_id: u64,
    role: crate::model::role::Role,
    secret: &str,
) -> String {
    use crate::models::TokenType;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    let claims = Claims {
        user_id,
        sub: format!("user{user_id}"),
        role: role.id(),
        exp: now + 900,
        jti: uuid::Uuid::new_v4().to_string(),
        token_type: TokenType::Access,
        employee_id: None,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
