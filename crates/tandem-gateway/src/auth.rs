use jsonwebtoken::{DecodingKey, Validation, decode};

use tandem_types::api::Claims;

/// Validate a handshake token and return its claims.
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
