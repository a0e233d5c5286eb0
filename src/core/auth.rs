//! Bearer-token access control.
//!
//! The `AccessController` decides, per request, whether a caller may reach
//! the resolved route: unprotected paths pass through untouched, protected
//! paths require a verified HS256 bearer token, and admin paths additionally
//! require the `admin` role. It is a pure decision function over the token
//! and the configured route sets; header injection happens later in the
//! forwarder.
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::core::error::GatewayError;

/// Claims the gateway understands inside a bearer token.
///
/// `sub` is the user id. `role` is optional and defaults to `"user"` when
/// the issuing service omitted it. `exp` is validated by the JWT library.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

/// The authenticated principal for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub username: Option<String>,
    pub role: String,
    pub token_expiry: usize,
}

impl CallerIdentity {
    /// Whether this caller holds the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Route-set driven authorization over bearer tokens.
pub struct AccessController {
    decoding_key: DecodingKey,
    validation: Validation,
    protected_prefixes: Vec<String>,
    admin_prefixes: Vec<String>,
}

impl AccessController {
    /// Create a controller verifying HS256 tokens against `secret`.
    pub fn new(secret: &str, protected_prefixes: Vec<String>, admin_prefixes: Vec<String>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            protected_prefixes,
            admin_prefixes,
        }
    }

    /// Whether the path requires any authentication at all.
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }

    /// Whether the path is gated on the admin role.
    pub fn is_admin_route(&self, path: &str) -> bool {
        self.admin_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }

    /// Authorize a request to `path` given an optional bearer token.
    ///
    /// Returns `Ok(None)` for unprotected paths — a token presented there is
    /// ignored and no identity flows downstream. For protected or admin
    /// paths the token must verify; admin paths additionally require the
    /// caller's role to equal `"admin"`.
    pub fn authorize(
        &self,
        path: &str,
        bearer_token: Option<&str>,
    ) -> Result<Option<CallerIdentity>, GatewayError> {
        let protected = self.is_protected(path);
        let admin = self.is_admin_route(path);

        if !protected && !admin {
            return Ok(None);
        }

        let token = bearer_token.ok_or(GatewayError::AuthenticationRequired)?;
        let identity = self.verify_token(token)?;

        if admin && !identity.is_admin() {
            return Err(GatewayError::InsufficientRole);
        }

        Ok(Some(identity))
    }

    /// Verify a raw token string and build the caller identity.
    pub fn verify_token(&self, token: &str) -> Result<CallerIdentity, GatewayError> {
        let data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|err| {
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "token expired".to_string(),
                    ErrorKind::InvalidSignature => "signature mismatch".to_string(),
                    other => format!("{other:?}"),
                };
                tracing::debug!("Bearer token rejected: {reason}");
                GatewayError::InvalidToken { reason }
            })?;

        let claims = data.claims;
        Ok(CallerIdentity {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role.unwrap_or_else(|| "user".to_string()),
            token_expiry: claims.exp,
        })
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    const SECRET: &str = "portico-test-secret";

    fn controller() -> AccessController {
        AccessController::new(
            SECRET,
            vec![
                "/api/v1/orders".to_string(),
                "/api/v1/users/profile".to_string(),
            ],
            vec!["/api/v1/admin".to_string()],
        )
    }

    fn token(role: Option<&str>, exp_offset_secs: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset_secs) as usize;
        let claims = Claims {
            sub: "u-1".to_string(),
            username: Some("alice".to_string()),
            email: None,
            role: role.map(str::to_string),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_unprotected_path_needs_no_token() {
        let controller = controller();
        let identity = controller.authorize("/api/v1/products", None).unwrap();
        assert!(identity.is_none());
    }

    #[test]
    fn test_token_on_unprotected_path_is_ignored() {
        let controller = controller();
        let token = token(Some("admin"), 3600);
        let identity = controller
            .authorize("/api/v1/products", Some(&token))
            .unwrap();
        assert!(identity.is_none());
    }

    #[test]
    fn test_protected_path_without_token_is_rejected() {
        let controller = controller();
        let err = controller.authorize("/api/v1/orders", None).unwrap_err();
        assert!(matches!(err, GatewayError::AuthenticationRequired));
    }

    #[test]
    fn test_protected_path_with_valid_token() {
        let controller = controller();
        let token = token(Some("user"), 3600);
        let identity = controller
            .authorize("/api/v1/orders/7", Some(&token))
            .unwrap()
            .expect("identity expected on protected path");
        assert_eq!(identity.user_id, "u-1");
        assert_eq!(identity.role, "user");
    }

    #[test]
    fn test_missing_role_defaults_to_user() {
        let controller = controller();
        let token = token(None, 3600);
        let identity = controller
            .authorize("/api/v1/orders", Some(&token))
            .unwrap()
            .unwrap();
        assert_eq!(identity.role, "user");
        assert!(!identity.is_admin());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let controller = controller();
        let token = token(Some("user"), -3600);
        let err = controller
            .authorize("/api/v1/orders", Some(&token))
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidToken { .. }));
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let controller = controller();
        let other_key = EncodingKey::from_secret(b"some-other-secret");
        let claims = Claims {
            sub: "u-1".to_string(),
            username: None,
            email: None,
            role: Some("admin".to_string()),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let forged = encode(&Header::default(), &claims, &other_key).unwrap();
        let err = controller
            .authorize("/api/v1/admin/metrics", Some(&forged))
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidToken { .. }));
    }

    #[test]
    fn test_admin_route_rejects_plain_user() {
        let controller = controller();
        let token = token(Some("user"), 3600);
        let err = controller
            .authorize("/api/v1/admin/metrics", Some(&token))
            .unwrap_err();
        assert!(matches!(err, GatewayError::InsufficientRole));
    }

    #[test]
    fn test_admin_route_accepts_admin() {
        let controller = controller();
        let token = token(Some("admin"), 3600);
        let identity = controller
            .authorize("/api/v1/admin/metrics", Some(&token))
            .unwrap()
            .unwrap();
        assert!(identity.is_admin());
    }
}
