//! Request identity and permission gates.
//!
//! Sign-in itself lives elsewhere: an external service issues HS256 tokens
//! carrying the user's claims and drops them in a cookie. This module only
//! decodes that token into an [`Identity`] attached to every request, and
//! lets page handlers demand a [`Permission`] before doing anything else.
//! Tokens must carry `exp`; anything undecodable is treated as anonymous.

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, Request, header};
use axum::{middleware, response::Response};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::config::AUTH_COOKIE_NAME;
use crate::error::AppError;

pub struct AuthConfig {
    decoding_key: DecodingKey,
    validation: Validation,
    pub disabled: bool,
}

impl AuthConfig {
    pub fn new(secret: &[u8], disabled: bool) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            disabled,
        }
    }

    fn decode_claims(&self, token: &str) -> Option<Map<String, Value>> {
        match decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                debug!(error = %err, "rejected session token");
                None
            }
        }
    }
}

/// Who is making the request, as far as the token says.
#[derive(Clone, Debug, Default)]
pub struct Identity {
    pub signed_in: bool,
    pub claims: Map<String, Value>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The `sub` claim, for page headers; empty when anonymous.
    pub fn display_name(&self) -> &str {
        self.claims
            .get("sub")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn claim_is_true(&self, name: &str) -> bool {
        self.claims
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// The closed set of checks pages can demand.
#[derive(Clone, Copy, Debug)]
pub enum Permission {
    SignedIn,
    Admin,
}

impl Permission {
    pub fn granted(self, identity: &Identity) -> bool {
        match self {
            Permission::SignedIn => identity.signed_in,
            Permission::Admin => identity.signed_in && identity.claim_is_true("admin"),
        }
    }
}

/// Gate called at the top of every page handler, before any filesystem
/// access. Anonymous users are redirected to sign in; signed-in users
/// missing the claim get a 403.
pub fn require(
    identity: &Identity,
    permission: Permission,
    sign_in_url: &str,
) -> Result<(), AppError> {
    if !identity.signed_in {
        return Err(AppError::Unauthorized {
            sign_in_url: sign_in_url.to_string(),
        });
    }
    if !permission.granted(identity) {
        return Err(AppError::Forbidden("missing permission".into()));
    }
    Ok(())
}

/// Middleware that decodes the session token (cookie or bearer header) and
/// attaches the resulting [`Identity`] to the request. Never rejects by
/// itself; enforcement happens per page.
pub async fn attach_identity(
    Extension(auth): Extension<Arc<AuthConfig>>,
    jar: CookieJar,
    mut req: Request<AxumBody>,
    next: middleware::Next,
) -> Response {
    let identity = identify(&auth, &jar, req.headers());
    req.extensions_mut().insert(identity);
    next.run(req).await
}

fn identify(auth: &AuthConfig, jar: &CookieJar, headers: &HeaderMap) -> Identity {
    if auth.disabled {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), Value::String("dev".to_string()));
        claims.insert("admin".to_string(), Value::Bool(true));
        return Identity {
            signed_in: true,
            claims,
        };
    }

    let token = jar
        .get(AUTH_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| bearer_token(headers));
    let Some(token) = token else {
        return Identity::anonymous();
    };

    match auth.decode_claims(&token) {
        Some(claims) => Identity {
            signed_in: true,
            claims,
        },
        None => Identity::anonymous(),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, Identity, Permission, identify, require};
    use crate::config::AUTH_COOKIE_NAME;
    use crate::error::AppError;
    use axum::http::{HeaderMap, HeaderValue, header};
    use axum_extra::extract::CookieJar;
    use axum_extra::extract::cookie::Cookie;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};

    const SECRET: &[u8] = b"test-secret";

    fn token(claims: Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .expect("encode token")
    }

    fn auth() -> AuthConfig {
        AuthConfig::new(SECRET, false)
    }

    fn identity_with(claims: Value) -> Identity {
        let Value::Object(claims) = claims else {
            panic!("claims must be an object");
        };
        Identity {
            signed_in: true,
            claims,
        }
    }

    #[test]
    fn cookie_token_yields_signed_in_identity() {
        let token = token(json!({"sub": "ines", "admin": true, "exp": 4102444800u64}));
        let jar = CookieJar::new().add(Cookie::new(AUTH_COOKIE_NAME, token));

        let identity = identify(&auth(), &jar, &HeaderMap::new());
        assert!(identity.signed_in);
        assert_eq!(identity.display_name(), "ines");
        assert!(Permission::Admin.granted(&identity));
    }

    #[test]
    fn bearer_header_is_accepted() {
        let token = token(json!({"sub": "ines", "exp": 4102444800u64}));
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );

        let identity = identify(&auth(), &CookieJar::new(), &headers);
        assert!(identity.signed_in);
    }

    #[test]
    fn garbage_and_expired_tokens_are_anonymous() {
        let jar = CookieJar::new().add(Cookie::new(AUTH_COOKIE_NAME, "not.a.token"));
        assert!(!identify(&auth(), &jar, &HeaderMap::new()).signed_in);

        let expired = token(json!({"sub": "ines", "exp": 1000000000u64}));
        let jar = CookieJar::new().add(Cookie::new(AUTH_COOKIE_NAME, expired));
        assert!(!identify(&auth(), &jar, &HeaderMap::new()).signed_in);
    }

    #[test]
    fn wrong_secret_is_anonymous() {
        let forged = encode(
            &Header::default(),
            &json!({"sub": "mallory", "admin": true, "exp": 4102444800u64}),
            &EncodingKey::from_secret(b"other-secret"),
        )
        .expect("encode");
        let jar = CookieJar::new().add(Cookie::new(AUTH_COOKIE_NAME, forged));
        assert!(!identify(&auth(), &jar, &HeaderMap::new()).signed_in);
    }

    #[test]
    fn disabled_auth_grants_admin() {
        let auth = AuthConfig::new(SECRET, true);
        let identity = identify(&auth, &CookieJar::new(), &HeaderMap::new());
        assert!(identity.signed_in);
        assert!(Permission::Admin.granted(&identity));
    }

    #[test]
    fn require_redirects_anonymous_and_forbids_non_admin() {
        let anonymous = Identity::anonymous();
        let result = require(&anonymous, Permission::SignedIn, "/user/signin");
        assert!(matches!(result, Err(AppError::Unauthorized { .. })));

        let plain = identity_with(json!({"sub": "ines"}));
        assert!(require(&plain, Permission::SignedIn, "/user/signin").is_ok());
        let result = require(&plain, Permission::Admin, "/user/signin");
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let not_quite = identity_with(json!({"sub": "ines", "admin": "yes"}));
        let result = require(&not_quite, Permission::Admin, "/user/signin");
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let admin = identity_with(json!({"sub": "ines", "admin": true}));
        assert!(require(&admin, Permission::Admin, "/user/signin").is_ok());
    }

    #[test]
    fn anonymous_identity_reads_cleanly() {
        let identity = Identity::anonymous();
        assert_eq!(identity.display_name(), "");
        assert!(!Permission::SignedIn.granted(&identity));
    }
}
