//! OAuth2 bearer token checks for the MCP server.
//!
//! Tokens are JWTs signed by the issuer. The signature is verified against
//! the issuer's JWKS (fetched over HTTP and cached for a configurable TTL),
//! then the claims are checked for expiry, issuer, audience and scopes.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Signing algorithms accepted from the issuer. Symmetric algorithms are
/// refused so a public JWK can never be used as an HMAC secret.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256, Algorithm::ES256];

const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth2 settings for the MCP server.
#[derive(Debug, Clone, Default)]
pub struct OAuth2Config {
    pub enabled: bool,
    pub issuer_url: String,
    pub audience: String,
    pub jwks_url: String,
    pub jwks_cache_ttl: Duration,
    pub required_scopes: Vec<String>,
    pub validate_exp: bool,
    pub validate_aud: bool,
    pub validate_iss: bool,
}

impl OAuth2Config {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token is not a JWT")]
    Malformed,

    #[error("Token missing key ID (kid)")]
    MissingKeyId,

    #[error("No key found for kid: {0}")]
    UnknownKey(String),

    #[error("Token algorithm {0} is not accepted")]
    UnsupportedAlgorithm(String),

    #[error("Token signature is invalid")]
    Signature,

    #[error("Failed to fetch JWKS: {0}")]
    Jwks(String),

    #[error("Token claims could not be decoded: {0}")]
    Claims(String),

    #[error("Token has expired")]
    Expired,

    #[error("Token is missing the exp claim")]
    MissingExpiry,

    #[error("Token issuer '{0}' is not trusted")]
    Issuer(String),

    #[error("Token audience does not include '{0}'")]
    Audience(String),

    #[error("Token is missing required scope '{0}'")]
    Scope(String),
}

/// Subset of JWT claims the server cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    pub iss: Option<String>,
    pub aud: Option<JsonValue>,
    pub exp: Option<i64>,
    pub scope: Option<String>,
    pub scp: Option<Vec<String>>,
}

impl Claims {
    fn has_audience(&self, expected: &str) -> bool {
        match &self.aud {
            Some(JsonValue::String(aud)) => aud == expected,
            Some(JsonValue::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(expected)),
            _ => false,
        }
    }

    fn scopes(&self) -> Vec<&str> {
        let mut scopes: Vec<&str> = self
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default();
        if let Some(scp) = &self.scp {
            scopes.extend(scp.iter().map(String::as_str));
        }
        scopes
    }
}

/// Verify the token signature with the JWK named by its `kid` header and
/// return the decoded claims. Claim values are not checked here.
pub fn verify_signature(token: &str, jwks: &JwkSet) -> Result<Claims, TokenError> {
    let header = jsonwebtoken::decode_header(token).map_err(|_| TokenError::Malformed)?;
    if !ALLOWED_ALGORITHMS.contains(&header.alg) {
        return Err(TokenError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
    }

    let kid = header.kid.ok_or(TokenError::MissingKeyId)?;
    let jwk = jwks
        .find(&kid)
        .ok_or_else(|| TokenError::UnknownKey(kid.clone()))?;
    let key = DecodingKey::from_jwk(jwk).map_err(|e| TokenError::Jwks(e.to_string()))?;

    // exp, aud and iss are checked by check_claims so each check can be toggled.
    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::Json(_) | ErrorKind::Utf8(_) => TokenError::Claims(e.to_string()),
            _ => TokenError::Signature,
        })
}

/// Check verified claims against the configured expiry, issuer, audience
/// and scope rules.
pub fn check_claims(config: &OAuth2Config, claims: &Claims, now: i64) -> Result<(), TokenError> {
    if config.validate_exp {
        match claims.exp {
            Some(exp) if exp <= now => return Err(TokenError::Expired),
            Some(_) => {}
            None => return Err(TokenError::MissingExpiry),
        }
    }

    if config.validate_iss {
        let iss = claims.iss.as_deref().unwrap_or_default();
        if iss.trim_end_matches('/') != config.issuer_url.trim_end_matches('/') {
            return Err(TokenError::Issuer(iss.to_string()));
        }
    }

    if config.validate_aud && !claims.has_audience(&config.audience) {
        return Err(TokenError::Audience(config.audience.clone()));
    }

    let granted = claims.scopes();
    if let Some(missing) = config
        .required_scopes
        .iter()
        .find(|s| !granted.contains(&s.as_str()))
    {
        return Err(TokenError::Scope(missing.clone()));
    }

    Ok(())
}

struct CachedJwks {
    fetched_at: Instant,
    keys: Arc<JwkSet>,
}

/// JWKS fetched from the issuer and reused until the TTL lapses.
pub struct JwksCache {
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    cached: RwLock<Option<CachedJwks>>,
}

impl JwksCache {
    pub fn new(client: reqwest::Client, url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Cached key set, fetched first if missing or stale.
    pub async fn get(&self) -> Result<Arc<JwkSet>, TokenError> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.keys.clone());
            }
        }
        self.refresh().await
    }

    /// Fetch the key set regardless of the cache.
    pub async fn refresh(&self) -> Result<Arc<JwkSet>, TokenError> {
        let keys = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| TokenError::Jwks(e.to_string()))?
            .json::<JwkSet>()
            .await
            .map_err(|e| TokenError::Jwks(e.to_string()))?;

        let keys = Arc::new(keys);
        info!(url = %self.url, keys = keys.keys.len(), "JWKS refreshed");
        *self.cached.write().await = Some(CachedJwks {
            fetched_at: Instant::now(),
            keys: keys.clone(),
        });
        Ok(keys)
    }
}

/// Verifies bearer tokens for one OAuth2 configuration.
pub struct TokenValidator {
    config: OAuth2Config,
    jwks: JwksCache,
}

impl TokenValidator {
    pub fn new(config: OAuth2Config, client: reqwest::Client) -> Self {
        let jwks = JwksCache::new(client, config.jwks_url.clone(), config.jwks_cache_ttl);
        Self { config, jwks }
    }

    /// Build a validator with its own HTTP client for JWKS fetches.
    pub fn from_config(config: OAuth2Config) -> Result<Self, TokenError> {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Jwks(e.to_string()))?;
        Ok(Self::new(config, client))
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Verify the signature, then the claims.
    ///
    /// An unknown `kid` forces one JWKS refresh before giving up, so keys
    /// rotated by the issuer are picked up without waiting for the TTL.
    pub async fn validate(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let keys = self.jwks.get().await?;
        let claims = match verify_signature(token, &keys) {
            Err(TokenError::UnknownKey(kid)) => {
                debug!(kid = %kid, "Unknown signing key, refreshing JWKS");
                let keys = self.jwks.refresh().await?;
                verify_signature(token, &keys)?
            }
            other => other?,
        };
        check_claims(&self.config, &claims, now)?;
        Ok(claims)
    }
}

/// Authentication middleware for HTTP requests.
pub async fn auth_middleware(
    State(validator): State<Arc<TokenValidator>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !validator.is_enabled() {
        return next.run(request).await;
    }

    let token = match extract_bearer_token(&request) {
        Ok(Some(token)) => token,
        Ok(None) => {
            warn!("Authentication failed: missing Authorization header");
            return unauthorized_response(
                "Missing Bearer token in Authorization header",
                "Include an OAuth2 access token: 'Authorization: Bearer <token>'",
            );
        }
        Err(msg) => {
            warn!("Authentication failed: invalid header format");
            return unauthorized_response(msg, "Use the format: 'Authorization: Bearer <token>'");
        }
    };

    match validator.validate(token, chrono::Utc::now().timestamp()).await {
        Ok(claims) => {
            debug!(subject = ?claims.sub, "Token accepted");
            next.run(request).await
        }
        Err(e) => {
            warn!(reason = %e, "Authentication failed");
            unauthorized_response(
                e.to_string(),
                "Request a fresh token from the configured issuer with the required scopes",
            )
        }
    }
}

fn extract_bearer_token(request: &Request<Body>) -> Result<Option<&str>, &'static str> {
    let Some(auth_header) = request.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Authorization header contains invalid characters")?;

    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err("Invalid Authorization header format. Expected 'Bearer <token>'");
    };

    if token.is_empty() {
        return Err("Bearer token is empty");
    }

    Ok(Some(token))
}

fn unauthorized_response(message: impl Into<String>, suggestion: impl Into<String>) -> Response {
    #[derive(Serialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }
    #[derive(Serialize)]
    struct ErrorDetail {
        code: &'static str,
        message: String,
        suggestion: String,
    }

    let body = ErrorResponse {
        error: ErrorDetail {
            code: "unauthorized",
            message: message.into(),
            suggestion: suggestion.into(),
        },
    };
    let json = serde_json::to_string(&body).unwrap_or_else(|_| {
        r#"{"error":{"code":"unauthorized","message":"Authentication failed"}}"#.to_string()
    });

    (
        StatusCode::UNAUTHORIZED,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::WWW_AUTHENTICATE, "Bearer"),
        ],
        json,
    )
        .into_response()
}


#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW: i64 = 1_700_000_000;
    const KID: &str = "osler-test-key";
    const PRIVATE_KEY: &str = include_str!("../tests/fixtures/jwt_rsa_private.pem");
    const JWKS: &str = include_str!("../tests/fixtures/jwks.json");

    fn config() -> OAuth2Config {
        OAuth2Config {
            enabled: true,
            issuer_url: "https://auth.example.com".to_string(),
            audience: "osler-api".to_string(),
            jwks_url: "https://auth.example.com/.well-known/jwks.json".to_string(),
            jwks_cache_ttl: Duration::from_secs(3600),
            required_scopes: vec!["read:mimic-data".to_string()],
            validate_exp: true,
            validate_aud: true,
            validate_iss: true,
        }
    }

    fn jwks() -> JwkSet {
        serde_json::from_str(JWKS).unwrap()
    }

    fn sign(claims: &JsonValue, kid: Option<&str>) -> String {
        let header = Header {
            kid: kid.map(String::from),
            ..Header::new(Algorithm::RS256)
        };
        let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, claims, &key).unwrap()
    }

    fn good_claims() -> JsonValue {
        json!({
            "sub": "analyst-1",
            "iss": "https://auth.example.com/",
            "aud": ["osler-api", "other"],
            "exp": NOW + 300,
            "scope": "openid read:mimic-data"
        })
    }

    fn claims(value: JsonValue) -> Claims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_signed_token_accepted() {
        let token = sign(&good_claims(), Some(KID));
        let claims = verify_signature(&token, &jwks()).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("analyst-1"));
        check_claims(&config(), &claims, NOW).unwrap();
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let token = sign(&good_claims(), Some(KID));
        let (signed, signature) = token.rsplit_once('.').unwrap();
        let flipped = if signature.starts_with('A') { "B" } else { "A" };
        let tampered = format!("{signed}.{flipped}{}", &signature[1..]);

        assert_eq!(
            verify_signature(&tampered, &jwks()).unwrap_err(),
            TokenError::Signature
        );
    }

    #[test]
    fn test_forged_claims_with_reused_signature_rejected() {
        let token = sign(&good_claims(), Some(KID));
        let parts: Vec<&str> = token.split('.').collect();

        let mut forged = good_claims();
        forged["sub"] = json!("intruder");
        let forged_payload = {
            use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
            URL_SAFE_NO_PAD.encode(forged.to_string())
        };
        let forged_token = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_eq!(
            verify_signature(&forged_token, &jwks()).unwrap_err(),
            TokenError::Signature
        );
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let token = {
            use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
            let head = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT","kid":"osler-test-key"}"#);
            let payload = URL_SAFE_NO_PAD.encode(good_claims().to_string());
            format!("{head}.{payload}.signature")
        };
        assert_eq!(
            verify_signature(&token, &jwks()).unwrap_err(),
            TokenError::Signature
        );
        assert_eq!(
            verify_signature("not-a-jwt", &jwks()).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_key_id_required_and_must_be_known() {
        let token = sign(&good_claims(), None);
        assert_eq!(
            verify_signature(&token, &jwks()).unwrap_err(),
            TokenError::MissingKeyId
        );

        let token = sign(&good_claims(), Some("rotated-away"));
        assert_eq!(
            verify_signature(&token, &jwks()).unwrap_err(),
            TokenError::UnknownKey("rotated-away".to_string())
        );
    }

    #[test]
    fn test_hmac_tokens_refused() {
        let header = Header {
            kid: Some(KID.to_string()),
            ..Header::new(Algorithm::HS256)
        };
        let token = jsonwebtoken::encode(
            &header,
            &good_claims(),
            &EncodingKey::from_secret(b"shared-secret"),
        )
        .unwrap();
        assert!(matches!(
            verify_signature(&token, &jwks()),
            Err(TokenError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut value = good_claims();
        value["exp"] = json!(NOW - 1);
        assert_eq!(
            check_claims(&config(), &claims(value), NOW).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn test_expiry_check_can_be_disabled() {
        let mut value = good_claims();
        value["exp"] = json!(NOW - 1);
        let config = OAuth2Config {
            validate_exp: false,
            ..config()
        };
        assert!(check_claims(&config, &claims(value), NOW).is_ok());
    }

    #[test]
    fn test_wrong_issuer_and_audience_rejected() {
        let mut value = good_claims();
        value["iss"] = json!("https://evil.example.com");
        assert!(matches!(
            check_claims(&config(), &claims(value), NOW),
            Err(TokenError::Issuer(_))
        ));

        let mut value = good_claims();
        value["aud"] = json!("someone-else");
        assert!(matches!(
            check_claims(&config(), &claims(value), NOW),
            Err(TokenError::Audience(_))
        ));
    }

    #[test]
    fn test_scopes_from_scp_array() {
        let mut value = good_claims();
        value.as_object_mut().unwrap().remove("scope");
        value["scp"] = json!(["read:mimic-data"]);
        assert!(check_claims(&config(), &claims(value), NOW).is_ok());
    }

    #[test]
    fn test_missing_scope_rejected() {
        let mut value = good_claims();
        value["scope"] = json!("openid");
        assert_eq!(
            check_claims(&config(), &claims(value), NOW).unwrap_err(),
            TokenError::Scope("read:mimic-data".to_string())
        );
    }

    /// Serve the fixture JWKS on a local port, counting fetches.
    async fn serve_jwks() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = axum::Router::new().route(
            "/.well-known/jwks.json",
            axum::routing::get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { ([(header::CONTENT_TYPE, "application/json")], JWKS) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/.well-known/jwks.json"), hits)
    }

    #[tokio::test]
    async fn test_validator_fetches_and_caches_jwks() {
        let (url, hits) = serve_jwks().await;
        let validator = TokenValidator::from_config(OAuth2Config {
            jwks_url: url,
            ..config()
        })
        .unwrap();

        let token = sign(&good_claims(), Some(KID));
        let first = validator.validate(&token, NOW).await.unwrap();
        assert_eq!(first.sub.as_deref(), Some("analyst-1"));
        validator.validate(&token, NOW).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1, "second check uses the cache");

        let rotated = sign(&good_claims(), Some("rotated-away"));
        assert_eq!(
            validator.validate(&rotated, NOW).await.unwrap_err(),
            TokenError::UnknownKey("rotated-away".to_string())
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2, "unknown kid forces one refresh");
    }

    #[tokio::test]
    async fn test_validator_rejects_tampered_token() {
        let (url, _) = serve_jwks().await;
        let validator = TokenValidator::from_config(OAuth2Config {
            jwks_url: url,
            ..config()
        })
        .unwrap();

        let token = sign(&good_claims(), Some(KID));
        let tampered = format!("{}x", &token[..token.len() - 1]);
        assert!(validator.validate(&tampered, NOW).await.is_err());
    }

    #[tokio::test]
    async fn test_validator_reports_unreachable_jwks() {
        let validator = TokenValidator::from_config(OAuth2Config {
            jwks_url: "http://127.0.0.1:9/.well-known/jwks.json".to_string(),
            ..config()
        })
        .unwrap();
        let token = sign(&good_claims(), Some(KID));
        assert!(matches!(
            validator.validate(&token, NOW).await,
            Err(TokenError::Jwks(_))
        ));
    }
}
