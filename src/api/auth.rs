//! Signed admin requests
//!
//! An admin request carries two headers: `x-admin-timestamp` (unix seconds)
//! and `x-admin-signature`, an EIP-191 personal signature over
//! `"{path}:{timestamp}:{body}"`. The recovered signer must be one of the
//! configured admin accounts and the timestamp must be recent.

use super::{AppState, ErrorResponse};
use crate::config::ApiConfig;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use ethers::types::Signature;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{info, warn};

pub const SIGNATURE_HEADER: &str = "x-admin-signature";
pub const TIMESTAMP_HEADER: &str = "x-admin-timestamp";

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub enum AuthError {
    /// No usable credentials: 401
    Unauthorized(String),
    /// Valid signature from an account that is not an admin: 403
    Forbidden(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AuthError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AuthError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
        };
        warn!("Admin request refused: {}", error);
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Admin accounts and the accepted signature age
pub struct AdminAuth {
    accounts: HashSet<String>,
    max_age_secs: i64,
}

impl AdminAuth {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            accounts: config
                .admin_accounts
                .iter()
                .map(|a| a.to_lowercase())
                .collect(),
            max_age_secs: config.admin_signature_ttl_secs as i64,
        }
    }

    /// The text an admin signs for one request
    pub fn message(path: &str, timestamp: i64, body: &[u8]) -> String {
        format!("{}:{}:{}", path, timestamp, String::from_utf8_lossy(body))
    }

    /// Recover the signer and check it is an admin; returns the signer address
    pub fn verify(
        &self,
        path: &str,
        headers: &HeaderMap,
        body: &[u8],
        now: i64,
    ) -> Result<String, AuthError> {
        let timestamp = header(headers, TIMESTAMP_HEADER)?
            .parse::<i64>()
            .map_err(|_| AuthError::Unauthorized("invalid admin timestamp".into()))?;
        if (now - timestamp).abs() > self.max_age_secs {
            return Err(AuthError::Unauthorized(format!(
                "admin signature expired (timestamp {})",
                timestamp
            )));
        }

        let signature = Signature::from_str(header(headers, SIGNATURE_HEADER)?)
            .map_err(|e| AuthError::Unauthorized(format!("invalid admin signature: {}", e)))?;
        let signer = signature
            .recover(Self::message(path, timestamp, body))
            .map_err(|e| AuthError::Unauthorized(format!("invalid admin signature: {}", e)))?;

        let signer = format!("{:?}", signer);
        if !self.accounts.contains(&signer) {
            return Err(AuthError::Forbidden(format!("{} is not an admin", signer)));
        }
        Ok(signer)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AuthError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthError::Unauthorized(format!("missing {} header", name)))
}

/// Middleware in front of the `/admin` routes
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AuthError::Unauthorized(format!("unreadable admin request: {}", e)))?;

    let now = chrono::Utc::now().timestamp();
    let signer = state
        .admin
        .verify(parts.uri.path(), &parts.headers, &bytes, now)?;
    info!("Admin {} calls {}", signer, parts.uri.path());

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use ethers::signers::{LocalWallet, Signer};

    pub(crate) async fn signed_headers(
        wallet: &LocalWallet,
        path: &str,
        timestamp: i64,
        body: &[u8],
    ) -> HeaderMap {
        let signature = wallet
            .sign_message(AdminAuth::message(path, timestamp, body))
            .await
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            TIMESTAMP_HEADER,
            HeaderValue::from_str(&timestamp.to_string()).unwrap(),
        );
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&signature.to_string()).unwrap(),
        );
        headers
    }

    fn auth(admin: &LocalWallet) -> AdminAuth {
        // configured addresses may be checksummed
        let account = ethers::utils::to_checksum(&admin.address(), None);
        AdminAuth::new(&ApiConfig {
            host: "127.0.0.1".into(),
            port: 0,
            admin_accounts: vec![account],
            admin_signature_ttl_secs: 300,
        })
    }

    #[tokio::test]
    async fn test_admin_signature_accepted() {
        let admin = LocalWallet::new(&mut rand::thread_rng());
        let headers = signed_headers(&admin, "/admin/reswap", 1_000, b"{}").await;
        let signer = auth(&admin)
            .verify("/admin/reswap", &headers, b"{}", 1_010)
            .unwrap();
        assert_eq!(signer, format!("{:?}", admin.address()));
    }

    #[tokio::test]
    async fn test_signature_bound_to_path_body_and_time() {
        let admin = LocalWallet::new(&mut rand::thread_rng());
        let auth = auth(&admin);
        let headers = signed_headers(&admin, "/admin/reswap", 1_000, b"{\"a\":1}").await;

        // replayed against another endpoint or body recovers some other address
        assert!(matches!(
            auth.verify("/admin/passbigvalue", &headers, b"{\"a\":1}", 1_000),
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            auth.verify("/admin/reswap", &headers, b"{\"a\":2}", 1_000),
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            auth.verify("/admin/reswap", &headers, b"{\"a\":1}", 1_301),
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_or_foreign_signature() {
        let admin = LocalWallet::new(&mut rand::thread_rng());
        let stranger = LocalWallet::new(&mut rand::thread_rng());
        let auth = auth(&admin);

        assert!(matches!(
            auth.verify("/admin/reswap", &HeaderMap::new(), b"", 1_000),
            Err(AuthError::Unauthorized(_))
        ));

        let mut headers = signed_headers(&stranger, "/admin/reswap", 1_000, b"").await;
        assert!(matches!(
            auth.verify("/admin/reswap", &headers, b"", 1_000),
            Err(AuthError::Forbidden(_))
        ));

        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("0x1234"));
        assert!(matches!(
            auth.verify("/admin/reswap", &headers, b"", 1_000),
            Err(AuthError::Unauthorized(_))
        ));
    }
}
