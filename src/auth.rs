//! Storage account credentials and Shared Key request signing.
//!
//! Three credential forms are supported:
//!   - Shared Key: HMAC-SHA256 over the canonical request, sent as
//!     `Authorization: SharedKey {account}:{signature}`
//!   - SAS token: appended to the request URL query string
//!   - Anonymous: no authorization (public containers only)
//!
//! The Shared Key string-to-sign format:
//! ```text
//! VERB\n
//! Content-Encoding\n
//! Content-Language\n
//! Content-Length\n
//! Content-MD5\n
//! Content-Type\n
//! Date\n
//! If-Modified-Since\n
//! If-Match\n
//! If-None-Match\n
//! If-Unmodified-Since\n
//! Range\n
//! CanonicalizedHeaders\n
//! CanonicalizedResource
//! ```

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

/// Storage REST API version sent with every request.
pub const API_VERSION: &str = "2023-11-03";

/// How requests against one account are authorized.
#[derive(Clone)]
pub enum Credential {
    /// Shared Key authentication using the account key.
    SharedKey { account: String, key_bytes: Vec<u8> },
    /// SAS token (without the leading `?`).
    SasToken { token: String },
    /// No authorization.
    Anonymous,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .finish_non_exhaustive(),
            Credential::SasToken { .. } => f.write_str("SasToken"),
            Credential::Anonymous => f.write_str("Anonymous"),
        }
    }
}

impl Credential {
    /// Shared Key credential from a base64 account key.
    pub fn shared_key(account: &str, key: &str) -> anyhow::Result<Self> {
        let key_bytes = BASE64_STANDARD
            .decode(key.trim())
            .map_err(|e| anyhow::anyhow!("Invalid account key (not valid base64): {}", e))?;
        Ok(Credential::SharedKey {
            account: account.to_string(),
            key_bytes,
        })
    }

    /// SAS credential; a leading `?` is stripped.
    pub fn sas(token: &str) -> Self {
        Credential::SasToken {
            token: token.trim_start_matches('?').to_string(),
        }
    }

    /// Extract the credential from a connection string.
    ///
    /// `AccountKey=` wins over `SharedAccessSignature=`.
    pub fn from_connection_string(account: &str, conn_str: &str) -> anyhow::Result<Self> {
        let mut sas = None;
        for part in conn_str.split(';') {
            if let Some(key) = part.strip_prefix("AccountKey=") {
                return Self::shared_key(account, key);
            }
            if let Some(token) = part.strip_prefix("SharedAccessSignature=") {
                sas = Some(Self::sas(token));
            }
        }
        sas.ok_or_else(|| {
            anyhow::anyhow!("Connection string has neither AccountKey nor SharedAccessSignature")
        })
    }

    /// Append the SAS token to `url` when this is a SAS credential.
    pub fn authorize_url(&self, url: &str) -> String {
        match self {
            Credential::SasToken { token } => {
                if url.contains('?') {
                    format!("{}&{}", url, token)
                } else {
                    format!("{}?{}", url, token)
                }
            }
            Credential::SharedKey { .. } | Credential::Anonymous => url.to_string(),
        }
    }

    /// Compute the `Authorization` header for a request, if this
    /// credential signs requests.
    ///
    /// `ms_headers` are the `x-ms-*` headers that will be sent (including
    /// `x-ms-date` and `x-ms-version`).
    pub fn authorization(
        &self,
        method: &str,
        url: &Url,
        content_length: Option<usize>,
        content_type: &str,
        ms_headers: &[(String, String)],
    ) -> anyhow::Result<Option<String>> {
        let (account, key_bytes) = match self {
            Credential::SharedKey { account, key_bytes } => (account, key_bytes),
            Credential::SasToken { .. } | Credential::Anonymous => return Ok(None),
        };

        let string_to_sign =
            string_to_sign(account, method, url, content_length, content_type, ms_headers);

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(key_bytes)
            .map_err(|e| anyhow::anyhow!("HMAC key error: {}", e))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(Some(format!("SharedKey {}:{}", account, signature)))
    }
}

/// Build the Shared Key string-to-sign.
fn string_to_sign(
    account: &str,
    method: &str,
    url: &Url,
    content_length: Option<usize>,
    content_type: &str,
    ms_headers: &[(String, String)],
) -> String {
    // Content-Length: empty for 0 or if not provided (GET/DELETE/HEAD).
    let content_length_str = match content_length {
        Some(0) | None => String::new(),
        Some(len) => len.to_string(),
    };

    let mut headers: Vec<(String, String)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
        .filter(|(k, _)| k.starts_with("x-ms-"))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonicalized_headers = headers
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join("\n");

    // The canonicalized resource uses the decoded path.
    let path = percent_encoding::percent_decode_str(url.path()).decode_utf8_lossy();
    let mut canonicalized_resource = format!("/{}{}", account, path);
    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .collect();
    query.sort_by(|a, b| a.0.cmp(&b.0));
    for (k, v) in &query {
        canonicalized_resource.push_str(&format!("\n{}:{}", k, v));
    }

    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}\n{}",
        method, content_length_str, content_type, canonicalized_headers, canonicalized_resource
    )
}

/// Generate a client request ID for correlating service logs.
pub fn generate_request_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// Current UTC date in RFC 1123 format for `x-ms-date`.
pub fn rfc1123_date() -> String {
    httpdate::fmt_http_date(std::time::SystemTime::now())
}
