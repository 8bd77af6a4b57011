//! Azure Blob Storage channel.
//!
//! Lookups use Get Blob Properties (`HEAD {blob-url}`); a 404 means the
//! blob does not exist or is not visible yet.  Contexts come from the
//! configuration file, with an environment fallback for the default
//! context:
//!   - `AZURE_STORAGE_ACCOUNT` (account name)
//!   - `AZURE_STORAGE_KEY` (Shared Key auth, preferred)
//!   - `AZURE_STORAGE_CONNECTION_STRING` (parsed for key or SAS)
//!   - `AZURE_STORAGE_SAS_TOKEN` (SAS token auth)

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::backend::{ChannelFactory, StorageChannel};
use crate::auth::{self, Credential, API_VERSION};
use crate::config::{Config, ContextConfig};
use crate::errors::CopyError;
use crate::model::{
    AccountRef, BlobProperties, BlobReference, ContainerReference, CopyState, CopyStatus,
};

/// Channel bound to one Azure storage account.
pub struct AzureChannel {
    client: reqwest::Client,
    account: AccountRef,
    credential: Credential,
}

impl AzureChannel {
    pub fn new(client: reqwest::Client, account: AccountRef, credential: Credential) -> Self {
        Self {
            client,
            account,
            credential,
        }
    }

    /// Get Blob Properties.  `Ok(None)` on 404.
    async fn get_properties(&self, blob: &BlobReference) -> anyhow::Result<Option<BlobProperties>> {
        let url = Url::parse(&blob.uri())?;
        let date = auth::rfc1123_date();
        let request_id = auth::generate_request_id();
        let ms_headers = vec![
            ("x-ms-client-request-id".to_string(), request_id.clone()),
            ("x-ms-date".to_string(), date.clone()),
            ("x-ms-version".to_string(), API_VERSION.to_string()),
        ];

        debug!(
            "Azure get properties: account={} container={} blob={} request_id={}",
            self.account.name, blob.container.name, blob.name, request_id
        );

        let mut req = self
            .client
            .head(self.credential.authorize_url(url.as_str()))
            .header("x-ms-client-request-id", &request_id)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION);
        if let Some(auth_header) = self
            .credential
            .authorization("HEAD", &url, None, "", &ms_headers)?
        {
            req = req.header("Authorization", auth_header);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Azure get properties request failed: {}", e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            // HEAD responses carry the error code in a header, not a body.
            let code = resp
                .headers()
                .get("x-ms-error-code")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            anyhow::bail!(
                "Azure get properties of {}/{}: HTTP {} {}",
                blob.container.name,
                blob.name,
                status,
                code
            );
        }

        parse_properties(resp.headers()).map(Some)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    header_str(headers, name)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Map Get Blob Properties response headers to [`BlobProperties`].
pub(crate) fn parse_properties(headers: &HeaderMap) -> anyhow::Result<BlobProperties> {
    let etag = header_string(headers, "etag")
        .ok_or_else(|| anyhow::anyhow!("Blob properties response has no ETag"))?;
    let size = match header_str(headers, "content-length") {
        Some(len) => len
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid Content-Length '{}': {}", len, e))?,
        None => 0,
    };
    let blob_type = match header_str(headers, "x-ms-blob-type") {
        Some(t) => t.parse()?,
        None => Default::default(),
    };

    let copy = match header_str(headers, "x-ms-copy-status") {
        Some(status) => Some(CopyState {
            id: header_string(headers, "x-ms-copy-id"),
            status: status.parse::<CopyStatus>()?,
            progress: header_string(headers, "x-ms-copy-progress"),
            source: header_string(headers, "x-ms-copy-source"),
            status_description: header_string(headers, "x-ms-copy-status-description"),
        }),
        None => None,
    };

    Ok(BlobProperties {
        size,
        etag,
        blob_type,
        content_type: header_string(headers, "content-type"),
        content_md5: header_string(headers, "content-md5"),
        last_modified: header_string(headers, "last-modified"),
        copy,
    })
}

impl StorageChannel for AzureChannel {
    fn account(&self) -> &AccountRef {
        &self.account
    }

    fn resolve_blob(
        &self,
        container: &ContainerReference,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<BlobReference>>> + Send + '_>> {
        let blob = container.blob(name);
        Box::pin(async move {
            let properties = self.get_properties(&blob).await?;
            Ok(properties.map(|p| blob.with_properties(p)))
        })
    }

    fn fetch_properties(
        &self,
        blob: &BlobReference,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<BlobProperties>> + Send + '_>> {
        let blob = blob.clone();
        Box::pin(async move {
            self.get_properties(&blob).await?.ok_or_else(|| {
                anyhow::anyhow!("Blob not found: {}/{}", blob.container.name, blob.name)
            })
        })
    }
}

// ── Factory ────────────────────────────────────────────────────────

/// Opens [`AzureChannel`]s for the contexts declared in [`Config`].
pub struct AzureChannelFactory {
    client: reqwest::Client,
    config: Config,
}

impl AzureChannelFactory {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.transfer.request_timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client, config })
    }

    /// HTTP client shared by channels and the copy starter.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The context configuration for `name`, falling back to the
    /// environment for the default context.
    fn context_config(&self, name: &str) -> Option<ContextConfig> {
        if let Some(ctx) = self.config.contexts.get(name) {
            return Some(ctx.clone());
        }
        if name != self.config.default_context {
            return None;
        }
        let account = std::env::var("AZURE_STORAGE_ACCOUNT").ok()?;
        Some(ContextConfig {
            account,
            connection_string: std::env::var("AZURE_STORAGE_CONNECTION_STRING")
                .unwrap_or_default(),
            key_env: "AZURE_STORAGE_KEY".to_string(),
            sas_token_env: "AZURE_STORAGE_SAS_TOKEN".to_string(),
            ..Default::default()
        })
    }

    /// Account identity and credential for a context.
    pub fn resolve(&self, context: &str) -> Result<(AccountRef, Credential), CopyError> {
        let channel_error = |reason: String| CopyError::Channel {
            context: context.to_string(),
            reason,
        };
        let ctx = self
            .context_config(context)
            .ok_or_else(|| channel_error("no such context in configuration".to_string()))?;
        let account = if ctx.endpoint.is_empty() {
            AccountRef::public(&ctx.account)
        } else {
            AccountRef::new(&ctx.account, &ctx.endpoint)
        }
        .map_err(|e| channel_error(e.to_string()))?;
        let credential = resolve_credential(&ctx).map_err(|e| channel_error(e.to_string()))?;
        Ok((account, credential))
    }
}

/// Pick the credential from a context, in field order.
fn resolve_credential(ctx: &ContextConfig) -> anyhow::Result<Credential> {
    if !ctx.key.is_empty() {
        return Credential::shared_key(&ctx.account, &ctx.key);
    }
    if !ctx.key_env.is_empty() {
        if let Ok(key) = std::env::var(&ctx.key_env) {
            return Credential::shared_key(&ctx.account, &key);
        }
    }
    if !ctx.connection_string.is_empty() {
        return Credential::from_connection_string(&ctx.account, &ctx.connection_string);
    }
    if !ctx.sas_token.is_empty() {
        return Ok(Credential::sas(&ctx.sas_token));
    }
    if !ctx.sas_token_env.is_empty() {
        if let Ok(token) = std::env::var(&ctx.sas_token_env) {
            return Ok(Credential::sas(&token));
        }
    }
    Ok(Credential::Anonymous)
}

impl ChannelFactory for AzureChannelFactory {
    fn open(&self, context: &str) -> Result<Arc<dyn StorageChannel>, CopyError> {
        let (account, credential) = self.resolve(context)?;
        debug!(
            "Opened Azure channel: context={} account={} endpoint={} credential={:?}",
            context, account.name, account.endpoint, credential
        );
        Ok(Arc::new(AzureChannel::new(
            self.client.clone(),
            account,
            credential,
        )))
    }
}
