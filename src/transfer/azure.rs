//! Copy starter for Azure Blob Storage.
//!
//! Issues Copy Blob (`PUT {dest-url}` with `x-ms-copy-source`) signed with
//! the destination context's credential.  The service answers `202
//! Accepted` with the copy id and an initial status (`pending`, or
//! `success` for copies it finished synchronously).

use std::future::Future;
use std::pin::Pin;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use super::engine::{CopyAcceptance, CopyStarter, TransferError};
use crate::auth::{self, Credential, API_VERSION};
use crate::channel::azure::AzureChannelFactory;
use crate::errors::CopyError;
use crate::model::{AccountRef, CopyEndpoint, CopyRequest, CopyStatus};
use crate::xml;

/// Account and credential of one opened context.
struct ContextCredential {
    account: AccountRef,
    credential: Credential,
}

/// [`CopyStarter`] that talks to the Blob service.
///
/// Bound to the source and destination contexts of one invocation; the
/// copy is always signed with the destination context's credential.
pub struct AzureCopyStarter {
    client: reqwest::Client,
    source: ContextCredential,
    destination: ContextCredential,
}

impl AzureCopyStarter {
    pub fn new(
        factory: &AzureChannelFactory,
        source_context: &str,
        destination_context: &str,
    ) -> Result<Self, CopyError> {
        let open = |context: &str| {
            factory
                .resolve(context)
                .map(|(account, credential)| ContextCredential {
                    account,
                    credential,
                })
        };
        Ok(Self {
            client: factory.client().clone(),
            source: open(source_context)?,
            destination: open(destination_context)?,
        })
    }

    /// URL the service reads the source from.  Blobs on a SAS-authorized
    /// context get the token appended so the service can authorize the read.
    fn source_url(&self, source: &CopyEndpoint) -> String {
        match source {
            CopyEndpoint::Blob(blob) => {
                let uri = blob.uri();
                let account = &blob.container.account;
                let context = [&self.source, &self.destination]
                    .into_iter()
                    .find(|c| c.account == *account);
                match context.map(|c| &c.credential) {
                    Some(credential @ Credential::SasToken { .. }) => {
                        credential.authorize_url(&uri)
                    }
                    _ => uri,
                }
            }
            CopyEndpoint::Uri(uri) => uri.to_string(),
        }
    }

    async fn copy(&self, request: &CopyRequest) -> Result<CopyAcceptance, TransferError> {
        let destination = request.destination.blob();
        let account = &destination.container.account;
        if *account != self.destination.account {
            return Err(TransferError::rejected(format!(
                "Destination account '{}' is not the destination context's account '{}'",
                account.name, self.destination.account.name
            )));
        }
        let credential = &self.destination.credential;

        let dest_url = Url::parse(&destination.uri())
            .map_err(|e| TransferError::rejected(format!("Invalid destination URL: {e}")))?;
        let source_url = self.source_url(&request.source);
        let date = auth::rfc1123_date();
        let request_id = auth::generate_request_id();

        let ms_headers = vec![
            ("x-ms-client-request-id".to_string(), request_id.clone()),
            ("x-ms-copy-source".to_string(), source_url.clone()),
            ("x-ms-date".to_string(), date.clone()),
            ("x-ms-version".to_string(), API_VERSION.to_string()),
        ];

        let mut req = self
            .client
            .put(credential.authorize_url(dest_url.as_str()))
            .header("x-ms-client-request-id", &request_id)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-copy-source", &source_url)
            .header("Content-Length", "0");
        if let Some(auth_header) = credential
            .authorization("PUT", &dest_url, Some(0), "", &ms_headers)
            .map_err(|e| TransferError::rejected(e.to_string()))?
        {
            req = req.header("Authorization", auth_header);
        }

        debug!(
            request_id = %request_id,
            source = %request.source.uri(),
            destination = %dest_url,
            "Azure start copy"
        );

        let resp = req
            .send()
            .await
            .map_err(|e| TransferError::rejected(format!("Azure copy request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(request_id = %request_id, error = %e, "Failed to read copy error body");
                    String::new()
                }
            };
            return Err(map_copy_error(status, &body));
        }
        parse_acceptance(resp.headers())
    }
}

/// Turn a failed Copy Blob response into a rejection reason.
fn map_copy_error(status: StatusCode, body: &str) -> TransferError {
    let summary = xml::parse_error(body)
        .map(|e| e.summary())
        .filter(|s| !s.is_empty());
    match summary {
        Some(summary) => TransferError::rejected(summary),
        None => TransferError::rejected(format!("Azure copy: HTTP {status}")),
    }
}

/// Read the copy id and status from a `202 Accepted` response.
fn parse_acceptance(headers: &HeaderMap) -> Result<CopyAcceptance, TransferError> {
    let copy_id = headers
        .get("x-ms-copy-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let status = match headers.get("x-ms-copy-status").and_then(|v| v.to_str().ok()) {
        Some(s) => s
            .parse::<CopyStatus>()
            .map_err(|e| TransferError::rejected(e.to_string()))?,
        None => CopyStatus::Pending,
    };
    Ok(CopyAcceptance { copy_id, status })
}

impl CopyStarter for AzureCopyStarter {
    fn start_copy(
        &self,
        request: &CopyRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CopyAcceptance, TransferError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move { self.copy(&request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ContextConfig};
    use crate::model::ContainerReference;
    use reqwest::header::HeaderValue;

    fn factory(contexts: &[(&str, &str, &str)]) -> AzureChannelFactory {
        let mut config = Config::default();
        for (name, account, sas_token) in contexts {
            config.contexts.insert(
                name.to_string(),
                ContextConfig {
                    account: account.to_string(),
                    sas_token: sas_token.to_string(),
                    ..Default::default()
                },
            );
        }
        AzureChannelFactory::new(config).unwrap()
    }

    fn starter_with_sas_source() -> AzureCopyStarter {
        let factory = factory(&[
            ("src", "srcacct", "?sv=1&sig=abc"),
            ("dst", "dstacct", "?sv=1&sig=dst"),
        ]);
        AzureCopyStarter::new(&factory, "src", "dst").unwrap()
    }

    #[test]
    fn test_source_url_appends_sas() {
        let starter = starter_with_sas_source();
        let blob = ContainerReference::new(AccountRef::public("srcacct").unwrap(), "src")
            .blob("a b.txt");
        assert_eq!(
            starter.source_url(&CopyEndpoint::Blob(blob)),
            "https://srcacct.blob.core.windows.net/src/a%20b.txt?sv=1&sig=abc"
        );
    }

    #[test]
    fn test_source_url_passes_uri_through() {
        let starter = starter_with_sas_source();
        let uri = Url::parse("https://other.example.com/c/a.txt?sig=zzz").unwrap();
        assert_eq!(
            starter.source_url(&CopyEndpoint::Uri(uri)),
            "https://other.example.com/c/a.txt?sig=zzz"
        );
    }

    #[test]
    fn test_map_copy_error_uses_service_code() {
        let body = "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>CannotVerifyCopySource</Code><Message>The specified blob does not exist.\nRequestId:1</Message></Error>";
        assert_eq!(
            map_copy_error(StatusCode::NOT_FOUND, body),
            TransferError::rejected("CannotVerifyCopySource: The specified blob does not exist.")
        );
        assert_eq!(
            map_copy_error(StatusCode::SERVICE_UNAVAILABLE, ""),
            TransferError::rejected("Azure copy: HTTP 503 Service Unavailable")
        );
    }

    #[test]
    fn test_parse_acceptance() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-copy-id", HeaderValue::from_static("abc-123"));
        headers.insert("x-ms-copy-status", HeaderValue::from_static("success"));
        let acceptance = parse_acceptance(&headers).unwrap();
        assert_eq!(acceptance.copy_id.as_deref(), Some("abc-123"));
        assert_eq!(acceptance.status, CopyStatus::Success);

        let acceptance = parse_acceptance(&HeaderMap::new()).unwrap();
        assert_eq!(acceptance.status, CopyStatus::Pending);
        assert!(acceptance.copy_id.is_none());
    }

    #[test]
    fn test_signs_with_chosen_destination_context() {
        let factory = factory(&[
            ("a-readonly", "backup", "?sig=READONLY"),
            ("b-writer", "backup", "?sig=WRITER"),
        ]);
        let starter = AzureCopyStarter::new(&factory, "a-readonly", "b-writer").unwrap();
        let url = "https://backup.blob.core.windows.net/dst/a.txt";
        assert_eq!(
            starter.destination.credential.authorize_url(url),
            format!("{url}?sig=WRITER")
        );

        // Source blobs are read through the source context.
        let blob = ContainerReference::new(AccountRef::public("backup").unwrap(), "src")
            .blob("a.txt");
        assert!(starter
            .source_url(&CopyEndpoint::Blob(blob))
            .ends_with("sig=READONLY"));
    }

    #[test]
    fn test_unknown_context_is_channel_error() {
        let factory = factory(&[("src", "srcacct", "")]);
        assert!(matches!(
            AzureCopyStarter::new(&factory, "src", "ghost"),
            Err(CopyError::Channel { .. })
        ));
    }

    #[tokio::test]
    async fn test_copy_to_foreign_account_is_rejected() {
        let starter = starter_with_sas_source();
        let account = AccountRef::public("unknownacct").unwrap();
        let request = CopyRequest {
            source: CopyEndpoint::Uri(Url::parse("https://x.example.com/c/a").unwrap()),
            destination: crate::model::CopyDestination {
                container: ContainerReference::new(account, "dst"),
                blob_name: "a".to_string(),
            },
        };
        let err = starter.start_copy(&request).await.unwrap_err();
        assert!(err.to_string().contains("unknownacct"));
    }
}
