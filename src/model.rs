//! Resolved references and copy request types.
//!
//! References are plain values: a channel stamps its [`AccountRef`] on
//! every container it resolves, and blob references carry the properties
//! that were observed when they were fetched.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::Serialize;
use url::Url;

use crate::errors::CopyError;

/// Percent-encoding set for blob names: encode everything except
/// unreserved characters and '/'.
const BLOB_ENCODE_SET: percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Identity of one storage account: its name and blob service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    /// Storage account name.
    pub name: String,
    /// Blob service endpoint, always ending in `/`.
    pub endpoint: Url,
}

impl AccountRef {
    /// Build an account identity from an explicit endpoint.
    pub fn new(name: &str, endpoint: &str) -> anyhow::Result<Self> {
        let endpoint = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{endpoint}/")
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid endpoint '{}': {}", endpoint, e))?;
        Ok(Self {
            name: name.to_string(),
            endpoint,
        })
    }

    /// Account on the public cloud endpoint (`https://{name}.blob.core.windows.net/`).
    pub fn public(name: &str) -> anyhow::Result<Self> {
        Self::new(name, &format!("https://{name}.blob.core.windows.net/"))
    }

    /// Account served by the in-process memory store (`memory://{name}/`).
    pub fn memory(name: &str) -> anyhow::Result<Self> {
        Self::new(name, &format!("memory://{name}/"))
    }

    fn base(&self) -> &str {
        self.endpoint.as_str().trim_end_matches('/')
    }
}

/// A named container within one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerReference {
    pub account: AccountRef,
    pub name: String,
}

impl ContainerReference {
    pub fn new(account: AccountRef, name: &str) -> Self {
        Self {
            account,
            name: name.to_string(),
        }
    }

    /// Full container URL.
    pub fn uri(&self) -> String {
        format!("{}/{}", self.account.base(), self.name)
    }

    /// Parse a container URL such as `https://acct.blob.core.windows.net/photos`.
    pub fn from_uri(uri: &Url) -> Result<Self, CopyError> {
        let (account, mut segments) = split_endpoint(uri)?;
        // `https://acct.../photos/` still names the container.
        if segments.len() > 1 && segments.last().is_some_and(|s| s.is_empty()) {
            segments.pop();
        }
        match segments.as_slice() {
            [container] if !container.is_empty() => Ok(Self::new(account, container)),
            _ => Err(CopyError::configuration(format!(
                "'{uri}' is not a container URL"
            ))),
        }
    }

    /// Reference a blob inside this container without contacting the service.
    pub fn blob(&self, name: &str) -> BlobReference {
        BlobReference {
            container: self.clone(),
            name: name.to_string(),
            properties: None,
        }
    }
}

/// A single blob.  `properties` is whatever was last fetched, if anything.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobReference {
    pub container: ContainerReference,
    pub name: String,
    pub properties: Option<BlobProperties>,
}

impl BlobReference {
    /// Full blob URL with the name percent-encoded.
    pub fn uri(&self) -> String {
        let encoded = percent_encoding::utf8_percent_encode(&self.name, &BLOB_ENCODE_SET);
        format!("{}/{}", self.container.uri(), encoded)
    }

    /// Parse a blob URL such as `https://acct.blob.core.windows.net/photos/2024/a.jpg`.
    ///
    /// A trailing `/` stays part of the name so name validation sees it.
    pub fn from_uri(uri: &Url) -> Result<Self, CopyError> {
        let (account, segments) = split_endpoint(uri)?;
        match segments.split_first() {
            Some((container, rest)) if !container.is_empty() && !rest.is_empty() => {
                let name = rest.join("/");
                if name.is_empty() {
                    return Err(CopyError::configuration(format!(
                        "'{uri}' is not a blob URL"
                    )));
                }
                Ok(ContainerReference::new(account, container).blob(&name))
            }
            _ => Err(CopyError::configuration(format!(
                "'{uri}' is not a blob URL"
            ))),
        }
    }

    /// Same blob identity with freshly fetched properties.
    pub fn with_properties(mut self, properties: BlobProperties) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// Split a URL into the owning account and the decoded path segments
/// below the account endpoint.
///
/// IP and `localhost` hosts use path-style addressing (the first segment
/// is the account, as with the storage emulator); every other host uses
/// the first DNS label as the account name.
fn split_endpoint(uri: &Url) -> Result<(AccountRef, Vec<String>), CopyError> {
    let host = uri
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CopyError::configuration(format!("'{uri}' has no host")))?;
    let host_port = match uri.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut segments: Vec<String> = uri
        .path_segments()
        .map(|segs| {
            segs.map(|s| {
                percent_encoding::percent_decode_str(s)
                    .decode_utf8_lossy()
                    .into_owned()
            })
            .collect()
        })
        .unwrap_or_default();

    let trimmed_host = host.trim_start_matches('[').trim_end_matches(']');
    let path_style = host == "localhost" || IpAddr::from_str(trimmed_host).is_ok();

    let (name, endpoint) = if path_style {
        if segments.first().map_or(true, |s| s.is_empty()) {
            return Err(CopyError::configuration(format!(
                "'{uri}' does not name an account"
            )));
        }
        let name = segments.remove(0);
        let endpoint = format!("{}://{}/{}/", uri.scheme(), host_port, name);
        (name, endpoint)
    } else {
        let name = host.split('.').next().unwrap_or(host).to_string();
        let endpoint = format!("{}://{}/", uri.scheme(), host_port);
        (name, endpoint)
    };

    let account = AccountRef::new(&name, &endpoint)
        .map_err(|e| CopyError::configuration(e.to_string()))?;
    Ok((account, segments))
}

// ── Properties ─────────────────────────────────────────────────────

/// Kind of blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum BlobType {
    #[default]
    BlockBlob,
    PageBlob,
    AppendBlob,
}

impl FromStr for BlobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BlockBlob" => Ok(BlobType::BlockBlob),
            "PageBlob" => Ok(BlobType::PageBlob),
            "AppendBlob" => Ok(BlobType::AppendBlob),
            other => anyhow::bail!("Unknown blob type: {other}"),
        }
    }
}

/// State of a server-side copy as reported on the destination blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
}

impl FromStr for CopyStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(CopyStatus::Pending),
            "success" => Ok(CopyStatus::Success),
            "aborted" => Ok(CopyStatus::Aborted),
            "failed" => Ok(CopyStatus::Failed),
            other => anyhow::bail!("Unknown copy status: {other}"),
        }
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CopyStatus::Pending => "pending",
            CopyStatus::Success => "success",
            CopyStatus::Aborted => "aborted",
            CopyStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Copy metadata carried by a blob that was the target of a copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyState {
    pub id: Option<String>,
    pub status: CopyStatus,
    /// `"<bytes copied>/<total bytes>"`.
    pub progress: Option<String>,
    pub source: Option<String>,
    pub status_description: Option<String>,
}

/// Properties observed on a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct BlobProperties {
    pub size: u64,
    /// Quoted ETag as returned by the service.
    pub etag: String,
    pub blob_type: BlobType,
    pub content_type: Option<String>,
    /// Base64-encoded MD5 of the content, when known.
    pub content_md5: Option<String>,
    /// RFC 7231 date string.
    pub last_modified: Option<String>,
    pub copy: Option<CopyState>,
}

// ── Copy request ───────────────────────────────────────────────────

/// Resolved source of a copy.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyEndpoint {
    /// A blob the service can read through one of our channels.
    Blob(BlobReference),
    /// An opaque URL (another account, SAS-authorized or public).
    Uri(Url),
}

impl CopyEndpoint {
    /// URL the service reads from.
    pub fn uri(&self) -> String {
        match self {
            CopyEndpoint::Blob(blob) => blob.uri(),
            CopyEndpoint::Uri(uri) => uri.to_string(),
        }
    }
}

/// Where a copy lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyDestination {
    pub container: ContainerReference,
    pub blob_name: String,
}

impl CopyDestination {
    pub fn blob(&self) -> BlobReference {
        self.container.blob(&self.blob_name)
    }
}

/// A fully resolved copy.  Built once per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyRequest {
    pub source: CopyEndpoint,
    pub destination: CopyDestination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_account_uris() {
        let account = AccountRef::public("acct").unwrap();
        let container = ContainerReference::new(account, "photos");
        assert_eq!(container.uri(), "https://acct.blob.core.windows.net/photos");
        assert_eq!(
            container.blob("2024/a b.jpg").uri(),
            "https://acct.blob.core.windows.net/photos/2024/a%20b.jpg"
        );
    }

    #[test]
    fn test_blob_from_virtual_host_uri() {
        let url = Url::parse("https://acct.blob.core.windows.net/src/dir/a%20b.txt").unwrap();
        let blob = BlobReference::from_uri(&url).unwrap();
        assert_eq!(blob.container.account.name, "acct");
        assert_eq!(blob.container.name, "src");
        assert_eq!(blob.name, "dir/a b.txt");
        assert_eq!(blob.uri(), url.as_str());
    }

    #[test]
    fn test_blob_from_path_style_uri() {
        let url = Url::parse("http://127.0.0.1:10000/devstoreaccount1/src/a.txt").unwrap();
        let blob = BlobReference::from_uri(&url).unwrap();
        assert_eq!(blob.container.account.name, "devstoreaccount1");
        assert_eq!(
            blob.container.account.endpoint.as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/"
        );
        assert_eq!(blob.uri(), "http://127.0.0.1:10000/devstoreaccount1/src/a.txt");
    }

    #[test]
    fn test_blob_from_memory_uri() {
        let url = Url::parse("memory://acct/src/a.txt").unwrap();
        let blob = BlobReference::from_uri(&url).unwrap();
        assert_eq!(blob.container.account, AccountRef::memory("acct").unwrap());
        assert_eq!(blob.name, "a.txt");
    }

    #[test]
    fn test_blob_from_uri_requires_blob_name() {
        let url = Url::parse("https://acct.blob.core.windows.net/src").unwrap();
        assert!(BlobReference::from_uri(&url).is_err());
        let url = Url::parse("https://acct.blob.core.windows.net/src/").unwrap();
        assert!(BlobReference::from_uri(&url).is_err());
    }

    #[test]
    fn test_blob_from_uri_keeps_trailing_slash() {
        let url = Url::parse("https://acct.blob.core.windows.net/dst/b.txt/").unwrap();
        let blob = BlobReference::from_uri(&url).unwrap();
        assert_eq!(blob.name, "b.txt/");
    }

    #[test]
    fn test_path_style_uri_requires_account() {
        let url = Url::parse("http://127.0.0.1:10000/").unwrap();
        assert!(ContainerReference::from_uri(&url).is_err());
    }

    #[test]
    fn test_container_from_uri() {
        let url = Url::parse("https://acct.blob.core.windows.net/src/").unwrap();
        let container = ContainerReference::from_uri(&url).unwrap();
        assert_eq!(container.name, "src");
        let url = Url::parse("https://acct.blob.core.windows.net/src/a.txt").unwrap();
        assert!(ContainerReference::from_uri(&url).is_err());
    }

    #[test]
    fn test_copy_status_parse() {
        assert_eq!("success".parse::<CopyStatus>().unwrap(), CopyStatus::Success);
        assert_eq!("Pending".parse::<CopyStatus>().unwrap(), CopyStatus::Pending);
        assert!("done".parse::<CopyStatus>().is_err());
    }

    #[test]
    fn test_blob_type_parse() {
        assert_eq!("PageBlob".parse::<BlobType>().unwrap(), BlobType::PageBlob);
        assert!("Folder".parse::<BlobType>().is_err());
    }
}
