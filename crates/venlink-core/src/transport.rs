//! HTTP transport to the VTN.
//!
//! The client core talks to the VTN through the [`Transport`] trait; the
//! default implementation POSTs encoded payloads with a shared
//! `reqwest::Client`. Tests substitute a scripted transport.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::VenError;

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The OpenADR service endpoints, appended to the VTN base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    EiRegisterParty,
    EiEvent,
    EiReport,
    EiOpt,
    OadrPoll,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::EiRegisterParty => "EiRegisterParty",
            Service::EiEvent => "EiEvent",
            Service::EiReport => "EiReport",
            Service::EiOpt => "EiOpt",
            Service::OadrPoll => "OadrPoll",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// An HTTP reply: status code plus raw body bytes.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: Vec<u8>,
}

/// POSTs an encoded message to `{vtn_url}/{service}` and returns the body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, service: Service, body: Vec<u8>) -> Result<TransportReply, VenError>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// Wrapper around a reqwest Client with builder-pattern configuration for
/// the mutual-TLS material a VTN deployment may require.
pub struct HttpTransport {
    inner: reqwest::Client,
    vtn_url: String,
}

/// Builder for [`HttpTransport`].
pub struct HttpTransportBuilder {
    vtn_url: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    cert_pem: Option<Vec<u8>>,
    key_pem: Option<Vec<u8>>,
    ca_pem: Option<Vec<u8>>,
    check_hostname: bool,
}

impl HttpTransportBuilder {
    pub fn new(vtn_url: impl Into<String>) -> Self {
        let vtn_url = vtn_url.into().trim_end_matches('/').to_string();
        Self {
            vtn_url,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            cert_pem: None,
            key_pem: None,
            ca_pem: None,
            check_hostname: true,
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// PEM client certificate and key for mutual TLS. The key must be
    /// unencrypted; an encrypted signing key is the codec's concern.
    pub fn client_identity(mut self, cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        self.cert_pem = Some(cert_pem);
        self.key_pem = Some(key_pem);
        self
    }

    /// PEM CA bundle used to validate the VTN server certificate.
    pub fn ca_bundle(mut self, ca_pem: Vec<u8>) -> Self {
        self.ca_pem = Some(ca_pem);
        self
    }

    pub fn check_hostname(mut self, check: bool) -> Self {
        self.check_hostname = check;
        self
    }

    pub fn build(self) -> Result<HttpTransport, VenError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .user_agent(format!("venlink/{}", env!("CARGO_PKG_VERSION")));

        if let (Some(cert), Some(key)) = (&self.cert_pem, &self.key_pem) {
            let identity = reqwest::Identity::from_pkcs8_pem(cert, key)?;
            builder = builder.identity(identity);
        }
        if let Some(ca) = &self.ca_pem {
            let ca = reqwest::Certificate::from_pem(ca)?;
            builder = builder.add_root_certificate(ca);
        }
        if !self.check_hostname {
            builder = builder.danger_accept_invalid_hostnames(true);
        }

        let inner = builder.build()?;
        Ok(HttpTransport {
            inner,
            vtn_url: self.vtn_url,
        })
    }
}

impl HttpTransport {
    pub fn builder(vtn_url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder::new(vtn_url)
    }

    pub fn vtn_url(&self) -> &str {
        &self.vtn_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, service: Service, body: Vec<u8>) -> Result<TransportReply, VenError> {
        let url = format!("{}/{}", self.vtn_url, service.as_str());
        let response = self
            .inner
            .post(&url)
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(TransportReply { status, body })
    }
}
