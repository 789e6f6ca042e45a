//! Shared test doubles: a scripted transport and client constructors.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::codec::{JsonCodec, MessageCodec};
use crate::config::VenConfig;
use crate::error::VenError;
use crate::transport::{Service, Transport, TransportReply};
use crate::wire::OadrMessage;
use crate::VenClient;

enum Scripted {
    Reply(OadrMessage),
    Empty,
    Status(u16),
    NetworkError,
}

/// A transport that replays a scripted sequence of VTN replies and records
/// every message the client sends. When the script runs dry it answers with
/// an empty 200 body.
pub(crate) struct FakeTransport {
    codec: JsonCodec,
    replies: Mutex<VecDeque<Scripted>>,
    sent: Mutex<Vec<(Service, OadrMessage)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            codec: JsonCodec::new(),
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, message: OadrMessage) {
        self.replies.lock().unwrap().push_back(Scripted::Reply(message));
    }

    pub fn push_empty(&self) {
        self.replies.lock().unwrap().push_back(Scripted::Empty);
    }

    pub fn push_status(&self, status: u16) {
        self.replies.lock().unwrap().push_back(Scripted::Status(status));
    }

    pub fn push_network_error(&self) {
        self.replies.lock().unwrap().push_back(Scripted::NetworkError);
    }

    /// Everything the client sent so far, decoded.
    pub fn sent(&self) -> Vec<(Service, OadrMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post(&self, service: Service, body: Vec<u8>) -> Result<TransportReply, VenError> {
        let decoded = self
            .codec
            .decode(&body)
            .expect("test client must send decodable messages");
        self.sent.lock().unwrap().push((service, decoded));

        match self.replies.lock().unwrap().pop_front() {
            None | Some(Scripted::Empty) => Ok(TransportReply {
                status: 200,
                body: Vec::new(),
            }),
            Some(Scripted::Reply(message)) => Ok(TransportReply {
                status: 200,
                body: self.codec.encode(&message).expect("test reply encodes"),
            }),
            Some(Scripted::Status(status)) => Ok(TransportReply {
                status,
                body: Vec::new(),
            }),
            Some(Scripted::NetworkError) => {
                Err(VenError::Internal("connection refused".to_string()))
            }
        }
    }
}

/// A client wired to the scripted transport and the JSON codec.
pub(crate) fn scripted_client(transport: Arc<FakeTransport>) -> VenClient {
    VenClient::builder(VenConfig::new("test-ven", "https://vtn.test"))
        .transport(transport)
        .build()
        .expect("test client builds")
}

/// Same, but already carrying a registration.
pub(crate) fn registered_client(
    transport: Arc<FakeTransport>,
    registration_id: &str,
) -> VenClient {
    let client = scripted_client(transport);
    {
        let mut registration = client.inner.registration.lock().unwrap();
        registration.registration_id = Some(registration_id.to_string());
        registration.ven_id = Some("ven-1".to_string());
    }
    client
}
