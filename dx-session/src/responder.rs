//! Peer side of the secured-call protocol.

use dx_envelope::{Lv, PrekeyRequest, PrekeyResponse, Session};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::secured::{self, SecuredRequestBody, SecuredResponseBody};
use crate::store::{PrekeyStore, PrekeyStoreConfig};
use crate::transport::Headers;

/// A decrypted secured request. `session` seals the reply.
pub struct OpenedRequest {
    pub session: Session,
    pub header: Headers,
    pub body: Value,
}

pub struct Responder {
    store: PrekeyStore,
}

impl Responder {
    pub fn new(config: PrekeyStoreConfig) -> Self {
        Self {
            store: PrekeyStore::new(config),
        }
    }

    pub fn store(&self) -> &PrekeyStore {
        &self.store
    }

    pub async fn prekey(&self, request: &PrekeyRequest) -> Result<PrekeyResponse, SessionError> {
        self.store.issue(request).await
    }

    /// Consume the prekey named by `body.i` and open `body.d` with it.
    pub async fn open(&self, body: &SecuredRequestBody) -> Result<(Session, Vec<Lv>), SessionError> {
        let session = self.store.take(&body.i).await?;
        match session.unpack(&body.d) {
            Ok(payload) => {
                debug!(prekey = %body.i, payload_lvs = payload.len(), "opened secured request");
                Ok((session, payload))
            }
            Err(e) => {
                warn!(prekey = %body.i, kind = e.kind(), "secured request rejected");
                Err(e.into())
            }
        }
    }

    /// `open` plus decoding of the `[header, body]` payload.
    pub async fn open_request(&self, body: &SecuredRequestBody) -> Result<OpenedRequest, SessionError> {
        let (session, payload) = self.open(body).await?;
        let (header, body) = secured::decode_request(&payload)?;
        Ok(OpenedRequest {
            session,
            header,
            body,
        })
    }

    pub fn seal(&self, session: &Session, payload: &[Lv]) -> Result<SecuredResponseBody, SessionError> {
        Ok(SecuredResponseBody {
            d: session.pack(payload)?,
        })
    }

    /// Seal a synthetic `(status, header, body)` response.
    pub fn seal_response(
        &self,
        session: &Session,
        status: u16,
        header: &Headers,
        body: &[u8],
    ) -> Result<SecuredResponseBody, SessionError> {
        self.seal(session, &secured::encode_response(status, header, body)?)
    }
}

impl Default for Responder {
    fn default() -> Self {
        Self::new(PrekeyStoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dx_envelope::PrekeyBundle;

    #[tokio::test]
    async fn open_and_reply() {
        let responder = Responder::default();
        let client = PrekeyBundle::generate();
        let response = responder.prekey(&client.request()).await.unwrap();
        let session = client.complete(&response).unwrap();

        let payload = secured::encode_request(&Headers::new(), &serde_json::json!({"n": 1})).unwrap();
        let body = SecuredRequestBody {
            i: response.i.clone(),
            d: session.pack(&payload).unwrap(),
        };

        let opened = responder.open_request(&body).await.unwrap();
        assert_eq!(opened.body["n"], 1);

        let reply = responder
            .seal_response(&opened.session, 201, &Headers::new(), b"created")
            .unwrap();
        let synthetic = secured::decode_response(&session.unpack(&reply.d).unwrap()).unwrap();
        assert_eq!(synthetic.status, 201);
        assert_eq!(synthetic.body, b"created");

        // Prekey was consumed by the first open.
        assert!(matches!(
            responder.open(&body).await,
            Err(SessionError::PrekeyNotFound)
        ));
    }

    #[tokio::test]
    async fn tampered_request_consumes_prekey() {
        let responder = Responder::default();
        let client = PrekeyBundle::generate();
        let response = responder.prekey(&client.request()).await.unwrap();
        let session = client.complete(&response).unwrap();

        let mut d = session.pack(&[Lv::from_utf8("x")]).unwrap();
        d.replace_range(20..21, if &d[20..21] == "0" { "1" } else { "0" });
        let body = SecuredRequestBody { i: response.i, d };

        let err = responder.open(&body).await.err().unwrap();
        assert_eq!(err.kind(), "INVALID_SIGNATURE");
        assert!(responder.store().is_empty().await);
    }
}
