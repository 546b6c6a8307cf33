//! Payload encoding for secured calls.
//!
//! Request payload LVs:
//!   [ base64(JSON header), base64(JSON body) ]
//! Response payload LVs:
//!   [ base64(u64 big-endian status), base64(JSON header), base64(body) ]
//!
//! Both travel inside an envelope; the outer HTTP body is `{"i", "d"}` for
//! requests and `{"d"}` for replies. Base64 is the standard alphabet with
//! padding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use dx_envelope::Lv;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;
use crate::transport::{Headers, HttpResponse};

/// Outer JSON body of a secured request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuredRequestBody {
    /// Prekey index from the handshake.
    pub i: String,
    /// Hex envelope.
    pub d: String,
}

/// Outer JSON body of a secured reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuredResponseBody {
    pub d: String,
}

pub fn encode_request(header: &Headers, body: &Value) -> Result<Vec<Lv>, SessionError> {
    Ok(vec![b64_lv(&serde_json::to_vec(header)?), b64_lv(&serde_json::to_vec(body)?)])
}

/// Peer side of `encode_request`. An empty body decodes to `null`.
pub fn decode_request(payload: &[Lv]) -> Result<(Headers, Value), SessionError> {
    let header = payload.first().ok_or(SessionError::MissingField("header"))?;
    let body = payload.get(1).ok_or(SessionError::MissingField("body"))?;

    let header: Headers = serde_json::from_slice(&unb64(header)?)?;
    let body = unb64(body)?;
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((header, body))
}

pub fn encode_response(status: u16, header: &Headers, body: &[u8]) -> Result<Vec<Lv>, SessionError> {
    Ok(vec![
        b64_lv(&u64::from(status).to_be_bytes()),
        b64_lv(&serde_json::to_vec(header)?),
        b64_lv(body),
    ])
}

/// Rebuild the synthetic response carried by a secured reply.
pub fn decode_response(payload: &[Lv]) -> Result<HttpResponse, SessionError> {
    let status = payload.first().ok_or(SessionError::MissingField("status"))?;
    let header = payload.get(1).ok_or(SessionError::MissingField("header"))?;
    let body = payload.get(2).ok_or(SessionError::MissingField("body"))?;

    let status = unb64(status)?;
    let status: [u8; 8] = status
        .as_slice()
        .try_into()
        .map_err(|_| SessionError::MissingField("status"))?;
    let status = u16::try_from(u64::from_be_bytes(status))
        .map_err(|_| SessionError::MissingField("status"))?;

    let header = unb64(header)?;
    let headers = if header.is_empty() {
        Headers::new()
    } else {
        serde_json::from_slice(&header)?
    };

    Ok(HttpResponse {
        status,
        headers,
        body: unb64(body)?,
    })
}

fn b64_lv(bytes: &[u8]) -> Lv {
    Lv::from_utf8(&BASE64.encode(bytes))
}

fn unb64(lv: &Lv) -> Result<Vec<u8>, SessionError> {
    Ok(BASE64.decode(lv.value())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Headers {
        [("Content-Type".to_string(), "application/json".to_string())]
            .into_iter()
            .collect()
    }

    #[test]
    fn request_lvs_are_base64_json() {
        let lvs = encode_request(&header(), &serde_json::json!({"id": 7})).unwrap();
        assert_eq!(lvs.len(), 2);
        assert_eq!(
            BASE64.decode(lvs[1].value()).unwrap(),
            br#"{"id":7}"#.to_vec()
        );

        let (h, b) = decode_request(&lvs).unwrap();
        assert_eq!(h, header());
        assert_eq!(b["id"], 7);
    }

    #[test]
    fn status_is_eight_bytes_big_endian() {
        let lvs = encode_response(404, &Headers::new(), b"missing").unwrap();
        assert_eq!(lvs.len(), 3);
        assert_eq!(lvs[0].value_as_string(), BASE64.encode([0, 0, 0, 0, 0, 0, 1, 0x94]));

        let resp = decode_response(&lvs).unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, b"missing");
        assert!(resp.headers.is_empty());
    }

    #[test]
    fn short_payloads_rejected() {
        assert!(matches!(
            decode_request(&[Lv::from_utf8("e30=")]),
            Err(SessionError::MissingField("body"))
        ));
        assert!(matches!(
            decode_response(&[]),
            Err(SessionError::MissingField("status"))
        ));
    }

    #[test]
    fn bad_base64_rejected() {
        let lvs = vec![Lv::from_utf8("!!!"), Lv::from_utf8("")];
        assert!(matches!(decode_request(&lvs), Err(SessionError::Base64(_))));
    }

    #[test]
    fn outer_bodies_use_short_keys() {
        let body = SecuredRequestBody {
            i: "abc".into(),
            d: "00".into(),
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"i":"abc","d":"00"}"#);
    }
}
