//! Client side: handshake, login, secured calls and plain JSON calls.
//!
//! Every secured call runs its own handshake, so each exchange gets fresh
//! keys and its own `Session`. Only the login token survives between calls.

use dx_envelope::{Lv, PrekeyBundle, PrekeyResponse, Session};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::secured::{self, SecuredRequestBody};
use crate::transport::{Headers, HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Result of `establish_session`.
#[derive(Debug)]
pub enum HandshakeOutcome {
    Established(Session),
    /// Prekey endpoint answered with a non-200 status; passed through as is.
    Rejected(HttpResponse),
}

#[derive(Debug)]
pub enum LoginOutcome {
    LoggedIn { user_id: String },
    Rejected(HttpResponse),
}

/// Token issued by a successful login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginSession {
    pub session_key: String,
    pub user_id: String,
}

#[derive(Deserialize)]
struct LoginReply {
    session_key: String,
    #[serde(default)]
    user_id: Value,
}

pub struct Client<T = ReqwestTransport> {
    config: ClientConfig,
    transport: T,
    login: Option<LoginSession>,
}

impl Client<ReqwestTransport> {
    /// Client over reqwest with the configured timeout.
    pub fn connect(config: ClientConfig) -> Result<Self, SessionError> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::new(config, transport))
    }
}

impl<T: Transport> Client<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            login: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn login_session(&self) -> Option<&LoginSession> {
        self.login.as_ref()
    }

    pub fn session_key(&self) -> Option<&str> {
        self.login.as_ref().map(|l| l.session_key.as_str())
    }

    /// Forget the login token. Later calls go out without `Authorization`.
    pub fn clear_login(&mut self) {
        self.login = None;
    }

    fn headers(&self) -> Headers {
        let mut headers = Headers::new();
        if let Some(login) = &self.login {
            headers.insert(
                "Authorization".into(),
                format!("Bearer {}", login.session_key),
            );
        }
        headers
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Result<HttpResponse, SessionError> {
        self.transport
            .post_json(HttpRequest {
                url: self.config.url(path),
                headers: self.headers(),
                body,
            })
            .await
    }

    /// Run the prekey handshake against the configured prekey endpoint.
    pub async fn establish_session(&self) -> Result<HandshakeOutcome, SessionError> {
        let bundle = PrekeyBundle::generate();
        let request = serde_json::to_value(bundle.request())?;
        let response = self.post(&self.config.prekey_path, Some(request)).await?;
        if !response.is_ok() {
            warn!(status = response.status, "prekey request rejected");
            return Ok(HandshakeOutcome::Rejected(response));
        }

        let reply: PrekeyResponse = response.json()?;
        let session = bundle.complete(&reply)?;
        info!(prekey = session.prekey_index(), "session established");
        Ok(HandshakeOutcome::Established(session))
    }

    /// Handshake, then send `payload` sealed to `path`. Returns the session
    /// (to open the reply) and the raw HTTP reply, or the rejected handshake.
    async fn send_sealed(
        &self,
        path: &str,
        payload: &[Lv],
    ) -> Result<Result<(Session, HttpResponse), HttpResponse>, SessionError> {
        let session = match self.establish_session().await? {
            HandshakeOutcome::Established(session) => session,
            HandshakeOutcome::Rejected(response) => return Ok(Err(response)),
        };
        let body = SecuredRequestBody {
            i: session.prekey_index().to_string(),
            d: session.pack(payload)?,
        };
        let response = self.post(path, Some(serde_json::to_value(&body)?)).await?;
        Ok(Ok((session, response)))
    }

    /// Secured call: the `(header, body)` pair travels sealed and the reply
    /// is opened back into a synthetic response.
    ///
    /// A rejected handshake is returned unchanged. So is a reply without a
    /// `d` field, which is how a peer answers when it could not open the
    /// request.
    pub async fn secured_call(
        &self,
        path: &str,
        header: &Headers,
        body: &Value,
    ) -> Result<HttpResponse, SessionError> {
        let payload = secured::encode_request(header, body)?;
        let (session, response) = match self.send_sealed(path, &payload).await? {
            Ok(sent) => sent,
            Err(rejected) => return Ok(rejected),
        };

        let envelope = match response.json::<Value>().ok().and_then(|v| envelope_field(&v)) {
            Some(d) => d,
            None => {
                debug!(status = response.status, path, "secured reply carried no envelope");
                return Ok(response);
            }
        };
        let synthetic = secured::decode_response(&session.unpack(&envelope)?)?;
        debug!(path, status = synthetic.status, "secured call complete");
        Ok(synthetic)
    }

    /// Log in with a fresh handshake. On success the session key is kept
    /// and sent as a bearer token on later calls.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<LoginOutcome, SessionError> {
        let payload = [Lv::from_utf8(user), Lv::from_utf8(password)];
        let login_path = self.config.login_path.clone();
        let (session, response) = match self.send_sealed(&login_path, &payload).await? {
            Ok(sent) => sent,
            Err(rejected) => return Ok(LoginOutcome::Rejected(rejected)),
        };
        if !response.is_ok() {
            warn!(status = response.status, "login rejected");
            return Ok(LoginOutcome::Rejected(response));
        }

        let envelope = envelope_field(&response.json::<Value>()?).ok_or(SessionError::MissingField("d"))?;
        let payload = session.unpack(&envelope)?;
        let first = payload.first().ok_or(SessionError::MissingField("session"))?;
        let reply: LoginReply = serde_json::from_slice(first.value())?;
        if reply.session_key.is_empty() {
            return Err(SessionError::EmptySessionKey);
        }

        let user_id = match reply.user_id {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        info!(user_id = %user_id, "logged in");
        self.login = Some(LoginSession {
            session_key: reply.session_key,
            user_id: user_id.clone(),
        });
        Ok(LoginOutcome::LoggedIn { user_id })
    }

    /// Plain JSON POST, with the bearer token when logged in.
    ///
    /// # Panics
    ///
    /// With `assert_200` set, any status other than 200 halts execution.
    /// This is the fail-fast contract of the plain convenience calls;
    /// use `assert_200 = false` to inspect failures instead.
    pub async fn post_json(
        &self,
        path: &str,
        body: Option<Value>,
        assert_200: bool,
    ) -> Result<HttpResponse, SessionError> {
        let response = self.post(path, body).await?;
        if assert_200 && !response.is_ok() {
            panic!(
                "{}: status code is {} (execution halted)",
                self.config.url(path),
                response.status
            );
        }
        Ok(response)
    }
}

fn envelope_field(value: &Value) -> Option<String> {
    value.get("d").and_then(Value::as_str).map(str::to_string)
}
