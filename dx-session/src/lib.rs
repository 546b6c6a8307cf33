//! # dx-session
//!
//! Async session layer over `dx-envelope`.
//!
//! - [`Client`]: prekey handshake, login, secured calls, plain JSON calls
//! - [`Responder`]: peer side, backed by a single-use [`PrekeyStore`]
//! - [`Transport`]: the HTTP seam, with a reqwest implementation
//!
//! ```no_run
//! # async fn run() -> Result<(), dx_session::SessionError> {
//! use dx_session::{Client, ClientConfig, Headers};
//!
//! let mut client = Client::connect(ClientConfig::new("http://localhost:3000"))?;
//! client.login("demo", "demo-password").await?;
//!
//! let reply = client
//!     .secured_call("/e2ee/echo", &Headers::new(), &serde_json::json!({"hello": "world"}))
//!     .await?;
//! assert_eq!(reply.status, 200);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod client;
mod config;
mod error;
pub mod responder;
pub mod secured;
pub mod store;
mod transport;

pub use client::{Client, HandshakeOutcome, LoginOutcome, LoginSession};
pub use config::{ClientConfig, DEFAULT_LOGIN_PATH, DEFAULT_PREKEY_PATH, DEFAULT_TIMEOUT};
pub use error::SessionError;
pub use responder::{OpenedRequest, Responder};
pub use secured::{SecuredRequestBody, SecuredResponseBody};
pub use store::{PrekeyStore, PrekeyStoreConfig};
pub use transport::{Headers, HttpRequest, HttpResponse, ReqwestTransport, Transport};
