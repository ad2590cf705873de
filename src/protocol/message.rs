use crate::error::ErrorDescriptor;
use crate::store::{Route, Value};
use serde::{Deserialize, Serialize};

/// Parameters for writing the store to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// Codec name, resolved on the server (`"json"`, `"yaml"`, ...)
    pub codec: String,
    /// Destination path on the server's filesystem
    pub path: String,
    /// Serialize concurrent saves to the same path
    pub threadsafe: bool,
}

impl SaveOptions {
    pub fn new(codec: impl Into<String>, path: impl Into<String>, threadsafe: bool) -> Self {
        Self {
            codec: codec.into(),
            path: path.into(),
            threadsafe,
        }
    }
}

/// Operation requested by an authenticated client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Set {
        route: Route,
        value: Value,
        save: Option<SaveOptions>,
    },
    Get {
        route: Route,
    },
    Delete {
        route: Route,
        save: Option<SaveOptions>,
    },
    Drop {
        route: Route,
        save: Option<SaveOptions>,
    },
    /// Whole tree, or the subtree at `route`
    All {
        route: Option<Route>,
    },
    Save(SaveOptions),
    Ping,
}

/// Successful result of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// `SET`: the value now stored and the leaf it replaced
    Stored {
        value: Value,
        previous: Option<Value>,
    },
    /// `GET`
    Value(Value),
    /// `DELETE` / `DROP`
    Removed,
    /// `ALL`
    Snapshot(Value),
    /// `SAVE`
    Saved { bytes: u64 },
    Pong,
}

/// Response frame payload: status `OK` with a reply, or `ERROR` with a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Ok(Reply),
    Error(ErrorDescriptor),
}

impl Response {
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }
}

/// Every frame exchanged on a Nemoria connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Server greeting, sent right after accept
    Hello {
        version: u8,
        namespace: String,
        nonce: [u8; 16],
    },
    /// Client proof of the shared secret
    Authenticate {
        namespace: String,
        credential: [u8; 32],
    },
    AuthAccepted,
    AuthRejected,
    Request(Request),
    Response(Response),
    Disconnect,
}

impl Message {
    /// Short name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "HELLO",
            Message::Authenticate { .. } => "AUTHENTICATE",
            Message::AuthAccepted => "AUTH_ACCEPTED",
            Message::AuthRejected => "AUTH_REJECTED",
            Message::Request(_) => "REQUEST",
            Message::Response(_) => "RESPONSE",
            Message::Disconnect => "DISCONNECT",
        }
    }
}
