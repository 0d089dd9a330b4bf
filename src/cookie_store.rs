use std::{
    fmt::Debug,
    io::{self, BufReader},
    path::PathBuf,
};

use fs_err::File;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

pub const CLIENT_ID_ENV: &str = "LUOGU_CLIENT_ID";
pub const UID_ENV: &str = "LUOGU_UID";

/// Session cookies of a logged-in browser (`__client_id` and `_uid`).
#[derive(Clone, TypedBuilder, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: ClientId,
    pub uid: SessionUid,
}
impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &"<hidden>")
            .field("uid", &self.uid)
            .finish()
    }
}

#[derive(Clone, derive_more::From, derive_more::Display, Serialize, Deserialize)]
pub struct ClientId(String);

#[derive(Clone, Debug, derive_more::From, derive_more::Display, Serialize, Deserialize)]
pub struct SessionUid(String);

impl Credentials {
    /// Builds credentials from two non-blank values.
    pub fn from_parts(client_id: &str, uid: &str) -> Option<Self> {
        let (client_id, uid) = (client_id.trim(), uid.trim());
        (!client_id.is_empty() && !uid.is_empty()).then(|| {
            Self::builder()
                .client_id(client_id.to_owned().into())
                .uid(uid.to_owned().into())
                .build()
        })
    }

    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var(CLIENT_ID_ENV).ok()?;
        let uid = std::env::var(UID_ENV).ok()?;
        Self::from_parts(&client_id, &uid)
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CredentialsLoadError> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    /// Value of the `Cookie` header carrying this session.
    pub fn cookie_header(&self) -> String {
        format!("__client_id={}; _uid={}", self.client_id, self.uid)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsLoadError {
    #[error("Credentials file was not found.")]
    NotFound,
    #[error("An I/O error occurred when loading the credentials: {0:?}")]
    IOError(io::Error),
    #[error("The credentials json file is corrupted and could not be loaded: {0:?}")]
    JsonError(#[from] serde_json::Error),
}
impl From<io::Error> for CredentialsLoadError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::IOError(e),
        }
    }
}
