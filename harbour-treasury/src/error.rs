use anyhow::format_err;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Treasury: insufficient funds on {address}: needed {needed} sat, spendable {available} sat")]
    InsufficientFunds {
        address: String,
        needed: i64,
        available: i64,
    },
    #[error("Treasury: selection exceeds the {0}-input cap")]
    TooManyInputs(usize),
    #[error("Treasury: conflict: {0}")]
    Conflict(String),
    #[error("Treasury: no usable node for role {0}")]
    NodeUnavailable(String),
    #[error("Treasury: broadcast rejected: {0}")]
    Broadcast(String),
    #[error("Treasury: timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Treasury: DBError error: {0:?}")]
    DBError(#[from] harbour_db::DBError),
    #[error("Treasury: IO error: {0:?}")]
    IOError(#[from] std::io::Error),
    #[error("Treasury: FromHexError error: {0:?}")]
    FromHexError(#[from] hex::FromHexError),
    #[error("Treasury: consensus encode error: {0:?}")]
    ConsensusEncodeError(#[from] bitcoin::consensus::encode::Error),
    #[error("Treasury: jsonrpsee error: {0:?}")]
    JsonrpseeError(#[from] jsonrpsee::core::Error),
    #[error("Treasury: serde_json error: {0:?}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Transport-level failures where the request never reached a node. A
    /// pool failover may cure these; everything else is either a chain-level
    /// verdict, an ambiguous outcome, or a local bug and must not be retried
    /// against another node.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::NodeUnavailable(_) => true,
            Error::JsonrpseeError(e) => matches!(e, jsonrpsee::core::Error::Transport(_)),
            _ => false,
        }
    }

    /// Ambiguous outcomes: the request may have been processed. Nothing is
    /// unlocked or resubmitted on these.
    pub fn is_ambiguous_timeout(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::JsonrpseeError(jsonrpsee::core::Error::RequestTimeout)
        )
    }
}

impl From<Box<dyn std::error::Error>> for Error {
    fn from(err: Box<dyn std::error::Error>) -> Error {
        Error::Other(format_err!("{err}"))
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(format_err!("{s}"))
    }
}
