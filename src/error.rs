use thiserror::Error;

/// A feed call that produced no usable payload. Every variant means "try
/// again later", never "there are no matches".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Transport(String),
    #[error("feed returned http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("feed payload could not be decoded: {0}")]
    Decode(String),
    #[error("feed has no data for {0}")]
    Missing(String),
}

/// One upstream match record that cannot be reconciled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedMatch {
    #[error("match record is not an object: {0}")]
    Shape(String),
    #[error("match record has no competition id")]
    MissingCompetition,
    #[error("match record has no {side} team name")]
    MissingTeam { side: &'static str },
    #[error("match record has an unparseable utcDate {0:?}")]
    BadDate(String),
}
