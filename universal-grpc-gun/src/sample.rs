use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Outcome of one shot. The coarse three valued status does not follow the target's native codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum StatusCode {
    /// request was never sent, or sent and failed
    #[default]
    Unset,
    Ok,
    BadRequest,
}
impl StatusCode {
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Unset => 0,
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
        }
    }
}
impl From<StatusCode> for u16 {
    fn from(status: StatusCode) -> Self {
        status.code()
    }
}
impl TryFrom<u16> for StatusCode {
    type Error = String;
    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(StatusCode::Unset),
            200 => Ok(StatusCode::Ok),
            400 => Ok(StatusCode::BadRequest),
            _ => Err(format!("{code} is not a sample status code")),
        }
    }
}
impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Classify the result of a shot.
///
/// Marshaling failures are the caller's fault and count as 400. Everything else that went
/// wrong leaves the code unset, whatever status the target answered with.
pub fn classify<T>(outcome: &Result<T, RequestError>) -> StatusCode {
    match outcome {
        Ok(_) => StatusCode::Ok,
        Err(RequestError::Marshal(_)) => StatusCode::BadRequest,
        Err(
            RequestError::UnknownMethod(_)
            | RequestError::Streaming(_)
            | RequestError::Metadata { .. }
            | RequestError::Invoke(_),
        ) => StatusCode::Unset,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    pub tag: String,
    pub elapsed: Duration,
    pub status: StatusCode,
}

/// Running clock of a sample, started before anything else of the shot happens.
#[derive(Debug, Clone)]
pub struct Acquired {
    tag: String,
    start: Instant,
}
impl Sample {
    pub fn acquire<S: Into<String>>(tag: S) -> Acquired {
        Acquired { tag: tag.into(), start: Instant::now() }
    }
}
impl Acquired {
    pub fn tag(&self) -> &str {
        &self.tag
    }
    pub fn finish(self, status: StatusCode) -> Sample {
        Sample { tag: self.tag, elapsed: self.start.elapsed(), status }
    }
}
