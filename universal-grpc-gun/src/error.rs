use thiserror::Error;

pub type GunResult<T, E = GunError> = Result<T, E>;

#[derive(Error, Debug)]
#[error(transparent)]
pub enum GunError {
    SetupError(#[from] SetupError),
    RequestError(#[from] RequestError),
    ConfigError(#[from] ConfigError),
    AmmoError(#[from] AmmoError),
    HistogramError(#[from] hdrhistogram::CreationError),
}

/// Failures while binding a gun. Nothing can be shot after one of these.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("invalid target '{target}': {source}")]
    InvalidTarget { target: String, source: http::uri::InvalidUri },
    #[error("invalid user agent '{user_agent}': {source}")]
    InvalidUserAgent { user_agent: String, source: tonic::transport::Error },
    #[error("cannot connect to '{target}': {source}")]
    Connect { target: String, source: tonic::transport::Error },
    #[error("cannot discover services: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("gun is already bound")]
    AlreadyBound,
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("reflection rpc failed: {0}")]
    Rpc(#[from] tonic::Status),
    #[error("reflection error response {code}: {message}")]
    ErrorResponse { code: i32, message: String },
    #[error("reflection stream ended without a response")]
    EmptyResponse,
    #[error("unexpected reflection response, expected {0}")]
    UnexpectedResponse(&'static str),
    #[error("cannot decode file descriptor: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("cannot build descriptor pool: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),
    #[error("file {0} is imported but the target does not serve it")]
    MissingFile(String),
    #[error("listed service {0} is not defined by any served file")]
    UnresolvedService(String),
}

/// Failures of a single shot. They never outlive the shot that produced them.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("no such method: {0}")]
    UnknownMethod(String),
    #[error("bad request: {0}")]
    Marshal(#[from] MarshalError),
    #[error("streaming method {0} cannot be shot as unary")]
    Streaming(String),
    #[error("invalid metadata '{key}': {reason}")]
    Metadata { key: String, reason: String },
    #[error("rpc failed: {0}")]
    Invoke(#[from] tonic::Status),
}

#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch { path: String, expected: &'static str, found: &'static str },
    #[error("{path}: {value} is out of range for {expected}")]
    OutOfRange { path: String, value: String, expected: &'static str },
    #[error("{path}: {reason}")]
    InvalidValue { path: String, reason: String },
    #[error(transparent)]
    Build(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("target must not be empty")]
    EmptyTarget,
    #[error("unknown config format extension: {0}")]
    UnknownFormatExtension(String),
    #[error("cannot specify config format of {0}")]
    CannotSpecifyFormat(String),
    #[error("cannot read config {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "yaml")]
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[cfg(feature = "toml")]
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum AmmoError {
    #[error("cannot read ammo: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid ammo at line {line}: {source}")]
    Parse { line: usize, source: serde_json::Error },
}
