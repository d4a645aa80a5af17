use tonic::transport::{Channel, Endpoint};

use crate::{config::GunConfig, error::SetupError};

/// Normalize `host:port` to a plaintext uri, as a bare address is dialed without tls.
pub fn target_uri(target: &str) -> String {
    let target = target.trim();
    if target.contains("://") {
        target.to_string()
    } else {
        format!("http://{target}")
    }
}

/// Host part of the target, sent as the `host` of reflection requests.
pub fn target_host(target: &str) -> String {
    target_uri(target).parse::<http::Uri>().ok().and_then(|uri| uri.host().map(str::to_string)).unwrap_or_default()
}

pub fn endpoint(config: &GunConfig) -> Result<Endpoint, SetupError> {
    let uri = target_uri(&config.target);
    Channel::from_shared(uri.clone())
        .map_err(|source| SetupError::InvalidTarget { target: uri, source })?
        .user_agent(config.user_agent.clone())
        .map_err(|source| SetupError::InvalidUserAgent { user_agent: config.user_agent.clone(), source })
}

/// Establish the one session every shot of a gun is multiplexed over. No retries.
#[tracing::instrument(skip(config), fields(target = %config.target))]
pub async fn connect(config: &GunConfig) -> Result<Channel, SetupError> {
    let channel = endpoint(config)?
        .connect()
        .await
        .map_err(|source| SetupError::Connect { target: config.target.clone(), source })?;
    tracing::info!("connected");
    Ok(channel)
}
