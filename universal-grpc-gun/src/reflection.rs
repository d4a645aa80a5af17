//! Client side of the gRPC server reflection protocol.
//!
//! `v1` and `v1alpha` carry identical messages in different packages, so both are generated
//! from one template and translated to [`Query`] and [`Answer`].

use prost::Message;
use prost_types::FileDescriptorProto;
use tonic::{transport::Channel, Code};

use crate::{config::ReflectionVersion, error::DiscoveryError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    ListServices,
    FileContainingSymbol(String),
    FileByFilename(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Services(Vec<String>),
    Files(Vec<Vec<u8>>),
    Error { code: i32, message: String },
    Other,
}

macro_rules! reflection_protocol {
    ($version:ident) => {
        mod $version {
            use futures::TryStreamExt;
            use tonic::transport::Channel;
            use tonic_reflection::pb::$version::{
                server_reflection_client::ServerReflectionClient, server_reflection_request::MessageRequest,
                server_reflection_response::MessageResponse, ServerReflectionRequest,
            };

            use super::{Answer, Query};

            pub async fn exchange(
                channel: Channel,
                host: &str,
                queries: Vec<Query>,
            ) -> Result<Vec<Answer>, tonic::Status> {
                let requests: Vec<_> = queries
                    .into_iter()
                    .map(|query| ServerReflectionRequest {
                        host: host.to_string(),
                        message_request: Some(match query {
                            Query::ListServices => MessageRequest::ListServices(String::new()),
                            Query::FileContainingSymbol(symbol) => MessageRequest::FileContainingSymbol(symbol),
                            Query::FileByFilename(filename) => MessageRequest::FileByFilename(filename),
                        }),
                    })
                    .collect();

                let mut client = ServerReflectionClient::new(channel);
                let streaming = client.server_reflection_info(futures::stream::iter(requests)).await?.into_inner();
                streaming
                    .map_ok(|response| match response.message_response {
                        Some(MessageResponse::ListServicesResponse(list)) => {
                            Answer::Services(list.service.into_iter().map(|s| s.name).collect())
                        }
                        Some(MessageResponse::FileDescriptorResponse(files)) => {
                            Answer::Files(files.file_descriptor_proto)
                        }
                        Some(MessageResponse::ErrorResponse(error)) => {
                            Answer::Error { code: error.error_code, message: error.error_message }
                        }
                        _ => Answer::Other,
                    })
                    .try_collect()
                    .await
            }
        }
    };
}
reflection_protocol!(v1);
reflection_protocol!(v1alpha);

/// Reflection session over the gun's shared channel.
#[derive(Debug, Clone)]
pub struct ReflectionClient {
    channel: Channel,
    host: String,
    version: ReflectionVersion,
}
impl ReflectionClient {
    pub fn new(channel: Channel, host: String, version: ReflectionVersion) -> Self {
        Self { channel, host, version }
    }

    /// Version in use; `Auto` until the first exchange settles it.
    pub fn version(&self) -> ReflectionVersion {
        self.version
    }

    /// Send all queries on one stream and collect one answer per query.
    pub async fn exchange(&mut self, queries: Vec<Query>) -> Result<Vec<Answer>, DiscoveryError> {
        let expected = queries.len();
        let answers = match self.version {
            ReflectionVersion::V1 => v1::exchange(self.channel.clone(), &self.host, queries).await?,
            ReflectionVersion::V1alpha => v1alpha::exchange(self.channel.clone(), &self.host, queries).await?,
            ReflectionVersion::Auto => match v1::exchange(self.channel.clone(), &self.host, queries.clone()).await {
                Err(status) if status.code() == Code::Unimplemented => {
                    tracing::info!("reflection v1 is unimplemented by target, fall back to v1alpha");
                    let answers = v1alpha::exchange(self.channel.clone(), &self.host, queries).await?;
                    self.version = ReflectionVersion::V1alpha;
                    answers
                }
                answers => {
                    let answers = answers?;
                    self.version = ReflectionVersion::V1;
                    answers
                }
            },
        };
        if answers.len() < expected {
            return Err(DiscoveryError::EmptyResponse);
        }
        answers
            .into_iter()
            .map(|answer| match answer {
                Answer::Error { code, message } => Err(DiscoveryError::ErrorResponse { code, message }),
                answer => Ok(answer),
            })
            .collect()
    }

    pub async fn list_services(&mut self) -> Result<Vec<String>, DiscoveryError> {
        match self.exchange(vec![Query::ListServices]).await?.pop() {
            Some(Answer::Services(services)) => Ok(services),
            Some(_) => Err(DiscoveryError::UnexpectedResponse("list services response")),
            None => Err(DiscoveryError::EmptyResponse),
        }
    }

    pub async fn files_containing_symbols<I>(&mut self, symbols: I) -> Result<Vec<FileDescriptorProto>, DiscoveryError>
    where
        I: IntoIterator<Item = String>,
    {
        self.files(symbols.into_iter().map(Query::FileContainingSymbol).collect()).await
    }

    pub async fn files_by_filenames<I>(&mut self, filenames: I) -> Result<Vec<FileDescriptorProto>, DiscoveryError>
    where
        I: IntoIterator<Item = String>,
    {
        self.files(filenames.into_iter().map(Query::FileByFilename).collect()).await
    }

    async fn files(&mut self, queries: Vec<Query>) -> Result<Vec<FileDescriptorProto>, DiscoveryError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let mut protos = Vec::new();
        for answer in self.exchange(queries).await? {
            let Answer::Files(files) = answer else {
                return Err(DiscoveryError::UnexpectedResponse("file descriptor response"));
            };
            for file in files {
                protos.push(FileDescriptorProto::decode(&*file)?);
            }
        }
        Ok(protos)
    }
}
