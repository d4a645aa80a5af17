use std::{
    collections::HashMap,
    convert::Infallible,
    future::Future,
    marker::PhantomData,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, MethodDescriptor};
use tonic::{
    body::Body,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder, ProstCodec},
    server::{Grpc, NamedService, UnaryService},
    Status,
};
use tower::Service;

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

/// Full name of a service that [`DynamicServer`] serves.
pub trait ServiceName: Clone + Send + Sync + 'static {
    const NAME: &'static str;
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PkgSvc;
impl ServiceName for PkgSvc {
    const NAME: &'static str = "pkg.Svc";
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct OtherSvc;
impl ServiceName for OtherSvc {
    const NAME: &'static str = "other.Svc";
}

/// One request accepted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub method: String,
    pub metadata: HashMap<String, String>,
}

/// Records every request reaching a handler, shared by all services of one server.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    hits: Arc<Mutex<Vec<Hit>>>,
}
impl Recorder {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn record(&self, hit: Hit) {
        self.hits.lock().unwrap_or_else(PoisonError::into_inner).push(hit);
    }
    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
    pub fn count(&self) -> usize {
        self.hits.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
    pub fn count_of(&self, method: &str) -> usize {
        self.hits.lock().unwrap_or_else(PoisonError::into_inner).iter().filter(|h| h.method == method).count()
    }
}

/// Serves every unary method of service `N` found in the pool.
/// `Slow` sleeps before answering, `Fail` answers with an error status, anything else echoes.
#[derive(Debug, Clone)]
pub struct DynamicServer<N> {
    pool: DescriptorPool,
    recorder: Recorder,
    slow: Duration,
    phantom: PhantomData<N>,
}
impl<N> DynamicServer<N> {
    pub fn new(pool: DescriptorPool, recorder: Recorder, slow: Duration) -> Self {
        Self { pool, recorder, slow, phantom: PhantomData }
    }
}
impl<N: ServiceName> NamedService for DynamicServer<N> {
    const NAME: &'static str = N::NAME;
}
impl<N: ServiceName> DynamicServer<N> {
    pub fn resolve(&self, path: &str) -> Option<MethodDescriptor> {
        // https://github.com/hyperium/tonic/blob/master/tonic-build/src/lib.rs#L212-L218
        let (service, method) = path.strip_prefix('/')?.split_once('/')?;
        if service != N::NAME {
            return None;
        }
        let found = self.pool.get_service_by_name(service)?.methods().find(|m| m.name() == method)?;
        (!found.is_client_streaming() && !found.is_server_streaming()).then_some(found)
    }
}

impl<N, B> Service<http::Request<B>> for DynamicServer<N>
where
    N: ServiceName,
    B: http_body::Body + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
{
    type Response = http::Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let path = req.uri().path().to_string();
        let resolved = self.resolve(&path);
        let (recorder, slow) = (self.recorder.clone(), self.slow);
        Box::pin(async move {
            match resolved {
                Some(method) => {
                    let mut grpc = Grpc::new(ServerCodec::new(method.input()));
                    Ok(grpc.unary(Handler { method, recorder, slow }, req).await)
                }
                None => {
                    let mut grpc = Grpc::new(ProstCodec::<(), ()>::default());
                    Ok(grpc.unary(Unimplemented(path), req).await)
                }
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct Handler {
    method: MethodDescriptor,
    recorder: Recorder,
    slow: Duration,
}
impl UnaryService<DynamicMessage> for Handler {
    type Response = DynamicMessage;
    type Future = BoxFuture<tonic::Response<Self::Response>, Status>;

    fn call(&mut self, request: tonic::Request<DynamicMessage>) -> Self::Future {
        let Self { method, recorder, slow } = self.clone();
        Box::pin(async move {
            let metadata = request
                .metadata()
                .iter()
                .filter_map(|kv| match kv {
                    tonic::metadata::KeyAndValueRef::Ascii(k, v) => {
                        Some((k.as_str().to_string(), v.to_str().ok()?.to_string()))
                    }
                    tonic::metadata::KeyAndValueRef::Binary(k, v) => {
                        Some((k.as_str().to_string(), String::from_utf8(v.to_bytes().ok()?.to_vec()).ok()?))
                    }
                })
                .collect();
            recorder.record(Hit { method: method.full_name().to_string(), metadata });
            tracing::info!(method = method.full_name(), "handle request");

            match method.name() {
                "Slow" => tokio::time::sleep(slow).await,
                "Fail" => return Err(Status::failed_precondition("this method always fails")),
                _ => {}
            }
            let mut response = DynamicMessage::new(method.output());
            response.transcode_from(request.get_ref()).map_err(|e| Status::internal(e.to_string()))?;
            Ok(tonic::Response::new(response))
        })
    }
}

#[derive(Debug, Clone)]
pub struct Unimplemented(String);
impl UnaryService<()> for Unimplemented {
    type Response = ();
    type Future = BoxFuture<tonic::Response<Self::Response>, Status>;

    fn call(&mut self, _request: tonic::Request<()>) -> Self::Future {
        let Self(path) = self.clone();
        Box::pin(async move { Err(Status::unimplemented(format!("no such method {path}"))) })
    }
}

#[derive(Debug, Clone)]
pub struct ServerCodec(MessageDescriptor);
impl ServerCodec {
    pub fn new(input: MessageDescriptor) -> Self {
        Self(input)
    }
}
impl Codec for ServerCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = ServerEncoder;
    type Decoder = ServerDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        ServerEncoder
    }
    fn decoder(&mut self) -> Self::Decoder {
        ServerDecoder(self.0.clone())
    }
}

#[derive(Debug)]
pub struct ServerEncoder;
impl Encoder for ServerEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(dst).map_err(|e| Status::internal(e.to_string()))
    }
}

#[derive(Debug)]
pub struct ServerDecoder(MessageDescriptor);
impl Decoder for ServerDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let Self(descriptor) = self;
        let message =
            DynamicMessage::decode(descriptor.clone(), src).map_err(|e| Status::invalid_argument(e.to_string()))?;
        Ok(Some(message))
    }
}
