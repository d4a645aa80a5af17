//! Reflection enabled gRPC server whose services are only known at runtime.
//!
//! Serves `pkg.Svc` and `other.Svc` (see [`descriptor`]) plus `grpc.health.v1.Health`,
//! and exposes server reflection so that `universal-grpc-gun` can discover them.

use std::{net::SocketAddr, time::Duration};

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{server::Router, Server};
use tonic_health::{pb::health_server::HealthServer, server::HealthService};
use tower::layer::util::Identity;

use service::{DynamicServer, OtherSvc, PkgSvc, Recorder};

pub mod descriptor;
pub mod env;
pub mod service;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which versions of the reflection protocol are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Reflection {
    #[default]
    Both,
    V1,
    V1alpha,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Options {
    pub reflection: Reflection,
    pub slow: Duration,
}
impl Default for Options {
    fn default() -> Self {
        Self { reflection: Reflection::default(), slow: env::Env::default().slow }
    }
}

pub async fn serve(env: env::Env) -> Result<(), BoxError> {
    tracing_subscriber::fmt::init();
    let addr: SocketAddr = env.bind().parse()?;
    let server = app(&Options { slow: env.slow, ..Default::default() }, Recorder::new()).await?;

    tracing::info!("start app on {}", addr);
    server.serve(addr).await?;
    tracing::info!("stop app");

    Ok(())
}

pub async fn app(options: &Options, recorder: Recorder) -> Result<Router<Identity>, BoxError> {
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter.set_serving::<HealthServer<HealthService>>().await;
    health_reporter.set_serving::<DynamicServer<PkgSvc>>().await;
    health_reporter.set_serving::<DynamicServer<OtherSvc>>().await;

    let (v1, v1alpha) = match options.reflection {
        Reflection::Both => (Some(reflection().build_v1()?), Some(reflection().build_v1alpha()?)),
        Reflection::V1 => (Some(reflection().build_v1()?), None),
        Reflection::V1alpha => (None, Some(reflection().build_v1alpha()?)),
        Reflection::Disabled => (None, None),
    };

    let pool = descriptor::pool();
    Ok(Server::builder()
        .trace_fn(|_| tracing::info_span!(env!("CARGO_PKG_NAME")))
        .add_service(DynamicServer::<PkgSvc>::new(pool.clone(), recorder.clone(), options.slow))
        .add_service(DynamicServer::<OtherSvc>::new(pool, recorder, options.slow))
        .add_service(health_service)
        .add_optional_service(v1)
        .add_optional_service(v1alpha))
}

fn reflection() -> tonic_reflection::server::Builder<'static> {
    tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET)
        .register_file_descriptor_set(descriptor::file_descriptor_set())
}

/// Server running in the background on an ephemeral local port.
#[derive(Debug)]
pub struct DevServer {
    pub addr: SocketAddr,
    pub recorder: Recorder,
    handle: tokio::task::JoinHandle<Result<(), tonic::transport::Error>>,
}
impl DevServer {
    pub async fn spawn(options: Options) -> Result<Self, BoxError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let recorder = Recorder::new();
        let router = app(&options, recorder.clone()).await?;
        let handle = tokio::spawn(router.serve_with_incoming(TcpListenerStream::new(listener)));
        Ok(Self { addr, recorder, handle })
    }

    pub fn target(&self) -> String {
        self.addr.to_string()
    }
    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }
}
impl Drop for DevServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
