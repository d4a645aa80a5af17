use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use http::uri::PathAndQuery;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use tonic::{
    client::Grpc,
    metadata::{AsciiMetadataKey, AsciiMetadataValue, BinaryMetadataKey, MetadataMap, MetadataValue},
    transport::Channel,
    Status,
};
use tower::{Service, ServiceExt};

use crate::{
    ammo::{Ammo, Metadata},
    catalog::ServiceCatalog,
    codec::MethodCodec,
    error::RequestError,
    marshal,
};

/// A unary call ready to be sent.
#[derive(Debug)]
pub struct GrpcCall {
    pub method: MethodDescriptor,
    pub request: tonic::Request<DynamicMessage>,
}
impl GrpcCall {
    /// `/package.Service/Method`
    pub fn path(&self) -> String {
        format!("/{}/{}", self.method.parent_service().full_name(), self.method.name())
    }
}

/// Issues calls of cataloged methods over the shared channel. Cloning is cheap, and clones share
/// the underlying http/2 connection.
#[derive(Debug, Clone)]
pub struct Invoker {
    inner: Grpc<Channel>,
    catalog: Arc<ServiceCatalog>,
}
impl Invoker {
    pub fn new(channel: Channel, catalog: Arc<ServiceCatalog>) -> Self {
        Self { inner: Grpc::new(channel), catalog }
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Resolve, marshal and attach metadata. Nothing is sent if this fails.
    pub fn prepare(&self, ammo: &Ammo) -> Result<GrpcCall, RequestError> {
        let method = self.catalog.get(&ammo.call).ok_or_else(|| RequestError::UnknownMethod(ammo.call.clone()))?;
        if method.is_client_streaming() || method.is_server_streaming() {
            return Err(RequestError::Streaming(ammo.call.clone()));
        }
        let message = marshal::build(&method.input(), &ammo.payload)?;

        let mut request = tonic::Request::new(message);
        if let Some(metadata) = &ammo.metadata {
            attach(metadata, request.metadata_mut())?;
        }
        Ok(GrpcCall { method: method.clone(), request })
    }

    pub async fn invoke(&self, ammo: &Ammo) -> Result<tonic::Response<DynamicMessage>, RequestError> {
        let call = self.prepare(ammo)?;
        tracing::debug!(path = %call.path(), "invoke");
        Ok(self.clone().oneshot(call).await?)
    }
}

impl Service<GrpcCall> for Invoker {
    type Response = tonic::Response<DynamicMessage>;
    type Error = Status;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // readiness of the channel is awaited in each call
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: GrpcCall) -> Self::Future {
        let mut inner = self.inner.clone();
        Box::pin(async move {
            inner.ready().await.map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;
            let path = PathAndQuery::try_from(call.path()).map_err(|e| Status::internal(e.to_string()))?;
            inner.unary(call.request, path, MethodCodec::new(call.method)).await
        })
    }
}

/// Attach metadata in order. A repeated key keeps only its last value. Keys ending in `-bin`
/// carry the raw bytes of their value.
pub fn attach(metadata: &Metadata, map: &mut MetadataMap) -> Result<(), RequestError> {
    for (key, value) in metadata.iter() {
        let invalid = |reason: String| RequestError::Metadata { key: key.to_string(), reason };
        if key.ends_with("-bin") {
            let k = BinaryMetadataKey::from_bytes(key.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            map.insert_bin(k, MetadataValue::from_bytes(value.as_bytes()));
        } else {
            let k = AsciiMetadataKey::from_bytes(key.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let v = AsciiMetadataValue::try_from(value).map_err(|e| invalid(e.to_string()))?;
            map.insert(k, v);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tonic::transport::Endpoint;
    use universal_grpc_gun_dev_server::descriptor;

    use super::*;

    fn invoker() -> Invoker {
        let catalog = descriptor::pool().services().flat_map(|s| s.methods().collect::<Vec<_>>()).collect();
        let channel = Endpoint::from_static("http://127.0.0.1:1").connect_lazy();
        Invoker::new(channel, Arc::new(catalog))
    }

    #[tokio::test]
    async fn test_prepare() {
        let ammo = Ammo::new("t1", "other.Svc.Echo", json!({"msg": "hi"})).with_metadata([("x", "1")]);
        let call = invoker().prepare(&ammo).unwrap();

        assert_eq!(call.path(), "/other.Svc/Echo");
        assert_eq!(call.request.get_ref().get_field_by_name("msg").unwrap().as_str(), Some("hi"));
        assert_eq!(call.request.metadata().get("x").unwrap(), "1");
    }

    #[tokio::test]
    async fn test_prepare_rejections() {
        let invoker = invoker();

        let unknown = invoker.prepare(&Ammo::new("t", "pkg.Svc.Nope", json!({})));
        assert!(matches!(unknown, Err(RequestError::UnknownMethod(call)) if call == "pkg.Svc.Nope"));

        let streaming = invoker.prepare(&Ammo::new("t", "pkg.Svc.Chat", json!({"msg": "hi"})));
        assert!(matches!(streaming, Err(RequestError::Streaming(_))));

        let mismatch = invoker.prepare(&Ammo::new("t", "pkg.Svc.Echo", json!({"msg": 1})));
        assert!(matches!(mismatch, Err(RequestError::Marshal(_))));

        let bad_key = Ammo::new("t", "pkg.Svc.Echo", json!({})).with_metadata([("bad key", "1")]);
        assert!(matches!(invoker.prepare(&bad_key), Err(RequestError::Metadata { key, .. }) if key == "bad key"));

        let bad_value = Ammo::new("t", "pkg.Svc.Echo", json!({})).with_metadata([("x", "line\nbreak")]);
        assert!(matches!(invoker.prepare(&bad_value), Err(RequestError::Metadata { .. })));
    }

    #[test]
    fn test_attach() {
        let metadata: Metadata = [("x", "1"), ("trace-bin", "\u{1}raw"), ("x", "2")].into_iter().collect();
        let mut map = MetadataMap::new();
        attach(&metadata, &mut map).unwrap();

        assert_eq!(map.get("x").unwrap(), "2");
        assert_eq!(map.get_all("x").iter().count(), 1);
        assert_eq!(map.get_bin("trace-bin").unwrap().to_bytes().unwrap().as_ref(), b"\x01raw");
    }
}
