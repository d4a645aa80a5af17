use universal_grpc_gun::{
    catalog,
    config::{GunConfig, ReflectionVersion},
    connection,
    reflection::ReflectionClient,
};
use universal_grpc_gun_dev_server::{DevServer, Options, Reflection};

async fn client(server: &DevServer) -> ReflectionClient {
    let config = GunConfig::new(server.target());
    let channel = connection::connect(&config).await.unwrap();
    ReflectionClient::new(channel, connection::target_host(&config.target), config.reflection)
}

#[tokio::test]
async fn test_discover_is_idempotent() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let mut client = client(&server).await;

    let first = catalog::discover(&mut client).await.unwrap();
    let second = catalog::discover(&mut client).await.unwrap();
    assert_eq!(first.names(), second.names());
    assert_eq!(client.version(), ReflectionVersion::V1);
}

#[tokio::test]
async fn test_discover_resolves_imports() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let catalog = catalog::discover(&mut client(&server).await).await.unwrap();

    for name in ["pkg.Svc.Echo", "pkg.Svc.Slow", "pkg.Svc.Fail", "pkg.Svc.Typed", "pkg.Svc.Chat", "other.Svc.Echo"] {
        assert!(catalog.contains(name), "{name} must be discovered");
    }
    assert!(catalog.contains("grpc.health.v1.Health.Check"));

    // `other.Svc.Echo` takes a message defined in the imported `pkg/echo.proto`
    let other = catalog.get("other.Svc.Echo").unwrap();
    assert_eq!(other.input().full_name(), "pkg.EchoRequest");
    assert_eq!(other.parent_file().name(), "other/echo.proto");
    assert_ne!(catalog.get("pkg.Svc.Echo").unwrap(), other);
}

#[tokio::test]
async fn test_discover_v1alpha() {
    let server = DevServer::spawn(Options { reflection: Reflection::V1alpha, ..Default::default() }).await.unwrap();
    let mut client = client(&server).await;

    let catalog = catalog::discover(&mut client).await.unwrap();
    assert!(catalog.contains("other.Svc.Echo"));
    assert_eq!(client.version(), ReflectionVersion::V1alpha);
}
