use std::{sync::Arc, time::Duration};

use assert_json_diff::assert_json_include;
use futures::StreamExt;
use serde_json::json;
use tonic::Code;
use universal_grpc_gun::{
    aggregate::{ChannelAggregator, HistogramAggregator},
    ammo::Ammo,
    command::GunCommand,
    config::{GunConfig, ReflectionVersion},
    error::{DiscoveryError, RequestError, SetupError},
    gun::{GrpcGun, Gun, GunDeps},
    invoke::Invoker,
    marshal,
    sample::{Sample, StatusCode},
};
use universal_grpc_gun_dev_server::{DevServer, Options, Reflection};

async fn bound(server: &DevServer) -> (GrpcGun<ChannelAggregator>, tokio::sync::mpsc::UnboundedReceiver<Sample>) {
    let (aggregator, rx) = ChannelAggregator::new();
    let mut gun = GrpcGun::new(GunConfig::new(server.target()));
    gun.bind(aggregator, GunDeps::default()).await.unwrap();
    (gun, rx)
}

#[tokio::test]
async fn test_echo_with_metadata() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let (gun, mut rx) = bound(&server).await;

    let ammo = Ammo::new("t1", "pkg.Svc.Echo", json!({"msg": "hi"})).with_metadata([("x", "1")]);
    gun.shoot(ammo).await;

    let sample = rx.recv().await.unwrap();
    assert_eq!(sample.tag, "t1");
    assert_eq!(sample.status, StatusCode::Ok);
    assert_eq!(server.recorder.count_of("pkg.Svc.Echo"), 1);
    assert_eq!(server.recorder.count(), 1);
    assert_eq!(server.recorder.hits()[0].metadata.get("x").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn test_metadata_last_value_wins_through_value() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let (gun, mut rx) = bound(&server).await;

    let value = json!({"tag": "t1", "call": "pkg.Svc.Echo", "metadata": {"x": "first", "X": "last"}, "payload": {"msg": "hi"}});
    gun.shoot(serde_json::from_value::<Ammo>(value).unwrap()).await;

    assert_eq!(rx.recv().await.unwrap().status, StatusCode::Ok);
    assert_eq!(server.recorder.hits()[0].metadata.get("x").map(String::as_str), Some("last"));
}

#[tokio::test]
async fn test_unknown_method_is_not_sent() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let (gun, mut rx) = bound(&server).await;

    gun.shoot(Ammo::new("t2", "pkg.Svc.Nope", json!({"msg": "hi"}))).await;
    gun.shoot(Ammo::new("t3", "Echo", json!({"msg": "hi"}))).await;

    assert_eq!(rx.recv().await.unwrap().status, StatusCode::Unset);
    assert_eq!(rx.recv().await.unwrap().status, StatusCode::Unset);
    assert_eq!(server.recorder.count(), 0);
}

#[tokio::test]
async fn test_type_mismatch_is_bad_request() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let (gun, mut rx) = bound(&server).await;

    gun.shoot(Ammo::new("t4", "pkg.Svc.Echo", json!({"msg": 42}))).await;
    gun.shoot(Ammo::new("t5", "pkg.Svc.Typed", json!({"count": "1"}))).await;

    let (first, second) = (rx.recv().await.unwrap(), rx.recv().await.unwrap());
    assert_eq!((first.tag.as_str(), first.status), ("t4", StatusCode::BadRequest));
    assert_eq!((second.tag.as_str(), second.status), ("t5", StatusCode::BadRequest));
    assert_eq!(server.recorder.count(), 0);
}

#[tokio::test]
async fn test_rpc_error_is_unset() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let (gun, mut rx) = bound(&server).await;

    gun.shoot(Ammo::new("t6", "pkg.Svc.Fail", json!({"msg": "hi"}))).await;

    assert_eq!(rx.recv().await.unwrap().status, StatusCode::Unset);
    assert_eq!(server.recorder.count_of("pkg.Svc.Fail"), 1);
}

#[tokio::test]
async fn test_streaming_method_is_not_sent() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let (gun, mut rx) = bound(&server).await;

    gun.shoot(Ammo::new("t7", "pkg.Svc.Chat", json!({"msg": "hi"}))).await;

    assert_eq!(rx.recv().await.unwrap().status, StatusCode::Unset);
    assert_eq!(server.recorder.count(), 0);
}

#[tokio::test]
async fn test_same_method_name_in_other_service() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let (gun, mut rx) = bound(&server).await;

    gun.shoot(Ammo::new("other", "other.Svc.Echo", json!({"msg": "hi"}))).await;
    gun.shoot(Ammo::new("pkg", "pkg.Svc.Echo", json!({"msg": "hi"}))).await;

    assert_eq!(rx.recv().await.unwrap().status, StatusCode::Ok);
    assert_eq!(rx.recv().await.unwrap().status, StatusCode::Ok);
    assert_eq!(server.recorder.count_of("other.Svc.Echo"), 1);
    assert_eq!(server.recorder.count_of("pkg.Svc.Echo"), 1);
}

#[tokio::test]
async fn test_health_check() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let (gun, mut rx) = bound(&server).await;

    gun.shoot(Ammo::new("health", "grpc.health.v1.Health.Check", json!({}))).await;
    assert_eq!(rx.recv().await.unwrap().status, StatusCode::Ok);
}

#[tokio::test]
async fn test_concurrent_slow_shots() {
    let slow = Duration::from_millis(50);
    let server = DevServer::spawn(Options { slow, ..Default::default() }).await.unwrap();
    let (gun, mut rx) = bound(&server).await;

    let gun = &gun;
    let start = std::time::Instant::now();
    futures::stream::iter(0..100)
        .map(|i| gun.shoot(Ammo::new(format!("slow-{i}"), "pkg.Svc.Slow", json!({"msg": "zzz"}))))
        .buffer_unordered(100)
        .for_each(|()| async {})
        .await;
    let wall = start.elapsed();

    let mut samples = Vec::new();
    while let Ok(sample) = rx.try_recv() {
        samples.push(sample);
    }
    assert_eq!(samples.len(), 100);
    assert!(samples.iter().all(|s| s.status == StatusCode::Ok && s.elapsed >= slow));
    assert_eq!(server.recorder.count_of("pkg.Svc.Slow"), 100);
    assert!(wall < slow * 20, "shots must overlap, but 100 shots took {wall:?}");
}

#[tokio::test]
async fn test_typed_response_read_back() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let (gun, _rx) = bound(&server).await;
    let catalog = Arc::new(gun.catalog().unwrap().clone());
    let channel = universal_grpc_gun::connection::connect(gun.config()).await.unwrap();
    let invoker = Invoker::new(channel, catalog);

    let payload = json!({"count": 3, "total": "12", "tags": ["a"], "counters": {"k": 1}, "level": "LEVEL_LOW"});
    let response = invoker.invoke(&Ammo::new("typed", "pkg.Svc.Typed", payload.clone())).await.unwrap();
    assert_json_include!(
        actual: marshal::read_back(response.get_ref()).unwrap(),
        expected: json!({"count": 3, "total": "12", "tags": ["a"], "counters": {"k": 1}, "level": "LEVEL_LOW", "name": ""})
    );

    let err = invoker.invoke(&Ammo::new("fail", "pkg.Svc.Fail", json!({}))).await.unwrap_err();
    assert!(matches!(err, RequestError::Invoke(status) if status.code() == Code::FailedPrecondition));
}

#[tokio::test]
async fn test_v1alpha_only_target() {
    let server = DevServer::spawn(Options { reflection: Reflection::V1alpha, ..Default::default() }).await.unwrap();
    let (gun, mut rx) = bound(&server).await;

    gun.shoot(Ammo::new("t1", "pkg.Svc.Echo", json!({"msg": "hi"}))).await;
    assert_eq!(rx.recv().await.unwrap().status, StatusCode::Ok);
}

#[tokio::test]
async fn test_bind_failures() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let mut gun = GrpcGun::new(GunConfig::new(addr.to_string()));
    let (aggregator, _rx) = ChannelAggregator::new();
    assert!(matches!(gun.bind(aggregator.clone(), GunDeps::default()).await, Err(SetupError::Connect { .. })));
    assert!(!gun.is_bound());

    let server = DevServer::spawn(Options { reflection: Reflection::Disabled, ..Default::default() }).await.unwrap();
    let mut gun = GrpcGun::new(GunConfig::new(server.target()));
    let err = gun.bind(aggregator.clone(), GunDeps::default()).await.unwrap_err();
    assert!(matches!(err, SetupError::Discovery(DiscoveryError::Rpc(status)) if status.code() == Code::Unimplemented));

    let server = DevServer::spawn(Options { reflection: Reflection::V1alpha, ..Default::default() }).await.unwrap();
    let config = GunConfig { reflection: ReflectionVersion::V1, ..GunConfig::new(server.target()) };
    let err = GrpcGun::new(config).bind(aggregator, GunDeps::default()).await.unwrap_err();
    assert!(matches!(err, SetupError::Discovery(DiscoveryError::Rpc(_))));
}

#[tokio::test]
async fn test_shoot_all_over_instances() {
    let server = DevServer::spawn(Options::default()).await.unwrap();
    let cmd = GunCommand { instances: 2, concurrency: 4, repeat: 3, ..Default::default() };
    let ammo = vec![
        Ammo::new("echo", "pkg.Svc.Echo", json!({"msg": "hi"})),
        Ammo::new("bad", "pkg.Svc.Echo", json!({"msg": ["hi"]})),
    ];
    let aggregator = Arc::new(HistogramAggregator::new(cmd.quantile()).unwrap());

    cmd.shoot_all(GunConfig::new(server.target()), ammo, aggregator.clone()).await.unwrap();

    let summary = aggregator.summary();
    assert_eq!(summary.count, 6);
    assert_eq!(summary.of(StatusCode::Ok), 3);
    assert_eq!(summary.of(StatusCode::BadRequest), 3);
    assert_eq!(server.recorder.count(), 3);
}
