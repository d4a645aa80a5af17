//! Load testing gun for any gRPC server that serves reflection.
//!
//! No schema is compiled in. At bind time the gun asks the target for its services through
//! server reflection, and each shot turns a JSON payload into a request of the named method.
//! Every shot reports exactly one [`sample::Sample`], classified as `200` for a response,
//! `400` for a payload that does not fit the schema, and `0` for anything else.
//!
//! # Binary Usage
//! | step | command |
//! | --- | --- |
//! | install binary | `cargo install --path universal-grpc-gun` |
//! | install dev server | `cargo install --path dev/server/grpc` |
//! | run command | `universal-grpc-gun -t localhost:50051 -a ammo.jsonl` |
//!
//! Ammo is json lines, one call per line.
//! ```json
//! {"tag": "echo", "call": "pkg.Svc.Echo", "metadata": {"x": "1"}, "payload": {"msg": "hi"}}
//! ```
//!
//! # Library Usage
//! ```no_run
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use universal_grpc_gun::{
//!     aggregate::HistogramAggregator,
//!     ammo::Ammo,
//!     config::GunConfig,
//!     gun::{GrpcGun, Gun, GunDeps},
//! };
//!
//! # async fn run() -> universal_grpc_gun::Result<()> {
//! let aggregator = Arc::new(HistogramAggregator::new([0.5, 0.99])?);
//! let mut gun = GrpcGun::new(GunConfig::new("localhost:50051"));
//! gun.bind(aggregator.clone(), GunDeps::default()).await?;
//!
//! gun.shoot(Ammo::new("t1", "pkg.Svc.Echo", json!({"msg": "hi"}))).await;
//! println!("{:?}", aggregator.summary());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod ammo;
pub mod catalog;
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod gun;
pub mod invoke;
pub mod marshal;
pub mod reflection;
#[cfg(feature = "cli")]
pub mod report;
pub mod sample;

pub use {error::GunError as Error, error::GunResult as Result};
