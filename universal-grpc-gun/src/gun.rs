use std::{future::Future, sync::Arc};

use crate::{
    aggregate::Aggregator,
    ammo::Ammo,
    catalog::{self, ServiceCatalog},
    config::GunConfig,
    connection,
    error::{RequestError, SetupError},
    invoke::Invoker,
    reflection::ReflectionClient,
    sample::{classify, Sample},
};

/// Identity of a gun within the load generator that hosts it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GunDeps {
    pub instance_id: usize,
    pub pool_id: String,
}

/// Turns one unit of ammo into one request and exactly one reported sample.
///
/// `bind` runs once and must complete before any `shoot`. After that, `shoot` is called
/// concurrently through a shared reference. The aggregator arrives with `bind`, so a `shoot`
/// on an unbound gun has nowhere to report. It logs an error and reports no sample.
pub trait Gun {
    type Ammo;
    type Aggregator: Aggregator;
    fn bind(
        &mut self,
        aggregator: Self::Aggregator,
        deps: GunDeps,
    ) -> impl Future<Output = Result<(), SetupError>> + Send;
    fn shoot(&self, ammo: Self::Ammo) -> impl Future<Output = ()> + Send;
}

/// Gun for any gRPC target that serves reflection.
#[derive(Debug)]
pub struct GrpcGun<A> {
    config: GunConfig,
    bound: Option<Bound<A>>,
}
#[derive(Debug)]
struct Bound<A> {
    invoker: Invoker,
    aggregator: A,
    deps: GunDeps,
}

impl<A> GrpcGun<A> {
    pub fn new(config: GunConfig) -> Self {
        Self { config, bound: None }
    }
    pub fn config(&self) -> &GunConfig {
        &self.config
    }
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }
    pub fn catalog(&self) -> Option<&ServiceCatalog> {
        self.bound.as_ref().map(|b| b.invoker.catalog())
    }
    pub fn deps(&self) -> Option<&GunDeps> {
        self.bound.as_ref().map(|b| &b.deps)
    }
}

impl<A: Aggregator> Gun for GrpcGun<A> {
    type Ammo = Ammo;
    type Aggregator = A;

    #[tracing::instrument(skip_all, fields(instance = deps.instance_id, pool = %deps.pool_id))]
    async fn bind(&mut self, aggregator: A, deps: GunDeps) -> Result<(), SetupError> {
        if self.bound.is_some() {
            return Err(SetupError::AlreadyBound);
        }
        let channel = connection::connect(&self.config).await?;
        let host = connection::target_host(&self.config.target);
        let mut reflection = ReflectionClient::new(channel.clone(), host, self.config.reflection);
        let catalog = catalog::discover(&mut reflection).await?;
        tracing::info!(methods = catalog.len(), reflection = ?reflection.version(), "bound");

        self.bound = Some(Bound { invoker: Invoker::new(channel, Arc::new(catalog)), aggregator, deps });
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(tag = %ammo.tag, call = %ammo.call))]
    async fn shoot(&self, ammo: Ammo) {
        let Some(bound) = &self.bound else {
            tracing::error!("gun is not bound, ammo is discarded");
            return;
        };
        let sample = Sample::acquire(ammo.tag.as_str());

        let outcome = bound.invoker.invoke(&ammo).await;
        match &outcome {
            Ok(_) => tracing::debug!("response received"),
            Err(e @ RequestError::Marshal(_)) => tracing::warn!("invalid payload: {e}"),
            Err(e) => tracing::warn!("{e}"),
        }
        bound.aggregator.report(sample.finish(classify(&outcome)));
    }
}
