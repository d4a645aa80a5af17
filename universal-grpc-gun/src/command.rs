use std::path::PathBuf;
#[cfg(feature = "cli")]
use std::{process::ExitCode, sync::Arc, time::Instant};

#[cfg(feature = "cli")]
use clap::Parser;
use futures::StreamExt;

use crate::{
    aggregate::Aggregator,
    ammo::Ammo,
    config::GunConfig,
    error::{ConfigError, GunResult},
    gun::{GrpcGun, Gun, GunDeps},
};

pub const POOL_ID: &str = "grpc";

#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", clap(version, about, arg_required_else_help = true))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GunCommand {
    /// config file of the gun, json yaml or toml
    #[cfg_attr(feature = "cli", arg(short, long))]
    pub config: Option<PathBuf>,

    /// override target of the config, `host:port`
    #[cfg_attr(feature = "cli", arg(short, long))]
    pub target: Option<String>,

    /// json lines ammo file
    #[cfg_attr(feature = "cli", arg(short, long))]
    pub ammo: PathBuf,

    /// number of guns, each bound with its own connection
    #[cfg_attr(feature = "cli", arg(short, long, default_value_t = 1))]
    pub instances: usize,

    /// max in-flight shots across all guns
    #[cfg_attr(feature = "cli", arg(long, default_value_t = 16))]
    pub concurrency: usize,

    /// times to shoot all ammo
    #[cfg_attr(feature = "cli", arg(short, long = "loop", default_value_t = 1))]
    pub repeat: usize,

    /// measure percentile for latency
    #[cfg_attr(feature = "cli", arg(short, long, num_args=0.., value_delimiter = ' ', default_values_t = [50., 90., 99.]))]
    pub percentile: Vec<f64>,

    /// without colorize output
    #[cfg_attr(feature = "cli", arg(long))]
    pub no_color: bool,
}

#[cfg(feature = "cli")]
pub async fn execute() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    use crate::aggregate::HistogramAggregator;

    let cmd = GunCommand::parse_cli();
    tracing_subscriber::fmt::init();
    if cmd.no_color {
        console::set_colors_enabled(false);
    }

    let aggregator = Arc::new(HistogramAggregator::new(cmd.quantile())?);
    let start = Instant::now();
    if let Err(err) = cmd.prepare_and_shoot(aggregator.clone()).await {
        eprintln!("{err}");
        return Ok(ExitCode::FAILURE);
    }
    crate::report::console(&aggregator.summary(), start.elapsed(), &cmd.percentile, &mut std::io::stdout())?;
    Ok(ExitCode::SUCCESS)
}

impl GunCommand {
    #[cfg(feature = "cli")]
    pub fn parse_cli() -> Self {
        Self::parse()
    }

    pub fn quantile(&self) -> Vec<f64> {
        self.percentile.iter().map(|p| p / 100.).collect()
    }

    pub fn gun_config(&self) -> GunResult<GunConfig> {
        let config = match (&self.config, &self.target) {
            (Some(path), None) => GunConfig::read(path)?,
            (Some(path), Some(target)) => GunConfig { target: target.clone(), ..GunConfig::read(path)? }.validate()?,
            (None, Some(target)) => GunConfig::new(target.clone()).validate()?,
            (None, None) => Err(ConfigError::EmptyTarget)?,
        };
        Ok(config)
    }

    pub async fn prepare_and_shoot<A: Aggregator + Clone>(&self, aggregator: A) -> GunResult<()> {
        let config = self.gun_config()?;
        let ammo = crate::ammo::read_file(&self.ammo)?;
        self.shoot_all(config, ammo, aggregator).await
    }

    /// Bind every gun first, then shoot all ammo `repeat` times spread over the guns.
    pub async fn shoot_all<A: Aggregator + Clone>(
        &self,
        config: GunConfig,
        ammo: Vec<Ammo>,
        aggregator: A,
    ) -> GunResult<()> {
        let mut guns = Vec::new();
        for instance_id in 0..self.instances.max(1) {
            let mut gun = GrpcGun::new(config.clone());
            gun.bind(aggregator.clone(), GunDeps { instance_id, pool_id: POOL_ID.to_string() }).await?;
            guns.push(gun);
        }
        tracing::info!(guns = guns.len(), ammo = ammo.len(), repeat = self.repeat, "start shooting");

        let guns = &guns;
        let shots = (0..self.repeat).flat_map(|_| ammo.iter().cloned()).enumerate();
        futures::stream::iter(shots.map(|(i, ammo)| guns[i % guns.len()].shoot(ammo)))
            .buffer_unordered(self.concurrency.max(1))
            .for_each(|()| async {})
            .await;
        Ok(())
    }
}
