use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use hdrhistogram::{CreationError, Histogram};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::sample::{Sample, StatusCode};

/// Sink of samples. Reporting is fire and forget, and called concurrently from every shot.
pub trait Aggregator: Send + Sync {
    fn report(&self, sample: Sample);
}
impl<A: Aggregator + ?Sized> Aggregator for Arc<A> {
    fn report(&self, sample: Sample) {
        (**self).report(sample)
    }
}

/// Forward every sample to a receiver owned by someone else.
#[derive(Debug, Clone)]
pub struct ChannelAggregator {
    tx: UnboundedSender<Sample>,
}
impl ChannelAggregator {
    pub fn new() -> (Self, UnboundedReceiver<Sample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}
impl Aggregator for ChannelAggregator {
    fn report(&self, sample: Sample) {
        if let Err(e) = self.tx.send(sample) {
            tracing::debug!(tag = %e.0.tag, "sample dropped, receiver is closed");
        }
    }
}

/// Count samples by status and keep a latency histogram of all of them.
#[derive(Debug)]
pub struct HistogramAggregator {
    quantile: Vec<f64>,
    state: Mutex<HistogramState>,
}
#[derive(Debug)]
struct HistogramState {
    statuses: BTreeMap<StatusCode, u64>,
    latency: Histogram<u64>,
}
impl Aggregator for HistogramAggregator {
    fn report(&self, sample: Sample) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state.statuses.entry(sample.status).or_default() += 1;
        if let Err(e) = state.latency.record(sample.elapsed.as_nanos() as u64) {
            tracing::warn!(tag = %sample.tag, "cannot record latency: {e}");
        }
    }
}
impl HistogramAggregator {
    pub fn new<I: IntoIterator<Item = f64>>(quantile: I) -> Result<Self, CreationError> {
        let state = HistogramState { statuses: BTreeMap::new(), latency: Histogram::new(3)? };
        Ok(Self { quantile: quantile.into_iter().collect(), state: Mutex::new(state) })
    }

    pub fn summary(&self) -> Summary {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let hist = &state.latency;
        let nanos = |n: u64| Duration::from_nanos(n);
        Summary {
            count: hist.len(),
            statuses: state.statuses.clone(),
            min: nanos(hist.min()),
            mean: nanos(hist.mean() as u64),
            quantile: self.quantile.iter().map(|&q| (q, nanos(hist.value_at_quantile(q)))).collect(),
            max: nanos(hist.max()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub count: u64,
    pub statuses: BTreeMap<StatusCode, u64>,
    pub min: Duration,
    pub mean: Duration,
    pub quantile: Vec<(f64, Duration)>,
    pub max: Duration,
}
impl Summary {
    pub fn of(&self, status: StatusCode) -> u64 {
        self.statuses.get(&status).copied().unwrap_or_default()
    }
}
