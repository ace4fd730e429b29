//! Client side of the performance protocol

use crate::aggregate::PerfAggregate;
use crate::error::PerfError;
use crate::protocol::{InitReply, MetricLayout, PerfRequest, PerfSample};
use crate::transport::LineTransport;
use dots_core::{SharedCounters, TerminationCause, TerminationFlag, Wake, TICK};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Shared read side of the sampler's aggregate
///
/// Rendering, resetting and recording all take the same lock, so an interval
/// reset can never interleave with the accumulation of the next sample.
#[derive(Debug, Clone)]
pub struct PerfMonitor {
    aggregate: Arc<Mutex<PerfAggregate>>,
}

impl PerfMonitor {
    pub fn new(layout: MetricLayout) -> Self {
        Self {
            aggregate: Arc::new(Mutex::new(PerfAggregate::new(layout))),
        }
    }

    pub fn cores(&self) -> usize {
        self.aggregate.lock().layout().cores()
    }

    pub fn record(&self, sample: &PerfSample) {
        self.aggregate.lock().record(sample);
    }

    pub fn render_summary(&self) -> String {
        self.aggregate.lock().render_summary()
    }

    pub fn reset_interval(&self) {
        self.aggregate.lock().reset_interval();
    }

    /// Render, then reset the interval figures if `reset` is set, as one step
    pub fn render_and_reset(&self, reset: bool) -> String {
        let mut aggregate = self.aggregate.lock();
        let rendered = aggregate.render_summary();
        if reset {
            aggregate.reset_interval();
        }
        rendered
    }

    /// Copy of the current aggregate
    pub fn snapshot(&self) -> PerfAggregate {
        self.aggregate.lock().clone()
    }
}

/// Why the sampling loop stopped
#[derive(Debug)]
pub enum SamplerExit {
    /// Termination was requested elsewhere
    Terminated,
    /// The performance source failed; termination was requested
    Failed(PerfError),
}

/// Polls a performance relay with STATE requests and folds the replies into a [`PerfMonitor`]
pub struct PerfSampler<S> {
    transport: LineTransport<S>,
    version: String,
    monitor: PerfMonitor,
    counters: Arc<SharedCounters>,
    termination: TerminationFlag,
    interval: Duration,
}

impl PerfSampler<TcpStream> {
    /// Connect to a relay and perform the INIT handshake
    pub async fn connect(
        addr: impl ToSocketAddrs,
        counters: Arc<SharedCounters>,
        termination: TerminationFlag,
    ) -> Result<Self, PerfError> {
        let transport = LineTransport::connect(addr).await?;
        Self::handshake(transport, counters, termination).await
    }
}

impl<S> PerfSampler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send INIT over an established transport and size the aggregate from the reply
    pub async fn handshake(
        mut transport: LineTransport<S>,
        counters: Arc<SharedCounters>,
        termination: TerminationFlag,
    ) -> Result<Self, PerfError> {
        let reply = InitReply::parse(&transport.request(PerfRequest::Init.as_str()).await?)?;
        info!(
            "Performance source {} reports {} cores",
            reply.version, reply.cores
        );

        Ok(Self {
            transport,
            version: reply.version,
            monitor: PerfMonitor::new(MetricLayout::new(reply.cores)),
            counters,
            termination,
            interval: TICK,
        })
    }

    /// Override the 5-second sampling interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn monitor(&self) -> PerfMonitor {
        self.monitor.clone()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Issue one STATE request and record the reply
    pub async fn sample_once(&mut self) -> Result<PerfSample, PerfError> {
        let line = self.transport.request(PerfRequest::State.as_str()).await?;
        let sample = PerfSample::parse(&line, &MetricLayout::new(self.monitor.cores()))?;

        self.monitor.record(&sample);
        if let Some(cpu) = sample.cpu_average() {
            self.counters.set_cpu_usage(cpu.min(u64::from(u32::MAX)) as u32);
        }

        debug!("Performance sample: {}", line);
        Ok(sample)
    }

    /// Sample until termination; a failed exchange requests termination and ends the loop
    pub async fn run(mut self) -> SamplerExit {
        loop {
            if self.termination.is_requested() {
                return SamplerExit::Terminated;
            }

            if let Err(e) = self.sample_once().await {
                error!("Performance sampling failed: {}", e);
                self.termination.request(TerminationCause::PerfSourceLost);
                return SamplerExit::Failed(e);
            }

            if let Wake::Terminated(_) = self.termination.sleep(self.interval).await {
                return SamplerExit::Terminated;
            }
        }
    }
}
