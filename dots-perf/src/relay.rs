//! Server side of the performance protocol
//!
//! The relay runs on the database host and answers INIT and STATE requests
//! from any number of samplers. Disk and paging figures are reported as
//! deltas since the same client's previous STATE.

use crate::error::PerfError;
use crate::protocol::{InitReply, PerfRequest, PerfSample, UNKNOWN_REQUEST_REPLY};
use crate::transport::LineTransport;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use sysinfo::System;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};

/// Source of raw host counters, one instance per client connection
pub trait CounterSource: Send {
    fn cores(&self) -> usize;

    /// Take a reading for the next STATE reply
    fn sample(&mut self) -> PerfSample;
}

type SourceFactory = Arc<dyn Fn() -> Box<dyn CounterSource> + Send + Sync>;

/// TCP server for the performance protocol
pub struct PerfRelay {
    listener: TcpListener,
    make_source: SourceFactory,
}

impl PerfRelay {
    /// Bind a relay reading the local host's counters
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, PerfError> {
        Self::bind_with_source(addr, || Box::new(SystemCounters::new()) as Box<dyn CounterSource>).await
    }

    /// Bind a relay with a custom counter source
    pub async fn bind_with_source<F>(addr: impl ToSocketAddrs, make_source: F) -> Result<Self, PerfError>
    where
        F: Fn() -> Box<dyn CounterSource> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            make_source: Arc::new(make_source),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, PerfError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the listener fails
    pub async fn serve(self) -> Result<(), PerfError> {
        info!("Performance relay listening on {}", self.local_addr()?);

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let make_source = self.make_source.clone();

            tokio::spawn(async move {
                info!("Performance client {} connected", peer);
                let mut source = make_source();
                match serve_connection(LineTransport::new(stream), source.as_mut()).await {
                    Ok(()) => info!("Performance client {} disconnected", peer),
                    Err(e) => warn!("Performance client {} dropped: {}", peer, e),
                }
            });
        }
    }
}

/// Answer requests on one connection until the client hangs up
pub async fn serve_connection<S>(
    mut transport: LineTransport<S>,
    source: &mut dyn CounterSource,
) -> Result<(), PerfError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(line) = transport.next_line().await? {
        let reply = match line.parse::<PerfRequest>() {
            Ok(PerfRequest::Init) => InitReply::new(source.cores()).encode(),
            Ok(PerfRequest::State) => source.sample().encode(),
            Err(e) => {
                debug!("{}", e);
                UNKNOWN_REQUEST_REPLY.to_string()
            }
        };
        transport.send_line(&reply).await?;
    }
    Ok(())
}

/// Counters of the local host
///
/// CPU and memory come from `sysinfo`. Disk operations (reads plus writes
/// completed on whole disks) and page-in/page-out come from `/proc` and read
/// as zero where it is unavailable.
pub struct SystemCounters {
    system: System,
    last_disk_io: Option<u64>,
    last_paging: Option<(u64, u64)>,
}

impl SystemCounters {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();

        let mut counters = Self {
            system,
            last_disk_io: None,
            last_paging: None,
        };
        // Prime the baselines so the first STATE reports a delta
        counters.last_disk_io = read_disk_ops();
        counters.last_paging = read_paging();
        counters
    }
}

impl Default for SystemCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SystemCounters {
    fn cores(&self) -> usize {
        self.system.cpus().len().max(1)
    }

    fn sample(&mut self) -> PerfSample {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let per_core: Vec<u64> = self
            .system
            .cpus()
            .iter()
            .map(|cpu| percent(cpu.cpu_usage()))
            .collect();
        let memory_mb = self.system.used_memory() / (1024 * 1024);

        let disk_now = read_disk_ops();
        let disk_io = delta(self.last_disk_io, disk_now);
        self.last_disk_io = disk_now.or(self.last_disk_io);

        let paging_now = read_paging();
        let (page_in, page_out) = match (self.last_paging, paging_now) {
            (Some((in_before, out_before)), Some((in_now, out_now))) => (
                in_now.saturating_sub(in_before),
                out_now.saturating_sub(out_before),
            ),
            _ => (0, 0),
        };
        self.last_paging = paging_now.or(self.last_paging);

        PerfSample::full(
            percent(self.system.global_cpu_usage()),
            &per_core,
            memory_mb,
            disk_io,
            page_in,
            page_out,
        )
    }
}

fn percent(usage: f32) -> u64 {
    if usage.is_finite() && usage > 0.0 {
        usage.round() as u64
    } else {
        0
    }
}

fn delta(before: Option<u64>, now: Option<u64>) -> u64 {
    match (before, now) {
        (Some(before), Some(now)) => now.saturating_sub(before),
        _ => 0,
    }
}

fn read_paging() -> Option<(u64, u64)> {
    let content = std::fs::read_to_string("/proc/vmstat").ok()?;
    parse_vmstat(&content)
}

fn read_disk_ops() -> Option<u64> {
    let content = std::fs::read_to_string("/proc/diskstats").ok()?;
    Some(parse_diskstats(&content, |name| {
        Path::new("/sys/block").join(name).exists()
    }))
}

/// Extract `pgpgin` and `pgpgout` from `/proc/vmstat`
fn parse_vmstat(content: &str) -> Option<(u64, u64)> {
    let mut page_in = None;
    let mut page_out = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next().and_then(|v| v.parse::<u64>().ok())) {
            (Some("pgpgin"), Some(value)) => page_in = Some(value),
            (Some("pgpgout"), Some(value)) => page_out = Some(value),
            _ => {}
        }
    }

    Some((page_in?, page_out?))
}

/// Sum reads and writes completed over the devices accepted by `is_disk`
fn parse_diskstats(content: &str, is_disk: impl Fn(&str) -> bool) -> u64 {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 8 || !is_disk(fields[2]) {
                return None;
            }
            let reads = fields[3].parse::<u64>().ok()?;
            let writes = fields[7].parse::<u64>().ok()?;
            Some(reads + writes)
        })
        .sum()
}
