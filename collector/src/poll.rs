//! Polling cycles over all configured targets.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use smcipmi_exporter_core::{Assembler, ExtractionOutcome, MetricCatalog, Segmenter};
use tracing::{debug, warn};

use crate::config::{ExporterConfig, Login};
use crate::error::{AcquisitionError, Result};
use crate::tool::{ReportSource, SmcIpmiTool};

/// Collector name reported in `smcipmi_collector_error{name=...}`.
pub const PMINFO_COLLECTOR: &str = "pminfo";

/// Result of polling one target.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub target: String,
    pub result: std::result::Result<ExtractionOutcome, AcquisitionError>,
    pub elapsed: Duration,
}

impl TargetOutcome {
    /// True when acquisition failed or any value failed to convert.
    pub fn failed(&self) -> bool {
        match &self.result {
            Ok(outcome) => outcome.has_errors(),
            Err(_) => true,
        }
    }
}

/// Results of one polling cycle, in configured target order.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub collector: Option<&'static str>,
    pub targets: Vec<TargetOutcome>,
}

impl CycleOutcome {
    /// Wraps an offline extraction as a single-target `pminfo` cycle.
    pub fn from_extraction(outcome: ExtractionOutcome) -> Self {
        Self {
            collector: Some(PMINFO_COLLECTOR),
            targets: vec![TargetOutcome {
                target: outcome.target.clone(),
                result: Ok(outcome),
                elapsed: Duration::ZERO,
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Targets whose collector should be flagged as failed.
    pub fn failed_targets(&self) -> impl Iterator<Item = &str> {
        self.targets
            .iter()
            .filter(|outcome| outcome.failed())
            .map(|outcome| outcome.target.as_str())
    }
}

/// Polls every configured target through a [`ReportSource`].
pub struct Poller {
    targets: Vec<String>,
    login: Login,
    enabled: bool,
    catalog: MetricCatalog,
    segmenter: Segmenter,
    source: Box<dyn ReportSource>,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("targets", &self.targets)
            .field("login", &self.login)
            .field("enabled", &self.enabled)
            .field("catalog", &self.catalog.len())
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Builds a poller that runs `SMCIPMITool` as configured.
    ///
    /// # Errors
    ///
    /// Returns [`Pattern`](crate::CollectorError::Pattern) for an invalid
    /// `module_pattern` and [`ThreadPool`](crate::CollectorError::ThreadPool)
    /// if worker threads cannot be started.
    pub fn from_config(config: &ExporterConfig) -> Result<Self> {
        let source = SmcIpmiTool::from_config(&config.tool);
        Self::with_source(config, Box::new(source))
    }

    /// Builds a poller around an arbitrary report source.
    pub fn with_source(config: &ExporterConfig, source: Box<dyn ReportSource>) -> Result<Self> {
        let segmenter = config.segmenter()?;
        let jobs = config
            .jobs
            .filter(|jobs| *jobs > 0)
            .unwrap_or_else(|| default_parallel_jobs(config.targets.len()));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|index| format!("pminfo-poll-{index}"))
            .build()?;

        Ok(Self {
            targets: config.targets.iter().map(|t| t.trim().to_string()).collect(),
            login: config.login.clone(),
            enabled: config.collectors.pminfo,
            catalog: config.catalog(),
            segmenter,
            source,
            pool,
        })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// Extracts records from already captured text.
    pub fn parse(&self, target: &str, raw: &str) -> ExtractionOutcome {
        Assembler::new(&self.catalog)
            .with_segmenter(self.segmenter.clone())
            .assemble(target, raw)
    }

    /// Acquires and extracts one target.
    pub fn poll_target(&self, target: &str) -> TargetOutcome {
        let started = Instant::now();
        let result = self
            .source
            .fetch(target, &self.login)
            .map(|raw| self.parse(target, &raw));
        let elapsed = started.elapsed();

        match &result {
            Ok(outcome) => debug!(
                host = %target,
                modules = outcome.modules,
                records = outcome.records.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Polled target"
            ),
            Err(err) => warn!(
                host = %target,
                code = %err.code(),
                error = %err,
                "Failed to acquire pminfo output"
            ),
        }

        TargetOutcome {
            target: target.to_string(),
            result,
            elapsed,
        }
    }

    /// Polls every target in parallel. Empty when `pminfo` is disabled.
    pub fn poll_cycle(&self) -> CycleOutcome {
        if !self.enabled {
            debug!("pminfo collector disabled, skipping cycle");
            return CycleOutcome::default();
        }

        // `collect` on an indexed parallel iterator keeps input order.
        let targets = self.pool.install(|| {
            self.targets
                .par_iter()
                .map(|target| self.poll_target(target))
                .collect()
        });

        CycleOutcome {
            collector: Some(PMINFO_COLLECTOR),
            targets,
        }
    }
}

fn default_parallel_jobs(target_count: usize) -> usize {
    let cpu_count = std::thread::available_parallelism()
        .map(|parallelism| parallelism.get())
        .unwrap_or(4);
    cpu_count.clamp(1, 16).min(target_count.max(1))
}
