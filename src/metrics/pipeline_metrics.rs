//! Metric definitions and text export.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Metrics recorded by the execution coordinator and the verdict analyzer.
///
/// Cloning is cheap; clones share the same underlying collectors.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    tests_total: CounterVec,
    test_duration: HistogramVec,
    tests_in_progress: Gauge,
    verdicts_total: CounterVec,
    collaborator_fallbacks: CounterVec,
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMetrics")
            .field("tests_in_progress", &self.tests_in_progress.get())
            .finish_non_exhaustive()
    }
}

impl PipelineMetrics {
    /// Creates the collectors and registers them with a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if a metric definition is invalid.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tests_total = CounterVec::new(
            Opts::new("qa_forge_tests_total", "Total number of tests executed"),
            &["status"],
        )?;

        let test_duration = HistogramVec::new(
            HistogramOpts::new(
                "qa_forge_test_duration_seconds",
                "Single test execution duration in seconds",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["status"],
        )?;

        let tests_in_progress = Gauge::new(
            "qa_forge_tests_in_progress",
            "Number of tests currently holding an execution slot",
        )?;

        let verdicts_total = CounterVec::new(
            Opts::new("qa_forge_verdicts_total", "Total analyzed verdicts"),
            &["verdict"],
        )?;

        let collaborator_fallbacks = CounterVec::new(
            Opts::new(
                "qa_forge_collaborator_fallbacks_total",
                "Deep analysis attempts that fell back to local verdicts",
            ),
            &["reason"],
        )?;

        registry.register(Box::new(tests_total.clone()))?;
        registry.register(Box::new(test_duration.clone()))?;
        registry.register(Box::new(tests_in_progress.clone()))?;
        registry.register(Box::new(verdicts_total.clone()))?;
        registry.register(Box::new(collaborator_fallbacks.clone()))?;

        Ok(Self {
            registry,
            tests_total,
            test_duration,
            tests_in_progress,
            verdicts_total,
            collaborator_fallbacks,
        })
    }

    /// Records one finished test execution.
    pub fn record_test(&self, status: &str, duration_secs: f64) {
        self.tests_total.with_label_values(&[status]).inc();
        self.test_duration
            .with_label_values(&[status])
            .observe(duration_secs);
    }

    pub fn test_started(&self) {
        self.tests_in_progress.inc();
    }

    pub fn test_finished(&self) {
        self.tests_in_progress.dec();
    }

    /// Records one analyzed verdict.
    pub fn record_verdict(&self, verdict: &str) {
        self.verdicts_total.with_label_values(&[verdict]).inc();
    }

    /// Records a deep analysis fallback.
    pub fn record_fallback(&self, reason: &str) {
        self.collaborator_fallbacks
            .with_label_values(&[reason])
            .inc();
    }

    /// Current value of `qa_forge_tests_total{status}`.
    pub fn tests_total(&self, status: &str) -> u64 {
        self.tests_total.with_label_values(&[status]).get() as u64
    }

    /// Current value of `qa_forge_verdicts_total{verdict}`.
    pub fn verdicts_total(&self, verdict: &str) -> u64 {
        self.verdicts_total.with_label_values(&[verdict]).get() as u64
    }

    /// Current value of `qa_forge_collaborator_fallbacks_total{reason}`.
    pub fn fallbacks_total(&self, reason: &str) -> u64 {
        self.collaborator_fallbacks
            .with_label_values(&[reason])
            .get() as u64
    }

    /// Underlying registry, for callers that expose it themselves.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes every registered metric in the Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# Error encoding metrics: {}\n", e);
        }

        String::from_utf8(buffer)
            .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
    }
}
