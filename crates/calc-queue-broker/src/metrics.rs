use prometheus::{CounterVec, HistogramOpts, HistogramVec, IntGauge, Opts, Registry};

/// Prometheus metrics for the broker
pub struct BrokerMetrics {
    pub registry: Registry,

    // Task counters
    pub tasks_total: CounterVec,

    // Task gauges
    pub tasks_pending: IntGauge,
    pub tasks_started: IntGauge,

    // Run time between start and completion
    pub task_run_duration: HistogramVec,

    pub queue_depth: IntGauge,
}

impl BrokerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let tasks_total = CounterVec::new(
            Opts::new("cq_tasks_total", "Total number of task transitions by state and kind"),
            &["state", "kind"],
        )?;
        registry.register(Box::new(tasks_total.clone()))?;

        let tasks_pending = IntGauge::new("cq_tasks_pending", "Number of pending tasks")?;
        registry.register(Box::new(tasks_pending.clone()))?;

        let tasks_started = IntGauge::new("cq_tasks_started", "Number of running tasks")?;
        registry.register(Box::new(tasks_started.clone()))?;

        let task_run_duration = HistogramVec::new(
            HistogramOpts::new(
                "cq_task_run_duration_seconds",
                "Time from task start to completion in seconds",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(task_run_duration.clone()))?;

        let queue_depth = IntGauge::new("cq_queue_depth", "Tasks waiting to be claimed")?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(BrokerMetrics {
            registry,
            tasks_total,
            tasks_pending,
            tasks_started,
            task_run_duration,
            queue_depth,
        })
    }

    pub fn inc_tasks_total(&self, state: &str, kind: &str) {
        self.tasks_total.with_label_values(&[state, kind]).inc();
    }

    pub fn observe_run_duration(&self, kind: &str, duration_secs: f64) {
        self.task_run_duration
            .with_label_values(&[kind])
            .observe(duration_secs);
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        use prometheus::{Encoder, TextEncoder};

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
