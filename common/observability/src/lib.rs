use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct ProductMetrics {
    pub registry: Registry,
    pub id_allocation_attempts: IntCounter,
    pub id_allocation_conflicts: IntCounter,
    pub id_allocation_collisions: IntCounter,
    pub id_allocations_total: IntCounterVec,
    pub id_allocation_duration_seconds: Histogram,
    pub stock_adjustments_total: IntCounterVec,
    pub stock_cas_retries: IntCounter,
    pub http_errors_total: IntCounterVec,
}

impl ProductMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let id_allocation_attempts = IntCounter::new(
            "id_allocation_attempts_total",
            "Serializable transactions started by the product id allocator",
        )?;
        let id_allocation_conflicts = IntCounter::new(
            "id_allocation_conflicts_total",
            "Allocator attempts aborted by a transient transaction conflict",
        )?;
        let id_allocation_collisions = IntCounter::new(
            "id_allocation_collisions_total",
            "Allocator candidates rejected because a product already used the id",
        )?;
        let id_allocations_total = IntCounterVec::new(
            Opts::new("id_allocations_total", "Completed allocation requests grouped by outcome"),
            &["outcome"],
        )?;
        let id_allocation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "id_allocation_duration_seconds",
                "Wall time of one allocation request including retries",
            ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;
        let stock_adjustments_total = IntCounterVec::new(
            Opts::new("stock_adjustments_total", "Stock adjustments grouped by direction and outcome"),
            &["direction", "outcome"],
        )?;
        let stock_cas_retries = IntCounter::new(
            "stock_adjust_cas_retries_total",
            "Stock compare-and-swap writes that lost a race and were retried",
        )?;
        let http_errors_total = IntCounterVec::new(
            Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)",
            ),
            &["service", "code", "status"],
        )?;
        registry.register(Box::new(id_allocation_attempts.clone()))?;
        registry.register(Box::new(id_allocation_conflicts.clone()))?;
        registry.register(Box::new(id_allocation_collisions.clone()))?;
        registry.register(Box::new(id_allocations_total.clone()))?;
        registry.register(Box::new(id_allocation_duration_seconds.clone()))?;
        registry.register(Box::new(stock_adjustments_total.clone()))?;
        registry.register(Box::new(stock_cas_retries.clone()))?;
        registry.register(Box::new(http_errors_total.clone()))?;
        Ok(ProductMetrics {
            registry,
            id_allocation_attempts,
            id_allocation_conflicts,
            id_allocation_collisions,
            id_allocations_total,
            id_allocation_duration_seconds,
            stock_adjustments_total,
            stock_cas_retries,
            http_errors_total,
        })
    }

    pub fn allocation_outcome(&self, outcome: &str) {
        self.id_allocations_total.with_label_values(&[outcome]).inc();
    }

    pub fn stock_adjustment(&self, direction: &str, outcome: &str) {
        self.stock_adjustments_total.with_label_values(&[direction, outcome]).inc();
    }

    /// Prometheus text exposition of every registered family.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
