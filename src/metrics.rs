//! Query and ledger instrumentation.
//!
//! With the `metrics` feature, counters and histograms are recorded through an
//! OpenTelemetry meter backed by a Prometheus registry; [`render_prometheus`]
//! produces the text exposition served at `/metrics`.
//! With the `tracing` feature, [`tracing_helpers`] provides the spans wrapped
//! around queries, transactions and ledger movements.

#[cfg(feature = "metrics")]
pub use self::prom::{render_prometheus, BankMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prom {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<BankMetrics> = Lazy::new(BankMetrics::init);

    pub struct BankMetrics {
        registry: Registry,
        // Kept alive so the reader keeps collecting.
        _provider: SdkMeterProvider,
        queries_total: Counter<u64>,
        query_errors_total: Counter<u64>,
        query_duration: Histogram<f64>,
        ledger_credits_total: Counter<u64>,
        ledger_debits_total: Counter<u64>,
        ledger_debits_rejected_total: Counter<u64>,
        ledger_units_total: Counter<u64>,
    }

    impl BankMetrics {
        fn init() -> Self {
            let registry = Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
                Err(e) => {
                    log::error!("prometheus exporter unavailable, metrics disabled: {e}");
                    SdkMeterProvider::builder().build()
                }
            };
            let meter = provider.meter("bloodbank");

            Self {
                queries_total: meter
                    .u64_counter("bloodbank_queries_total")
                    .with_description("Total statements executed")
                    .build(),
                query_errors_total: meter
                    .u64_counter("bloodbank_query_errors_total")
                    .with_description("Statements that returned an error")
                    .build(),
                query_duration: meter
                    .f64_histogram("bloodbank_query_duration_seconds")
                    .with_description("Duration of statements")
                    .build(),
                ledger_credits_total: meter
                    .u64_counter("bloodbank_ledger_credits_total")
                    .with_description("Inventory credits applied")
                    .build(),
                ledger_debits_total: meter
                    .u64_counter("bloodbank_ledger_debits_total")
                    .with_description("Inventory debits applied")
                    .build(),
                ledger_debits_rejected_total: meter
                    .u64_counter("bloodbank_ledger_debits_rejected_total")
                    .with_description("Inventory debits rejected for insufficient balance")
                    .build(),
                ledger_units_total: meter
                    .u64_counter("bloodbank_ledger_units_total")
                    .with_description("Units moved through the ledger, by direction")
                    .build(),
                registry,
                _provider: provider,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_credit(&self, blood_type_id: i64, units: i32) {
            let attrs = [KeyValue::new("blood_type_id", blood_type_id)];
            self.ledger_credits_total.add(1, &attrs);
            self.ledger_units_total.add(
                u64::try_from(units).unwrap_or(0),
                &[
                    KeyValue::new("blood_type_id", blood_type_id),
                    KeyValue::new("direction", "in"),
                ],
            );
        }

        pub fn record_debit(&self, blood_type_id: i64, units: i32, applied: bool) {
            let attrs = [KeyValue::new("blood_type_id", blood_type_id)];
            if applied {
                self.ledger_debits_total.add(1, &attrs);
                self.ledger_units_total.add(
                    u64::try_from(units).unwrap_or(0),
                    &[
                        KeyValue::new("blood_type_id", blood_type_id),
                        KeyValue::new("direction", "out"),
                    ],
                );
            } else {
                self.ledger_debits_rejected_total.add(1, &attrs);
            }
        }

        pub fn registry(&self) -> &Registry {
            &self.registry
        }
    }

    /// Prometheus text exposition of every metric recorded so far.
    pub fn render_prometheus() -> Result<Vec<u8>, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&METRICS.registry().gather(), &mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    const MAX_SQL_IN_SPAN: usize = 120;

    fn condensed(sql: &str) -> String {
        let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        match flat.char_indices().nth(MAX_SQL_IN_SPAN) {
            Some((idx, _)) => format!("{}...", &flat[..idx]),
            None => flat,
        }
    }

    pub fn execute_query_span(sql: &str) -> Span {
        tracing::debug_span!("bloodbank.query", sql = %condensed(sql))
    }

    pub fn acquire_connection_span() -> Span {
        tracing::info_span!("bloodbank.connect")
    }

    pub fn begin_transaction_span() -> Span {
        tracing::debug_span!("bloodbank.tx.begin")
    }

    pub fn commit_transaction_span() -> Span {
        tracing::debug_span!("bloodbank.tx.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        tracing::debug_span!("bloodbank.tx.rollback")
    }

    pub fn ledger_span(operation: &'static str, blood_type_id: i64, units: i32) -> Span {
        tracing::debug_span!("bloodbank.ledger", operation, blood_type_id, units)
    }

    pub fn lifecycle_span(operation: &'static str) -> Span {
        tracing::info_span!("bloodbank.lifecycle", operation)
    }

    pub fn migration_span(name: &'static str) -> Span {
        tracing::info_span!("bloodbank.migration", name)
    }

}
