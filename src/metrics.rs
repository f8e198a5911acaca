//! Prometheus metrics (feature `metrics`) and tracing span helpers
//! (feature `tracing`).

#[cfg(feature = "metrics")]
pub use prometheus_metrics::{ContractMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram, Meter, MeterProvider},
        KeyValue,
    };
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::Registry;
    use std::time::Duration;

    pub static METRICS: Lazy<ContractMetrics> = Lazy::new(ContractMetrics::init);

    pub struct ContractMetrics {
        /// Registry backing the Prometheus exporter; gather it to serve `/metrics`.
        pub registry: Registry,
        _provider: Option<SdkMeterProvider>,
        pub contracts_created: Counter<u64>,
        pub status_transitions: Counter<u64>,
        pub denied_actions: Counter<u64>,
        pub query_errors: Counter<u64>,
        pub query_duration: Histogram<f64>,
    }

    impl ContractMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let (provider, meter) = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => {
                    let provider = SdkMeterProvider::builder().with_reader(exporter).build();
                    let meter = provider.meter("contractguard");
                    (Some(provider), meter)
                }
                Err(e) => {
                    log::warn!("prometheus exporter unavailable, metrics are not exported: {e}");
                    (None, global::meter("contractguard"))
                }
            };
            Self::with_meter(registry, provider, &meter)
        }

        fn with_meter(registry: Registry, provider: Option<SdkMeterProvider>, meter: &Meter) -> Self {
            let contracts_created = meter
                .u64_counter("contractguard_contracts_created_total")
                .with_description("Contracts created")
                .build();

            let status_transitions = meter
                .u64_counter("contractguard_status_transitions_total")
                .with_description("Successful contract status transitions")
                .build();

            let denied_actions = meter
                .u64_counter("contractguard_denied_actions_total")
                .with_description("Actions refused by the authorization policy")
                .build();

            let query_errors = meter
                .u64_counter("contractguard_query_errors_total")
                .with_description("Failed database queries")
                .build();

            let query_duration = meter
                .f64_histogram("contractguard_query_duration_seconds")
                .with_description("Duration of database queries")
                .build();

            Self {
                registry,
                _provider: provider,
                contracts_created,
                status_transitions,
                denied_actions,
                query_errors,
                query_duration,
            }
        }

        pub fn record_contract_created(&self) {
            self.contracts_created.add(1, &[]);
        }

        pub fn record_transition(&self, from: &'static str, to: &'static str) {
            self.status_transitions.add(
                1,
                &[KeyValue::new("from", from), KeyValue::new("to", to)],
            );
        }

        pub fn record_denied(&self, resource: &'static str, action: &'static str) {
            self.denied_actions.add(
                1,
                &[KeyValue::new("resource", resource), KeyValue::new("action", action)],
            );
        }

        pub fn record_query_error(&self) {
            self.query_errors.add(1, &[]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{debug_span, info_span, Span};
    use tracing_subscriber::util::SubscriberInitExt;

    /// Install a bare registry as the global subscriber if none is set yet.
    /// Returns `false` when another subscriber was already installed.
    pub fn init_registry() -> bool {
        tracing_subscriber::registry().try_init().is_ok()
    }

    pub fn execute_query_span(sql: &str) -> Span {
        // First line only; statements are multi-line literals.
        let statement = sql.trim().lines().next().unwrap_or_default();
        debug_span!("db.query", db.statement = statement)
    }

    pub fn acquire_connection_span() -> Span {
        debug_span!("db.acquire")
    }

    pub fn begin_transaction_span() -> Span {
        debug_span!("db.begin")
    }

    pub fn commit_transaction_span() -> Span {
        debug_span!("db.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        debug_span!("db.rollback")
    }

    pub fn service_span(operation: &'static str) -> Span {
        info_span!("contracts.service", operation)
    }
}
