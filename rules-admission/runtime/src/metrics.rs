use prometheus_client::{metrics::counter::Counter, registry::Registry};

/// Counters shared by every clone of the validating webhook.
///
/// The default value is not registered anywhere, so increments are simply
/// not exported.
#[derive(Clone, Debug, Default)]
pub struct ValidationMetrics {
    triggered: Counter,
    errors: Counter,
}

// === impl ValidationMetrics ===

impl ValidationMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let triggered = Counter::default();
        reg.register(
            "rule_validation_triggered",
            "Number of times a PrometheusRule object triggered validation",
            triggered.clone(),
        );

        let errors = Counter::default();
        reg.register(
            "rule_validation_errors",
            "Number of PrometheusRule objects rejected by validation",
            errors.clone(),
        );

        Self { triggered, errors }
    }

    pub(crate) fn triggered(&self) {
        self.triggered.inc();
    }

    pub(crate) fn rejected(&self) {
        self.errors.inc();
    }

    #[cfg(test)]
    pub(crate) fn counts(&self) -> (u64, u64) {
        (self.triggered.get(), self.errors.get())
    }
}
