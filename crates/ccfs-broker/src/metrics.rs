//! Prometheus counters for the negotiation endpoints

use prometheus_client::{encoding::text::encode, metrics::counter::Counter, registry::Registry};

/// Counters owned by the broker, registered in their own registry.
pub struct BrokerMetrics {
    registry: Registry,
    pub upload_tickets: Counter,
    pub download_tickets: Counter,
    pub negotiation_errors: Counter,
    pub probe_misses: Counter,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let upload_tickets = Counter::default();
        let download_tickets = Counter::default();
        let negotiation_errors = Counter::default();
        let probe_misses = Counter::default();

        registry.register(
            "ccfs_upload_tickets",
            "Upload capabilities minted",
            upload_tickets.clone(),
        );
        registry.register(
            "ccfs_download_tickets",
            "Download capabilities minted",
            download_tickets.clone(),
        );
        registry.register(
            "ccfs_negotiation_errors",
            "Negotiations that failed to mint a capability",
            negotiation_errors.clone(),
        );
        registry.register(
            "ccfs_probe_misses",
            "Download probes that found no object or failed",
            probe_misses.clone(),
        );

        Self {
            registry,
            upload_tickets,
            download_tickets,
            negotiation_errors,
            probe_misses,
        }
    }

    /// Render the registry in Prometheus text format.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_counters() {
        let metrics = BrokerMetrics::new();
        metrics.upload_tickets.inc();
        metrics.upload_tickets.inc();
        metrics.probe_misses.inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("ccfs_upload_tickets_total 2"), "{text}");
        assert!(text.contains("ccfs_probe_misses_total 1"), "{text}");
        assert!(text.contains("ccfs_download_tickets_total 0"), "{text}");
    }
}
