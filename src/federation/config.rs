/// Which direction the primary snapshot's reconciliation pass runs first
/// (spec.md §4.5 fixes `local → cloud` then `cloud → local`; this is the
/// one knob a caller integrating two stores with different copy costs may
/// want to flip).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOrder {
    LocalFirst,
    CloudFirst,
}

/// The handful of knobs the federation core actually owns (spec.md §6: "no
/// environment variables belong to the core", §9 "global counter for
/// snapshot ids becomes an atomic counter on the facade instance"). Built
/// with `FederationConfig::builder()...build()`, the same shape as
/// `NetworkLayer::builder(...)` elsewhere in this codebase, rather than
/// reading ambient environment state.
#[derive(Clone, Debug)]
pub struct FederationConfig {
    snapshot_id_seed: i64,
    reconcile_order: ReconcileOrder,
}

impl FederationConfig {
    pub fn builder() -> FederationConfigBuilder {
        FederationConfigBuilder::new()
    }

    pub fn snapshot_id_seed(&self) -> i64 {
        self.snapshot_id_seed
    }

    pub fn reconcile_order(&self) -> ReconcileOrder {
        self.reconcile_order
    }
}

impl Default for FederationConfig {
    fn default() -> Self {
        FederationConfig::builder().build()
    }
}

pub struct FederationConfigBuilder {
    snapshot_id_seed: i64,
    reconcile_order: ReconcileOrder,
}

impl FederationConfigBuilder {
    fn new() -> Self {
        Self {
            snapshot_id_seed: 0,
            reconcile_order: ReconcileOrder::LocalFirst,
        }
    }

    pub fn with_snapshot_id_seed(mut self, seed: i64) -> Self {
        self.snapshot_id_seed = seed;
        self
    }

    pub fn with_reconcile_order(mut self, order: ReconcileOrder) -> Self {
        self.reconcile_order = order;
        self
    }

    pub fn build(self) -> FederationConfig {
        FederationConfig {
            snapshot_id_seed: self.snapshot_id_seed,
            reconcile_order: self.reconcile_order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_is_local_first() {
        let config = FederationConfig::default();
        assert_eq!(config.reconcile_order(), ReconcileOrder::LocalFirst);
        assert_eq!(config.snapshot_id_seed(), 0);
    }

    #[test]
    fn builder_overrides_both_knobs() {
        let config = FederationConfig::builder()
            .with_snapshot_id_seed(42)
            .with_reconcile_order(ReconcileOrder::CloudFirst)
            .build();
        assert_eq!(config.snapshot_id_seed(), 42);
        assert_eq!(config.reconcile_order(), ReconcileOrder::CloudFirst);
    }
}
