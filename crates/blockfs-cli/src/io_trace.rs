use std::sync::Arc;

use blockfs::metrics::{BlockOp, MetricsSink, install_metrics_sink};
use tracing::{debug, warn};

/// Tracing target block transfers are logged under.
pub const TARGET: &str = "blockfs_io";

struct TraceSink;

impl MetricsSink for TraceSink {
    fn record_block_op(&self, op: BlockOp) {
        debug!(
            target: TARGET,
            op = ?op.op,
            lba = op.lba,
            blocks = op.blocks,
            latency_us = op.latency_seconds * 1e6,
            error = op.error,
            "block transfer"
        );
    }
}

/// Installs the tracing sink for block transfers; returns false when one was already set.
pub fn install() -> bool {
    let installed = install_metrics_sink(Arc::new(TraceSink));
    if !installed {
        warn!("block transfer sink already installed");
    }
    installed
}
