//! Optional process-wide observer of block transfers. Nothing is timed until a sink is
//! installed.

use std::sync::{Arc, OnceLock};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IoOpType {
    Read,
    Write,
}

/// One block transfer issued against the store.
#[derive(Copy, Clone, Debug)]
pub struct BlockOp {
    pub op: IoOpType,
    pub lba: u64,
    pub blocks: u64,
    pub latency_seconds: f64,
    pub error: bool,
}

/// Receives every block transfer the store adapters perform.
pub trait MetricsSink: Send + Sync + 'static {
    fn record_block_op(&self, op: BlockOp);
}

static METRICS_SINK: OnceLock<Arc<dyn MetricsSink>> = OnceLock::new();

/// Installs the sink for the rest of the process; returns false if one is already set.
pub fn install_metrics_sink(sink: Arc<dyn MetricsSink>) -> bool {
    METRICS_SINK.set(sink).is_ok()
}

pub fn is_enabled() -> bool {
    METRICS_SINK.get().is_some()
}

pub fn record_block_op(op: BlockOp) {
    if let Some(sink) = METRICS_SINK.get() {
        sink.record_block_op(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct TestSink {
        ops: Mutex<Vec<BlockOp>>,
    }

    impl MetricsSink for TestSink {
        fn record_block_op(&self, op: BlockOp) {
            self.ops.lock().unwrap().push(op);
        }
    }

    #[test]
    fn metrics_sink_records_ops_when_enabled() {
        let sink = Arc::new(TestSink {
            ops: Mutex::new(Vec::new()),
        });

        assert!(install_metrics_sink(sink.clone()));
        assert!(is_enabled());

        record_block_op(BlockOp {
            op: IoOpType::Write,
            lba: 4242,
            blocks: 3,
            latency_seconds: 0.002,
            error: true,
        });

        // Other tests in the crate transfer blocks concurrently once the sink is set.
        let ops = sink.ops.lock().unwrap();
        let recorded = ops
            .iter()
            .find(|op| op.lba == 4242 && op.blocks == 3)
            .expect("op recorded");
        assert_eq!(recorded.op, IoOpType::Write);
        assert!(recorded.error);
    }
}
