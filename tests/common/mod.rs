#![allow(dead_code)]

use async_trait::async_trait;
use plait::node::{Node, NodeContext, NodeError, NodePartial};
use plait::reducers::ReducerSpec;
use plait::runtimes::{EventBusConfig, RuntimeConfig};
use plait::state::{StateSchema, StateSnapshot};

/// Node that does nothing; useful for topology-only tests.
pub struct NoopNode;

#[async_trait]
impl Node for NoopNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        Ok(NodePartial::default())
    }
}

/// Runtime config with no stdout sink, keeping test output clean.
pub fn quiet_runtime() -> RuntimeConfig {
    RuntimeConfig::new().with_event_bus(EventBusConfig::silent())
}

/// Opt-in tracing for debugging test runs: `RUST_LOG=plait=debug cargo test`.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Schema with a sum counter and an append trace, the two field shapes
/// most scenarios need.
pub fn counter_schema() -> StateSchema {
    StateSchema::builder()
        .field("count", ReducerSpec::Sum)
        .field("trace", ReducerSpec::Append)
        .build()
}
