//! Demo entry point: drives a small graph against the mock board.
//!
//! Pass a TOML graph description as the first argument to run it
//! instead of the builtin button-invert-led demo. Simulated button
//! presses arrive from a separate thread, standing in for interrupts.

use anyhow::Context;
use flowrt::desc::GraphDescription;
use flowrt::hal::mock::MockBoard;
use flowrt::nodes::Registry;
use flowrt::runtime::FlowRuntime;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEMO_GRAPH: &str = r#"
    [[nodes]]
    name = "button"
    type = "gpio/reader"
    options = { pin = 4 }

    [[nodes]]
    name = "invert"
    type = "boolean/not"

    [[nodes]]
    name = "led"
    type = "gpio/writer"
    options = { pin = 7 }

    [[links]]
    src = "button"
    src_port = "OUT"
    dst = "invert"
    dst_port = "IN"

    [[links]]
    src = "invert"
    src_port = "OUT"
    dst = "led"
    dst_port = "IN"
"#;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,flowrt=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let text = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read graph description {path:?}"))?,
        None => DEMO_GRAPH.to_owned(),
    };
    let desc = GraphDescription::from_toml(&text).context("invalid graph description")?;

    let board = MockBoard::new();
    let registry = Registry::with_builtins(Arc::new(board.clone()));
    let mut runtime = FlowRuntime::new();
    desc.build(&registry, &mut runtime)
        .context("failed to build graph")?;
    tracing::info!(nodes = runtime.graph().node_count(), "graph is up");

    // Simulated button presses from outside the mainloop thread.
    let stop = runtime.stop_flag();
    let presses = std::thread::spawn(move || {
        for i in 0..6 {
            std::thread::sleep(Duration::from_millis(200));
            let level = i % 2 == 0;
            board.fire_gpio(4, level);
            tracing::info!(level, written = ?board.written(7), "edge fired");
        }
        stop.store(false, std::sync::atomic::Ordering::Release);
    });

    runtime.run(Duration::from_millis(50));
    presses.join().ok();
    tracing::info!("done");
    Ok(())
}
