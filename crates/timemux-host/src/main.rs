#![forbid(unsafe_code)]

use anyhow::Context;
use timemux::{ClientId, TimeServerConfig};
use timemux_host::{self_check, Host, SelfCheckPlan};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match TimeServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("invalid config: {err}");
            return Err(err.into());
        }
    };

    let host = match Host::start(&config) {
        Ok(host) => host,
        Err(err) => {
            tracing::error!("time server failed to start: {err}");
            return Err(err.into());
        }
    };

    let plan = SelfCheckPlan::for_tick_period(ClientId::new(0), host.server().tick_period_ns());
    let report = self_check(&host, plan).context("self-check request failed")?;
    tracing::info!(
        periodic_fired = report.periodic_fired,
        oneshot_fired = report.oneshot_fired,
        notifications = report.notifications,
        elapsed_ns = report.elapsed_ns,
        "self-check complete"
    );

    let ticks = host.shutdown().context("dispatch thread failed")?;
    tracing::info!(ticks, "time server stopped");

    anyhow::ensure!(report.passed(), "self-check did not observe both timers firing");
    Ok(())
}
