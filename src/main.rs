use anyhow::anyhow;
use clap::Parser;
use ise_probe::{config::Config, console, monitor};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    info!("starting with {config:?}");

    let ct = CancellationToken::new();

    {
        let ct = ct.clone();
        ctrlc::set_handler(move || {
            info!("received ctrl+c, exiting");
            ct.cancel();
        })?;
    }

    let (cmd_tx, cmd_rx) = flume::bounded(256);
    let (evt_tx, evt_rx) = flume::bounded(256);

    let probe_join = monitor::spawn_thread(config, ct.clone(), cmd_rx, evt_tx);
    // blocks on stdin, so it is left running on exit
    let _console_join = console::spawn_thread(cmd_tx);

    for evt in evt_rx.iter() {
        info!("{evt}");
    }

    probe_join
        .join()
        .map_err(|_| anyhow!("probe thread panicked"))??;

    info!("exit");

    Ok(())
}
