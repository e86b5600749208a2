// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::net::SocketAddr;

use clap::Parser;
use log::{debug, info, LevelFilter};

use keylink_sim::*;

/// KeyLink device simulator
///
/// Serves simulated KeyLink devices over the HTTP relay protocol,
/// for use with `keylink` clients and integration tests.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Listen address
    #[clap(long, env, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Devices to create at startup
    #[clap(long = "device")]
    devices: Vec<String>,

    #[clap(flatten)]
    sim_opts: Options,

    /// Log level
    #[clap(long, default_value = "debug")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging
    let mut c = simplelog::ConfigBuilder::new();
    c.add_filter_ignore_str("hyper");

    let _ = simplelog::SimpleLogger::init(args.log_level, c.build());

    info!(
        "Launching simulator (firmware: {:?}, unknown devices: {})",
        args.sim_opts.fw_version, args.sim_opts.unknown
    );

    let s = Simulator::new(args.sim_opts.clone());
    for d in &args.devices {
        s.add_device(d);
    }

    let (_addr, h) = s.bind(args.listen).await?;

    // Await server exit or exit signal
    tokio::select!(
        _ = h => {
            debug!("Complete!");
        }
        // Exit on ctrl + c
        _ = tokio::signal::ctrl_c() => {
            debug!("Exit!");
        },
    );

    Ok(())
}
