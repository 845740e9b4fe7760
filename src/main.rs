use clap::Parser;
use image_fault_injector::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

mod config;
use config::{Args, Config};

use git_version::git_version;
const GIT_VERSION: &str = git_version!(fallback = "unknown");

/// Program to build faulty image data sets from a directory of normal images
///
fn main() -> Result<(), String> {
    // Get parameter from command line and optional config file
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.override_with_args(&args);
            config
        }
        None => Config::from_args(&args),
    };

    // Switch on with: RUST_LOG=debug or --log-level debug
    match &config.log_level {
        Some(level) => env_logger::Builder::new().parse_filters(level).init(),
        None => env_logger::init(),
    }

    println!("--- Image fault injector: {GIT_VERSION} ---\n");

    let request = config.to_request()?;
    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let gateway = Arc::new(ImageGateway::new(rng.gen()));
    let ledger = SessionLedger::load(&config.log_dir).map_err(|e| e.to_string())?;

    let mut injector = FaultInjector::new(gateway, ledger);
    let report = injector
        .run_injection(&request, &mut rng)
        .map_err(|e| e.to_string())?;

    print!("{report}");
    Ok(())
}
