use clap::Parser;
use dashboard::metrics::{ALERTS_TOTAL, READINGS_TOTAL};
use dashboard::registry::DEFAULT_FLEET_SIZE;
use dashboard::{Alert, Fleet, WorkbookFile};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "simulator", about = "Advances every truck's sensor and flushes the workbook")]
struct Args {
    #[arg(long, env = "FLEET_WORKBOOK", default_value = "flota.json")]
    workbook: PathBuf,

    /// Trucks created when the workbook does not exist yet
    #[arg(long, env = "FLEET_SIZE", default_value_t = DEFAULT_FLEET_SIZE)]
    trucks: u32,

    /// Interval between fleet updates
    #[arg(long, env = "RATE_MS", default_value_t = 1000)]
    rate_ms: u64,

    /// Stop after this many updates, 0 runs until interrupted
    #[arg(long, env = "TICKS", default_value_t = 0)]
    ticks: u64,

    /// Fixed RNG seed for reproducible runs
    #[arg(long, env = "SEED")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting fleet simulator");
    info!(
        "Workbook: {}, Rate: {} ms, Ticks: {}",
        args.workbook.display(),
        args.rate_ms,
        args.ticks
    );

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut workbook = WorkbookFile::new(args.workbook.clone());

    if let Err(e) = Fleet::bootstrap(&mut workbook, args.trucks, &mut rng) {
        error!("Failed to create workbook: {}", e);
        std::process::exit(1);
    }

    let mut fleet = match Fleet::load(&workbook, &mut rng) {
        Ok(loaded) => loaded.fleet,
        Err(e) => {
            error!("Failed to read workbook: {}", e);
            std::process::exit(1);
        }
    };
    info!("Simulating {} trucks", fleet.len());

    let interval = Duration::from_millis(args.rate_ms);
    let mut counter = 0u64;

    loop {
        let tick_start = Instant::now();

        fleet.simulate_all(&mut rng);
        counter += 1;

        for truck in fleet.trucks() {
            let sensor = truck.sensor();
            if let Some(latest) = sensor.history().latest() {
                match sensor.classify(latest) {
                    Alert::Normal => {}
                    alert => warn!("{} {}: {:.2} °C", truck.display_key(), alert, latest.value),
                }
            }
        }

        // the workbook write may back off and retry, keep it off the scheduler
        if let Err(e) = tokio::task::block_in_place(|| fleet.persist_all(&mut workbook)) {
            warn!("Workbook not updated on tick {}: {}", counter, e);
        }

        // Log progress periodically
        if counter % 10 == 0 {
            info!(
                "Tick {}: {} readings, {} overheat, {} freeze",
                counter,
                READINGS_TOTAL.get(),
                ALERTS_TOTAL.with_label_values(&[Alert::Overheat.as_str()]).get(),
                ALERTS_TOTAL.with_label_values(&[Alert::Freeze.as_str()]).get()
            );
        }

        if args.ticks > 0 && counter >= args.ticks {
            info!("Finished {} ticks", counter);
            break;
        }

        let elapsed = tick_start.elapsed();
        debug!("Tick {} took {:?}", counter, elapsed);
        if elapsed < interval {
            tokio::select! {
                _ = tokio::time::sleep(interval - elapsed) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        } else if elapsed > interval * 2 {
            warn!("Tick took {:?}, target was {:?} - workbook writes may be too slow", elapsed, interval);
        }
    }
}
