use clap::Parser;
use dashboard::commands::{parse_command, Command, HELP};
use dashboard::config::Config;
use dashboard::{metrics, Event, Fleet, Monitor, Session, TruckView, WorkbookFile};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    info!("Starting fleet dashboard");
    info!(
        "Workbook: {}, tick: {:?}",
        config.workbook.display(),
        config.tick()
    );

    if let Err(e) = metrics::init_metrics() {
        warn!("Metrics registry unavailable: {}", e);
    }

    let mut rng = StdRng::from_entropy();
    let mut workbook = WorkbookFile::new(config.workbook.clone());

    match Fleet::bootstrap(&mut workbook, config.trucks, &mut rng) {
        Ok(true) => info!("Created {}", workbook.path().display()),
        Ok(false) => {}
        Err(e) => {
            error!("Failed to create workbook: {}", e);
            std::process::exit(1);
        }
    }

    let loaded = match Fleet::load(&workbook, &mut rng) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Failed to read workbook: {}", e);
            std::process::exit(1);
        }
    };
    for (sheet, e) in &loaded.skipped {
        println!("[warn] sheet {} ignored: {}", sheet, e);
    }

    let mut monitor = Monitor::new(loaded.fleet, workbook, rng, config.tenant());
    let mut session = Session::new();
    info!("Session {} started", session.id());

    // Lines from stdin, read on their own task so live ticks keep going
    let (tx, mut rx) = mpsc::channel::<String>(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("stdin error: {}", e);
                    break;
                }
            }
        }
    });

    println!("{}", HELP);

    loop {
        if session.state().is_live() {
            tokio::select! {
                step = monitor.live_tick(session, config.tick()) => match step {
                    Ok((next_monitor, next_session, notice)) => {
                        monitor = next_monitor;
                        session = next_session;
                        println!("{}", notice);
                    }
                    Err(e) => {
                        error!("Live update failed: {}", e);
                        return shutdown();
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    return shutdown();
                }
            }

            // commands typed during the delay apply after the tick
            let keep_going =
                tokio::task::block_in_place(|| drain_pending(&mut rx, &mut monitor, &mut session));
            if !keep_going {
                return shutdown();
            }
            continue;
        }

        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => {
                    let keep_going =
                        tokio::task::block_in_place(|| run_line(&mut monitor, &mut session, &line));
                    if !keep_going {
                        return shutdown();
                    }
                }
                None => return shutdown(),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                return shutdown();
            }
        }
    }
}

fn shutdown() {
    info!("Shutting down");
}

/// Applies every line already queued. Returns false on `quit` or once stdin
/// has closed.
fn drain_pending(
    rx: &mut mpsc::Receiver<String>,
    monitor: &mut Monitor<WorkbookFile, StdRng>,
    session: &mut Session,
) -> bool {
    loop {
        match rx.try_recv() {
            Ok(line) => {
                if !run_line(monitor, session, &line) {
                    return false;
                }
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => {
                info!("Input closed");
                return false;
            }
        }
    }
}

/// Applies one typed line. Returns false when the user asked to quit.
fn run_line(
    monitor: &mut Monitor<WorkbookFile, StdRng>,
    session: &mut Session,
    line: &str,
) -> bool {
    let command = match parse_command(line) {
        Ok(command) => command,
        Err(message) => {
            if !message.is_empty() {
                println!("[warn] {}", message);
            }
            return true;
        }
    };

    match command {
        Command::Quit => return false,
        Command::Help => println!("{}", HELP),
        Command::Metrics => print!("{}", metrics::gather_metrics()),
        Command::Show => render(monitor.view(session)),
        Command::List(needle) => {
            if !session.is_authenticated() {
                println!("[warn] log in first");
                return true;
            }
            let keys = monitor.list(session, &needle);
            if keys.is_empty() {
                println!("[error] no trucks match {:?}", needle);
            }
            for key in keys {
                println!("  {}", key);
            }
        }
        Command::Event(Event::Select(target)) => {
            // accept a bare truck id as well as the full display key
            let key = monitor
                .fleet()
                .key_for_id(&target)
                .map(str::to_string)
                .unwrap_or(target);
            println!("{}", monitor.handle(session, Event::Select(key)));
            render(monitor.view(session));
        }
        Command::Event(event) => {
            let redraw = matches!(event, Event::Reset);
            println!("{}", monitor.handle(session, event));
            if redraw {
                render(monitor.view(session));
            }
        }
    }

    true
}

fn render(view: Option<TruckView>) {
    let view = match view {
        Some(view) => view,
        None => {
            println!("(no truck selected)");
            return;
        }
    };

    println!("── {} (sensor {}) ──", view.key, view.sensor_id);
    println!(
        "   limits {:.1} .. {:.1} °C",
        view.bounds.lower(),
        view.bounds.upper()
    );
    match (&view.latest, view.alert) {
        (Some(latest), Some(alert)) => println!(
            "   latest {:.2} °C at {} [{}]",
            latest.value,
            latest.timestamp.format("%H:%M:%S"),
            alert
        ),
        _ => println!("   no readings yet"),
    }
    if let Some(mean) = view.mean {
        println!("   mean {:.2} °C over {} readings", mean, view.total);
    }
    println!("   {} readings out of range", view.critical);
    for (upper, value, lower) in &view.chart {
        println!("   {:>7.2} {:>7.2} {:>7.2}", upper, value, lower);
    }
}
