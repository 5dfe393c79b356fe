use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use leo_handover::config::{parse_duration, Config};
use leo_handover::decision::HandoverStats;
use leo_handover::observer::ObserverId;
use leo_handover::orbit::{ElementCatalog, PropagationCache, Propagator, TleLoader};
use leo_handover::pipeline::{self, ObserverPipeline, Scheduler};
use leo_handover::visibility::WindowScan;

#[derive(Parser)]
#[command(name = "leo-handover")]
#[command(about = "LEO satellite access and handover decisions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and its element sources
    Validate { config: String },
    /// List visibility windows of one observer
    Passes {
        config: String,
        #[arg(long)]
        observer: String,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
    },
    /// Run all observers on simulated time and print decisions as JSON lines
    Simulate {
        config: String,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long, value_parser = parse_duration, default_value = "1s")]
        step: Duration,
    },
    /// Run all observers in real time until interrupted
    Run { config: String },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Passes {
            config,
            observer,
            start,
            end,
        } => passes(&config, &observer, start, end),
        Commands::Simulate {
            config,
            start,
            end,
            step,
        } => simulate(&config, start, end, step),
        Commands::Run { config } => run(&config),
    }
}

fn load_config(path: &str) -> Option<Config> {
    match Config::from_file(path) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("Config error: {}", e);
            None
        }
    }
}

fn load_catalog(config: &Config) -> Option<Arc<ElementCatalog>> {
    let elements = match pipeline::load_elements(&config.elements) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Element error: {}", e);
            return None;
        }
    };
    let cache = PropagationCache::new(
        config.propagation.cache_ttl,
        config.propagation.cache_capacity,
    );
    let catalog = Arc::new(ElementCatalog::new(Arc::new(cache)));
    let report = catalog.ingest(elements);
    for (id, e) in &report.rejected {
        log::warn!("Rejected element for satellite {}: {}", id, e);
    }
    log::info!(
        "Loaded {} satellites ({} rejected)",
        catalog.len(),
        report.rejected.len()
    );
    Some(catalog)
}

fn pipelines(config: &Config, catalog: &ElementCatalog) -> Vec<ObserverPipeline> {
    config
        .observers
        .iter()
        .map(|observer| {
            let propagator =
                Propagator::with_cache(config.propagation.clone(), catalog.cache().clone());
            ObserverPipeline::new(observer.clone(), config, propagator)
        })
        .collect()
}

fn validate(path: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    let Some(catalog) = load_catalog(&config) else {
        return ExitCode::FAILURE;
    };

    println!(
        "Configuration is valid ({} observers, {} satellites)",
        config.observers.len(),
        catalog.len()
    );
    for observer in &config.observers {
        println!(
            "  {}: {:.4}, {:.4} mask {}° every {}",
            observer.id,
            observer.location.latitude_deg,
            observer.location.longitude_deg,
            observer.elevation_mask_deg,
            humantime::format_duration(observer.cadence.to_std().unwrap_or_default())
        );
    }
    println!("  events: {:?}", config.events.enabled);
    ExitCode::SUCCESS
}

fn passes(path: &str, observer: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    let registry = match config.registry() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let observer = match registry.get(&ObserverId::from(observer)) {
        Ok(o) => o.clone(),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some(catalog) = load_catalog(&config) else {
        return ExitCode::FAILURE;
    };

    let scan = WindowScan::new(
        observer,
        Propagator::with_cache(config.propagation.clone(), catalog.cache().clone()),
        catalog.snapshot(),
        &config.visibility,
        start,
        end,
    );
    for window in scan {
        match serde_json::to_string(&window) {
            Ok(line) => println!("{}", line),
            Err(e) => {
                eprintln!("Output error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn simulate(path: &str, start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    let Some(catalog) = load_catalog(&config) else {
        return ExitCode::FAILURE;
    };
    let mut pipelines = pipelines(&config, &catalog);
    let elements = catalog.snapshot();

    let mut failed = false;
    pipeline::simulate(&mut pipelines, &elements, start, end, step, |_, output| {
        match serde_json::to_string(&output.decision) {
            Ok(line) => println!("{}", line),
            Err(e) => {
                log::warn!("Could not serialize decision: {}", e);
                failed = true;
            }
        }
    });

    let stats: BTreeMap<&ObserverId, &HandoverStats> = pipelines
        .iter()
        .map(|p| (&p.observer().id, p.stats()))
        .collect();
    match serde_json::to_string(&stats) {
        Ok(line) => eprintln!("{}", line),
        Err(e) => log::warn!("Could not serialize statistics: {}", e),
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(path: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    let Some(catalog) = load_catalog(&config) else {
        return ExitCode::FAILURE;
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let mut scheduler = Scheduler::new(catalog.clone());
        for pipeline in pipelines(&config, &catalog) {
            if let Err(e) = scheduler.add_observer(pipeline) {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        }
        if let Some(dir) = &config.elements.tle_dir {
            scheduler.reload_from(TleLoader::new(dir.clone()), config.elements.reload_interval);
        }

        let (tx, mut rx) = mpsc::channel(64);
        if let Err(e) = scheduler.start(tx) {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
        println!("Started {} observers at {}", config.observers.len(), Utc::now());

        loop {
            tokio::select! {
                decision = rx.recv() => match decision {
                    Some(decision) => match serde_json::to_string(&decision) {
                        Ok(line) => println!("{}", line),
                        Err(e) => log::warn!("Could not serialize decision: {}", e),
                    },
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        // keep the channel drained while workers finish their last cycle
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let result = scheduler.stop().await;
        drain.abort();
        match result {
            Ok(()) => {
                println!("Stopped");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Scheduler error: {}", e);
                ExitCode::FAILURE
            }
        }
    })
}
