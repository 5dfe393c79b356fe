use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::ElementsConfig;
use crate::decision::{HandoverDecision, HandoverStats};
use crate::events::EventTransition;
use crate::observer::{ObserverError, ObserverId};
use crate::orbit::{ElementCatalog, OrbitalElement, SatelliteId, TleLoadError, TleLoader};
use crate::pipeline::cycle::{CycleOutcome, CycleOutput, ObserverPipeline};
use crate::pipeline::error::PipelineError;

const FALLBACK_CADENCE: std::time::Duration = std::time::Duration::from_secs(1);

/// Last known state of one observer, as published by its worker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObserverStatus {
    pub serving: Option<SatelliteId>,
    pub last_decision: Option<HandoverDecision>,
    pub stats: HandoverStats,
}

#[derive(Debug, Default)]
struct Shared {
    observers: BTreeMap<ObserverId, ObserverStatus>,
}

#[derive(Debug)]
struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<Result<(), PipelineError>>,
}

#[derive(Debug)]
struct Reload {
    loader: TleLoader,
    every: std::time::Duration,
}

/// Runs one cycle loop per observer on the tokio runtime.
///
/// Observers are independent: each worker owns its pipeline and only shares
/// the element catalog. A cycle planned against a catalog generation that
/// changed before commit is discarded and the observer's state stays as it
/// was.
pub struct Scheduler {
    catalog: Arc<ElementCatalog>,
    shared: Arc<StdMutex<Shared>>,
    pending: Vec<ObserverPipeline>,
    transitions: Option<broadcast::Sender<EventTransition>>,
    reload: Option<Reload>,
    workers: Vec<WorkerHandle>,
}

impl Scheduler {
    pub fn new(catalog: Arc<ElementCatalog>) -> Self {
        Self {
            catalog,
            shared: Arc::new(StdMutex::new(Shared::default())),
            pending: Vec::new(),
            transitions: None,
            reload: None,
            workers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, pipeline: ObserverPipeline) -> Result<(), PipelineError> {
        if !self.workers.is_empty() {
            return Err(PipelineError::AlreadyRunning);
        }
        let id = pipeline.observer().id.clone();
        let mut shared = lock(&self.shared);
        if shared.observers.contains_key(&id) {
            return Err(ObserverError::Duplicate(id).into());
        }
        shared.observers.insert(
            id,
            ObserverStatus {
                serving: pipeline.serving(),
                ..ObserverStatus::default()
            },
        );
        drop(shared);
        self.pending.push(pipeline);
        Ok(())
    }

    /// Re-read `loader` every `every` and feed the catalog.
    pub fn reload_from(&mut self, loader: TleLoader, every: chrono::Duration) {
        self.reload = Some(Reload {
            loader,
            every: every.to_std().unwrap_or(FALLBACK_CADENCE),
        });
    }

    /// Stream event transitions. Slow subscribers lose the oldest entries.
    pub fn subscribe_transitions(&mut self, capacity: usize) -> broadcast::Receiver<EventTransition> {
        match &self.transitions {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(capacity.max(1));
                self.transitions = Some(tx);
                rx
            }
        }
    }

    pub fn status(&self, id: &ObserverId) -> Result<ObserverStatus, PipelineError> {
        lock(&self.shared)
            .observers
            .get(id)
            .cloned()
            .ok_or_else(|| ObserverError::Unknown(id.clone()).into())
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    pub fn start(&mut self, decisions: mpsc::Sender<HandoverDecision>) -> Result<(), PipelineError> {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }

        for pipeline in self.pending.drain(..) {
            let (stop_tx, stop_rx) = oneshot::channel();
            let join = tokio::spawn(run_observer_loop(
                pipeline,
                self.catalog.clone(),
                self.shared.clone(),
                decisions.clone(),
                self.transitions.clone(),
                stop_rx,
            ));
            self.workers.push(WorkerHandle { stop_tx, join });
        }

        if let Some(reload) = self.reload.take() {
            let (stop_tx, stop_rx) = oneshot::channel();
            let join = tokio::spawn(run_reload_loop(
                self.catalog.clone(),
                reload.loader,
                reload.every,
                stop_rx,
            ));
            self.workers.push(WorkerHandle { stop_tx, join });
        }

        log::info!("Scheduler started with {} workers", self.workers.len());
        Ok(())
    }

    /// Stop all workers after their current cycle. Returns the first worker error.
    pub async fn stop(&mut self) -> Result<(), PipelineError> {
        let mut result = Ok(());
        for worker in self.workers.drain(..) {
            let _ = worker.stop_tx.send(());
            let outcome = match worker.join.await {
                Ok(r) => r,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = outcome {
                log::warn!("Worker ended with error: {}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

fn lock(shared: &StdMutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_observer_loop(
    mut pipeline: ObserverPipeline,
    catalog: Arc<ElementCatalog>,
    shared: Arc<StdMutex<Shared>>,
    decisions: mpsc::Sender<HandoverDecision>,
    transitions: Option<broadcast::Sender<EventTransition>>,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<(), PipelineError> {
    let id = pipeline.observer().id.clone();
    let cadence = pipeline
        .observer()
        .cadence
        .to_std()
        .unwrap_or(FALLBACK_CADENCE);
    let mut ticker = interval(cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    log::info!("Observer {}: cycling every {:?}", id, cadence);

    loop {
        let should_stop = tokio::select! {
            _ = ticker.tick() => false,
            _ = &mut stop_rx => true,
        };
        if should_stop {
            log::info!("Observer {}: stopped", id);
            return Ok(());
        }

        let generation = catalog.generation();
        let elements = catalog.snapshot();
        let at = Utc::now();
        let (returned, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = pipeline.plan_cycle(at, &elements);
            (pipeline, outcome)
        })
        .await?;
        pipeline = returned;

        let Some(output) = settle(&mut pipeline, outcome, generation, &catalog) else {
            lock(&shared)
                .observers
                .entry(id.clone())
                .or_default()
                .stats = pipeline.stats().clone();
            continue;
        };

        if let Some(tx) = &transitions {
            for transition in output.transitions {
                // no subscribers is fine
                let _ = tx.send(transition);
            }
        }
        {
            let mut locked = lock(&shared);
            let status = locked.observers.entry(id.clone()).or_default();
            status.serving = pipeline.serving();
            status.last_decision = Some(output.decision.clone());
            status.stats = pipeline.stats().clone();
        }

        if decisions.send(output.decision).await.is_err() {
            return Err(PipelineError::ChannelClosed);
        }
    }
}

/// Commit a planned cycle, or discard it if the catalog changed since
/// `generation` was read.
fn settle(
    pipeline: &mut ObserverPipeline,
    outcome: CycleOutcome,
    generation: u64,
    catalog: &ElementCatalog,
) -> Option<CycleOutput> {
    if catalog.generation() != generation {
        pipeline.discard(outcome);
        return None;
    }
    Some(pipeline.commit(outcome))
}

async fn run_reload_loop(
    catalog: Arc<ElementCatalog>,
    loader: TleLoader,
    every: std::time::Duration,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<(), PipelineError> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately; elements were loaded before start
    ticker.tick().await;

    loop {
        let should_stop = tokio::select! {
            _ = ticker.tick() => false,
            _ = &mut stop_rx => true,
        };
        if should_stop {
            return Ok(());
        }

        let worker_loader = loader.clone();
        let worker_catalog = catalog.clone();
        let result = tokio::task::spawn_blocking(move || {
            worker_loader
                .load_all()
                .map(|elements| worker_catalog.ingest(elements))
        })
        .await?;

        match result {
            Ok(report) => log::info!(
                "Reloaded elements from {}: {} added, {} superseded, {} older ignored, {} rejected",
                loader.dir().display(),
                report.added,
                report.superseded,
                report.ignored_older,
                report.rejected.len()
            ),
            Err(e) => log::warn!(
                "Element reload from {} failed, keeping previous set: {}",
                loader.dir().display(),
                e
            ),
        }
    }
}

/// Collect the configured element sets: the TLE directory, if any, then inline entries.
pub fn load_elements(config: &ElementsConfig) -> Result<Vec<OrbitalElement>, TleLoadError> {
    let mut elements = match &config.tle_dir {
        Some(dir) => TleLoader::new(dir.clone()).load_all()?,
        None => Vec::new(),
    };
    elements.extend(config.inline.iter().cloned());
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::observer::Observer;
    use crate::orbit::test_support::{leo_element, ISS_LINE1, ISS_LINE2};
    use crate::orbit::{GroundStation, PropagationCache, PropagationConfig, Propagator};
    use chrono::Duration;
    use std::io::Write;

    fn catalog() -> Arc<ElementCatalog> {
        let catalog = Arc::new(ElementCatalog::new(Arc::new(PropagationCache::new(
            Duration::seconds(5),
            1024,
        ))));
        let now = Utc::now();
        catalog.ingest((1..=6).map(|id| {
            let mut e = leo_element(id);
            e.epoch = now;
            e.raan_rad = id as f64;
            e
        }));
        catalog
    }

    fn pipeline(id: &str, catalog: &ElementCatalog) -> ObserverPipeline {
        let mut observer = Observer::new(id, GroundStation::new(24.94, 121.37, 0.0), 10.0);
        observer.cadence = Duration::milliseconds(20);
        let config = Config {
            elements: Default::default(),
            propagation: PropagationConfig::default(),
            visibility: Default::default(),
            link_budget: Default::default(),
            events: Default::default(),
            decision: Default::default(),
            loads: Default::default(),
            observers: vec![observer.clone()],
        };
        ObserverPipeline::new(
            observer,
            &config,
            Propagator::with_cache(config.propagation.clone(), catalog.cache().clone()),
        )
    }

    #[tokio::test]
    async fn emits_one_decision_per_cycle_per_observer() {
        let catalog = catalog();
        let mut scheduler = Scheduler::new(catalog.clone());
        scheduler.add_observer(pipeline("a", &catalog)).unwrap();
        scheduler.add_observer(pipeline("b", &catalog)).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        scheduler.start(tx).unwrap();
        assert!(matches!(
            scheduler.start(mpsc::channel(1).0),
            Err(PipelineError::AlreadyRunning)
        ));

        let mut seen = BTreeMap::new();
        while seen.values().all(|n: &u32| *n < 3) || seen.len() < 2 {
            let decision = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
                .await
                .expect("decision in time")
                .expect("channel open");
            *seen.entry(decision.observer_id.clone()).or_insert(0) += 1;
        }
        scheduler.stop().await.unwrap();

        let status = scheduler.status(&"a".into()).unwrap();
        assert!(status.stats.cycles >= 1);
        assert!(status.last_decision.is_some());
        assert!(matches!(
            scheduler.status(&"nope".into()),
            Err(PipelineError::Observer(ObserverError::Unknown(_)))
        ));
    }

    #[tokio::test]
    async fn duplicate_observer_is_rejected() {
        let catalog = catalog();
        let mut scheduler = Scheduler::new(catalog.clone());
        scheduler.add_observer(pipeline("a", &catalog)).unwrap();
        assert!(matches!(
            scheduler.add_observer(pipeline("a", &catalog)),
            Err(PipelineError::Observer(ObserverError::Duplicate(_)))
        ));
    }

    #[tokio::test]
    async fn closed_decision_channel_ends_worker_with_error() {
        let catalog = catalog();
        let mut scheduler = Scheduler::new(catalog.clone());
        scheduler.add_observer(pipeline("a", &catalog)).unwrap();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        scheduler.start(tx).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(matches!(
            scheduler.stop().await,
            Err(PipelineError::ChannelClosed)
        ));
    }

    #[test]
    fn element_update_during_planning_discards_the_cycle() {
        let catalog = catalog();
        let mut pipeline = pipeline("a", &catalog);

        let generation = catalog.generation();
        let outcome = pipeline.plan_cycle(Utc::now(), &catalog.snapshot());
        let mut newer = leo_element(1);
        newer.epoch = Utc::now() + Duration::minutes(1);
        newer.raan_rad = 1.0;
        assert_eq!(catalog.ingest([newer]).superseded, 1);

        assert!(settle(&mut pipeline, outcome, generation, &catalog).is_none());
        assert_eq!(pipeline.stats().discarded_cycles, 1);
        assert_eq!(pipeline.stats().cycles, 0);
        assert_eq!(pipeline.serving(), None);

        let generation = catalog.generation();
        let outcome = pipeline.plan_cycle(Utc::now(), &catalog.snapshot());
        assert!(settle(&mut pipeline, outcome, generation, &catalog).is_some());
        assert_eq!(pipeline.stats().discarded_cycles, 1);
        assert_eq!(pipeline.stats().cycles, 1);
    }

    #[test]
    fn loads_directory_and_inline_elements() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("stations.tle")).unwrap();
        writeln!(file, "ISS (ZARYA)\n{}\n{}", ISS_LINE1, ISS_LINE2).unwrap();

        let config = ElementsConfig {
            tle_dir: Some(dir.path().to_path_buf()),
            inline: vec![leo_element(7)],
            ..ElementsConfig::default()
        };
        let elements = load_elements(&config).unwrap();
        let ids: Vec<_> = elements.iter().map(|e| e.satellite_id).collect();
        assert_eq!(ids, vec![SatelliteId(25544), SatelliteId(7)]);
    }
}
