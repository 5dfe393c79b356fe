use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::orbit::PreparedElement;
use crate::pipeline::cycle::{CycleOutput, ObserverPipeline};

/// Step every pipeline through `[start, end]` on simulated time.
///
/// Cycles run in timestamp order, observers in the order given, so a run
/// over the same elements always produces the same decisions.
pub fn simulate<F>(
    pipelines: &mut [ObserverPipeline],
    elements: &[Arc<PreparedElement>],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
    mut sink: F,
) where
    F: FnMut(&ObserverPipeline, &CycleOutput),
{
    if step <= Duration::zero() {
        log::warn!("Simulation step must be positive, nothing to do");
        return;
    }
    let mut at = start;
    while at <= end {
        for pipeline in pipelines.iter_mut() {
            let output = pipeline.run_cycle(at, elements);
            sink(pipeline, &output);
        }
        at += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::decision::ReasonCode;
    use crate::orbit::test_support::{ISS_LINE1, ISS_LINE2};
    use crate::orbit::{OrbitalElement, PropagationConfig, Propagator};

    fn run() -> Vec<(ReasonCode, Option<u32>)> {
        let config = Config::from_str(
            r#"
observers:
  - id: ottawa
    location: { latitude_deg: 45.0, longitude_deg: -75.0 }
"#,
        )
        .unwrap();
        let element =
            OrbitalElement::from_tle(Some("ISS".into()), ISS_LINE1, ISS_LINE2, None).unwrap();
        let start = element.epoch;
        let elements = vec![Arc::new(PreparedElement::new(element).unwrap())];
        let mut pipelines = vec![ObserverPipeline::new(
            config.observers[0].clone(),
            &config,
            Propagator::new(PropagationConfig::default()),
        )];

        let mut out = Vec::new();
        simulate(
            &mut pipelines,
            &elements,
            start,
            start + Duration::hours(24),
            Duration::seconds(30),
            |_, o| out.push((o.decision.reason, o.decision.target.map(|t| t.0))),
        );
        out
    }

    #[test]
    fn single_satellite_passes_attach_and_detach() {
        let decisions = run();
        assert_eq!(decisions.len(), 24 * 120 + 1);
        let attached = decisions
            .iter()
            .filter(|(r, _)| *r == ReasonCode::InitialAccess)
            .count();
        assert!(attached >= 1);
        assert!(decisions
            .iter()
            .all(|(r, t)| *r != ReasonCode::InitialAccess || *t == Some(25544)));
    }

    #[test]
    fn runs_are_deterministic() {
        assert_eq!(run(), run());
    }
}
