//! Sequential execution of the scenario catalog.

use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use tracing::{debug, info, warn};

use s3conform_core::{ConformanceCase, QuirkMatrix, QuirkSet, Scenario, StorageProvider};

use crate::error::Result;
use crate::report::{CaseReport, RunReport};

/// Include/exclude patterns over `suite.name`. Patterns must match the whole
/// name.
#[derive(Debug, Clone, Default)]
pub struct ScenarioFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

fn anchored(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}

impl ScenarioFilter {
    /// Compiles the patterns; `None` places no constraint.
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self> {
        Ok(Self {
            include: include.map(anchored).transpose()?,
            exclude: exclude.map(anchored).transpose()?,
        })
    }

    /// Selects every scenario.
    pub fn all() -> Self {
        Self::default()
    }

    /// True when `scenario` is included and not excluded.
    pub fn matches(&self, scenario: &Scenario) -> bool {
        let name = scenario.full_name();
        let included = self.include.as_ref().map_or(true, |re| re.is_match(&name));
        let excluded = self.exclude.as_ref().is_some_and(|re| re.is_match(&name));
        included && !excluded
    }

    /// The matching scenarios, in catalog order.
    pub fn select(&self, catalog: impl IntoIterator<Item = Scenario>) -> Vec<Scenario> {
        catalog.into_iter().filter(|s| self.matches(s)).collect()
    }
}

/// Runs scenarios one after another against a single provider.
pub struct Runner {
    target: String,
    provider: Box<dyn StorageProvider>,
    quirks: Arc<QuirkMatrix>,
}

impl Runner {
    /// `quirks` are the quirks declared for the target, not the ones a
    /// reference service emulates.
    pub fn new(target: impl Into<String>, provider: Box<dyn StorageProvider>, quirks: QuirkSet) -> Self {
        Self {
            target: target.into(),
            provider,
            quirks: Arc::new(QuirkMatrix::new(quirks)),
        }
    }

    /// Quirks declared for the target.
    pub fn quirks(&self) -> &QuirkSet {
        self.quirks.quirks()
    }

    /// Runs `scenarios` in order.
    pub async fn run(&self, scenarios: &[Scenario]) -> RunReport {
        self.run_with(scenarios, |_| {}).await
    }

    /// Runs `scenarios` in order, handing each result to `on_case` as soon as
    /// it is known.
    pub async fn run_with<F>(&self, scenarios: &[Scenario], mut on_case: F) -> RunReport
    where
        F: FnMut(&CaseReport),
    {
        info!(
            target_uri = %self.target,
            scenarios = scenarios.len(),
            quirks = self.quirks().len(),
            "starting conformance run"
        );
        let mut report = RunReport::new(&self.target, self.quirks().clone());
        let run_start = Instant::now();

        for scenario in scenarios {
            debug!(scenario = %scenario.full_name(), "queued");
            let start = Instant::now();
            let outcome = ConformanceCase::new(*scenario, Arc::clone(&self.quirks))
                .run(self.provider.as_ref())
                .await;
            let case = CaseReport::new(scenario, outcome, start.elapsed());
            on_case(&case);
            report.add_case(case);
        }

        report.duration = run_start.elapsed();
        if report.is_passing() {
            info!(summary = %report.summary_line(), "conformance run finished");
        } else {
            warn!(summary = %report.summary_line(), "conformance run finished with failures");
        }
        report
    }
}
