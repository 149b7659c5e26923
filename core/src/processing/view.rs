use crate::prelude::{
    ReconError, ReconResult, ReconciliationView, ScanConfig, ViewInput, ViewMetadata, ViewOutput,
};
use crate::processing::classifier::{classify, unassigned, PresenceReport};
use crate::tag_interface::TagId;
use crate::telemetry::log::LogManager;

/// View behind the scan-and-assign screen: detected tags with no name yet.
pub struct UnassignedView {
    config: Option<ScanConfig>,
    logger: LogManager,
}

impl UnassignedView {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::for_component("unassigned_view"),
        }
    }
}

impl Default for UnassignedView {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationView for UnassignedView {
    type Output = Vec<TagId>;

    fn initialize(&mut self, config: &ScanConfig) -> ReconResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: ViewInput<'_>) -> ReconResult<ViewOutput<Vec<TagId>>> {
        if self.config.is_none() {
            return Err(ReconError::InvalidInput("view not initialized".into()));
        }

        let tags = unassigned(input.accumulated, input.assignments);
        self.logger.detail(&format!(
            "{} unassigned of {} detected",
            tags.len(),
            input.accumulated.len()
        ));

        let metadata = ViewMetadata {
            entry_count: tags.len(),
            ..Default::default()
        };
        Ok(ViewOutput {
            view: tags,
            metadata,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

/// View behind the check screen: present/missing status per assignment.
///
/// Keeps the previous cycle's report so each object is announced once when
/// it turns present.
pub struct PresenceView {
    config: Option<ScanConfig>,
    previous: PresenceReport,
    logger: LogManager,
}

impl PresenceView {
    pub fn new() -> Self {
        Self {
            config: None,
            previous: PresenceReport::default(),
            logger: LogManager::for_component("presence_view"),
        }
    }
}

impl Default for PresenceView {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationView for PresenceView {
    type Output = PresenceReport;

    fn initialize(&mut self, config: &ScanConfig) -> ReconResult<()> {
        self.config = Some(config.clone());
        self.previous = PresenceReport::default();
        Ok(())
    }

    fn execute(&mut self, input: ViewInput<'_>) -> ReconResult<ViewOutput<PresenceReport>> {
        if self.config.is_none() {
            return Err(ReconError::InvalidInput("view not initialized".into()));
        }

        let report = classify(input.accumulated, input.assignments);
        let newly_present = report.newly_present(&self.previous);
        if !newly_present.is_empty() {
            self.logger
                .record(&format!("now present: {}", newly_present.join(", ")));
        }

        let metadata = ViewMetadata {
            newly_present,
            entry_count: report.len(),
            notes: vec![format!(
                "present {} / missing {}",
                report.present_count(),
                report.missing_count()
            )],
        };
        self.previous = report.clone();

        Ok(ViewOutput {
            view: report,
            metadata,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
        self.previous = PresenceReport::default();
    }
}
