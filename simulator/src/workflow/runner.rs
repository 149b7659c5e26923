use crate::generator::profile::SimulatedRadio;
use crate::gui_bridge::bridge::{ActiveLoop, GuiBridge};
use crate::workflow::config::{SessionMode, WorkflowConfig};
use anyhow::Context;
use log::{info, warn};
use rfidcore::processing::{
    run_session, AssignmentWorkflow, PresenceReport, PresenceView, ReconEvent,
    ReconciliationLoop, UnassignedView,
};
use rfidcore::store::{FileStore, MemoryStore, NameAssignment, NameStore, NameStoreAdapter};
use rfidcore::tag_interface::{
    normalize, ParameterSnapshot, RadioInterface, ReaderParameters, TagId,
};
use rfidcore::telemetry::ScanMetrics;
use rfidcore::ReconciliationView;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time;

#[derive(Debug, Clone, Serialize)]
pub struct AssignSummary {
    pub detected: Vec<TagId>,
    pub unassigned: Vec<TagId>,
    pub assigned: Vec<NameAssignment>,
    pub rejected: Vec<String>,
    pub tag_count: u64,
    pub metrics: ScanMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub report: PresenceReport,
    /// Objects announced as arriving during the scan, in order.
    pub arrivals: Vec<String>,
    pub removed: Vec<String>,
    pub tag_count: u64,
    pub metrics: ScanMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParametersSummary {
    pub parameters: ParameterSnapshot,
    pub single_read: Option<TagId>,
    pub messages: Vec<String>,
}

/// Parses `TAG=NAME` as given on the command line.
pub fn parse_assignment(raw: &str) -> Result<(TagId, String), String> {
    let (tag, name) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TAG=NAME, got `{}`", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing object name in `{}`", raw));
    }
    Ok((normalize(tag.trim()), name.to_string()))
}

/// Owns the simulated radio and the name store for one process.
pub struct Runner {
    config: WorkflowConfig,
    radio: Arc<SimulatedRadio>,
    store: Arc<dyn NameStore>,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> anyhow::Result<Self> {
        config.validate().context("validating workflow config")?;
        let store: Arc<dyn NameStore> = match &config.store_dir {
            Some(dir) => Arc::new(
                FileStore::open(dir)
                    .with_context(|| format!("opening name store {}", dir.display()))?,
            ),
            None => Arc::new(MemoryStore::new()),
        };
        let radio = Arc::new(SimulatedRadio::new(config.radio.clone()));
        info!(
            "simulated reader with {} tags, store {}",
            radio.population().len(),
            config
                .store_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| "in memory".into())
        );

        Ok(Self {
            config,
            radio,
            store,
        })
    }

    pub fn mode(&self) -> SessionMode {
        self.config.mode
    }

    pub fn adapter(&self) -> NameStoreAdapter {
        NameStoreAdapter::with_key(self.store.clone(), &self.config.store_key)
    }

    pub fn workflow(&self) -> AssignmentWorkflow {
        AssignmentWorkflow::new(self.adapter())
    }

    fn build_loop<V: ReconciliationView + 'static>(
        &self,
        view: V,
    ) -> anyhow::Result<ReconciliationLoop<V>> {
        ReconciliationLoop::new(
            self.radio.clone(),
            self.adapter(),
            view,
            self.config.to_scan_config(),
        )
        .context("initializing reconciliation loop")
    }

    fn scan_duration(&self) -> Duration {
        let interval = self.config.to_scan_config().poll_interval();
        interval * self.config.ticks + interval / 2
    }

    /// Scans for the configured number of ticks, then applies `requests`.
    pub async fn run_assign(&self, requests: &[(TagId, String)]) -> anyhow::Result<AssignSummary> {
        let recon = self.build_loop(UnassignedView::new())?;
        let workflow = self.workflow();
        let requests = requests.to_vec();
        let duration = self.scan_duration();

        run_session(&recon, |recon| async move {
            recon.start().await.context("starting scan")?;
            time::sleep(duration).await;
            recon.stop().await.context("stopping scan")?;

            let mut unassigned = recon.view().await;
            let mut assigned = Vec::new();
            let mut rejected = Vec::new();
            for (tag, name) in requests {
                match workflow.assign(&unassigned, &tag, &name).await {
                    Ok(outcome) => {
                        unassigned = outcome.unassigned;
                        assigned.push(NameAssignment {
                            tag_id: tag,
                            object_name: name.trim().to_string(),
                        });
                    }
                    Err(err) => {
                        warn!("cannot assign `{}` to {}: {}", name, tag, err);
                        rejected.push(format!("{}={}: {}", tag, name, err));
                    }
                }
            }
            recon.refresh_view().await.context("refreshing unassigned list")?;

            let status = recon.status().await;
            Ok::<_, anyhow::Error>(AssignSummary {
                detected: status.accumulated,
                unassigned: status.view,
                assigned,
                rejected,
                tag_count: status.tag_count,
                metrics: status.metrics,
            })
        })
        .await
    }

    /// Scans for the configured number of ticks, then removes `unassign` names.
    pub async fn run_check(&self, unassign: &[String]) -> anyhow::Result<CheckSummary> {
        let recon = self.build_loop(PresenceView::new())?;
        let workflow = self.workflow();
        let unassign = unassign.to_vec();
        let duration = self.scan_duration();
        let mut events = recon.subscribe();

        let (report, removed, tag_count, metrics) = run_session(&recon, |recon| async move {
            recon.start().await.context("starting scan")?;
            time::sleep(duration).await;
            recon.stop().await.context("stopping scan")?;

            let mut removed = Vec::new();
            for name in unassign {
                let outcome = workflow
                    .unassign(&name)
                    .await
                    .with_context(|| format!("unassigning `{}`", name))?;
                match outcome.removed {
                    Some(tag) => {
                        info!("removed `{}` (tag {})", name, tag);
                        removed.push(name);
                    }
                    None => warn!("no assignment named `{}`", name),
                }
            }
            recon.refresh_view().await.context("refreshing presence report")?;

            let status = recon.status().await;
            Ok::<_, anyhow::Error>((status.view, removed, status.tag_count, status.metrics))
        })
        .await?;

        Ok(CheckSummary {
            report,
            arrivals: drain_arrivals(&mut events),
            removed,
            tag_count,
            metrics,
        })
    }

    /// Opens the radio, reads its parameters, and optionally changes them.
    pub async fn read_parameters(
        &self,
        set_power: Option<u8>,
        set_region: Option<&str>,
    ) -> anyhow::Result<ParametersSummary> {
        self.radio.open().await.context("opening radio")?;
        let params = ReaderParameters::new(self.radio.clone());
        let result = self.apply_parameters(&params, set_power, set_region).await;
        if let Err(err) = self.radio.close().await {
            warn!("failed to close radio: {}", err);
        }
        result
    }

    async fn apply_parameters(
        &self,
        params: &ReaderParameters,
        set_power: Option<u8>,
        set_region: Option<&str>,
    ) -> anyhow::Result<ParametersSummary> {
        let mut messages = Vec::new();
        if let Some(dbm) = set_power {
            messages.push(params.set_power(dbm).await.context("setting power")?);
        }
        if let Some(region) = set_region {
            messages.push(params.set_region(region).await.context("setting region")?);
        }

        let single_read = match self.radio.inventory_once(1_000).await {
            Ok(raw) => Some(normalize(&raw)),
            Err(err) => {
                warn!("single inventory failed: {}", err);
                None
            }
        };

        Ok(ParametersSummary {
            parameters: params.snapshot().await,
            single_read,
            messages,
        })
    }

    /// Serves the HTTP bridge for the configured mode until Ctrl+C.
    pub async fn serve(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let workflow = self.workflow();
        match self.config.mode {
            SessionMode::Assign => {
                let recon = self.build_loop(UnassignedView::new())?;
                run_session(&recon, |recon| {
                    serve_until_interrupted(ActiveLoop::Assign(recon), workflow, addr)
                })
                .await
            }
            SessionMode::Check => {
                let recon = self.build_loop(PresenceView::new())?;
                run_session(&recon, |recon| {
                    serve_until_interrupted(ActiveLoop::Check(recon), workflow, addr)
                })
                .await
            }
        }
    }
}

async fn serve_until_interrupted(
    active: ActiveLoop,
    workflow: AssignmentWorkflow,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let bridge = GuiBridge::new(active, workflow);
    let (bound, server) = warp::serve(bridge.routes())
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {}", err);
            }
        })
        .with_context(|| format!("binding HTTP bridge on {}", addr))?;

    bridge.publish_status(&format!(
        "HTTP bridge on http://{} (Ctrl+C to stop)...",
        bound
    ));
    server.await;
    Ok(())
}

fn drain_arrivals(events: &mut broadcast::Receiver<ReconEvent>) -> Vec<String> {
    let mut arrivals = Vec::new();
    loop {
        match events.try_recv() {
            Ok(ReconEvent::NewlyPresent(names)) => arrivals.extend(names),
            Ok(_) => {}
            Err(TryRecvError::Lagged(missed)) => warn!("missed {} loop events", missed),
            Err(_) => break,
        }
    }
    arrivals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::GeneratorConfig;
    use rfidcore::processing::PresenceStatus;
    use tempfile::tempdir;

    fn config(mode: SessionMode, tags: &[&str], store_dir: Option<std::path::PathBuf>) -> WorkflowConfig {
        WorkflowConfig {
            mode,
            ticks: 3,
            poll_interval_ms: 10,
            store_dir,
            radio: GeneratorConfig {
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
                detection_rate: 1.0,
                duplicate_rate: 0.5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn parse_assignment_normalizes_tag() {
        let (tag, name) = parse_assignment("1A2B0000= Laptop ").unwrap();
        assert_eq!(tag.as_str(), "1A2B");
        assert_eq!(name, "Laptop");
        assert!(parse_assignment("1A2B").is_err());
        assert!(parse_assignment("1A2B=  ").is_err());
    }

    #[tokio::test]
    async fn assign_then_check_share_the_file_store() {
        let dir = tempdir().unwrap();
        let assign = Runner::new(config(
            SessionMode::Assign,
            &["1A2B", "3C4D"],
            Some(dir.path().to_path_buf()),
        ))
        .unwrap();

        let summary = assign
            .run_assign(&[
                (TagId::from("1A2B"), "Laptop".into()),
                (TagId::from("FFFF"), "Ghost".into()),
            ])
            .await
            .unwrap();
        assert_eq!(summary.assigned.len(), 1);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.unassigned, vec![TagId::from("3C4D")]);

        let check = Runner::new(config(
            SessionMode::Check,
            &["1A2B"],
            Some(dir.path().to_path_buf()),
        ))
        .unwrap();
        let report = check.run_check(&[]).await.unwrap();
        assert_eq!(report.report.entries.len(), 1);
        assert_eq!(report.report.entries[0].status, PresenceStatus::Present);
        assert_eq!(report.arrivals, vec!["Laptop"]);
    }

    #[tokio::test]
    async fn check_reports_missing_and_removes_names() {
        let dir = tempdir().unwrap();
        let cfg = config(SessionMode::Check, &["AA"], Some(dir.path().to_path_buf()));
        let runner = Runner::new(cfg).unwrap();
        let workflow = runner.workflow();
        workflow
            .assign(&[TagId::from("BB")], &TagId::from("BB"), "Keys")
            .await
            .unwrap();
        workflow
            .assign(&[TagId::from("AA")], &TagId::from("AA"), "Laptop")
            .await
            .unwrap();

        let summary = runner.run_check(&["Keys".to_string()]).await.unwrap();
        assert_eq!(summary.removed, vec!["Keys"]);
        assert_eq!(summary.report.entries.len(), 1);
        assert_eq!(summary.report.entries[0].object_name, "Laptop");
        assert!(workflow.assignments().await.get(&TagId::from("BB")).is_none());
    }

    #[tokio::test]
    async fn parameters_round_trip_through_radio() {
        let runner = Runner::new(config(SessionMode::Assign, &["AA"], None)).unwrap();
        let summary = runner.read_parameters(Some(18), Some("ETSI")).await.unwrap();

        assert_eq!(summary.parameters.power_dbm, Some(18));
        assert_eq!(summary.parameters.region.as_deref(), Some("ETSI"));
        assert_eq!(summary.single_read, Some(TagId::from("AA")));
        assert_eq!(summary.messages.len(), 2);
    }

    #[tokio::test]
    async fn parameters_reject_out_of_range_power() {
        let runner = Runner::new(config(SessionMode::Assign, &["AA"], None)).unwrap();
        assert!(runner.read_parameters(Some(45), None).await.is_err());
    }
}
