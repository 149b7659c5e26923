use crate::gui_bridge::model::{AssignRequest, BridgeReply, UnassignRequest};
use log::warn;
use rfidcore::processing::{
    AssignmentWorkflow, PresenceView, ReconciliationLoop, UnassignedView,
};
use rfidcore::tag_interface::{normalize, TagId};
use rfidcore::{ReconError, ReconResult};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Reply};

pub fn gui_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

/// The loop a bridge drives, by screen.
#[derive(Clone)]
pub enum ActiveLoop {
    Assign(ReconciliationLoop<UnassignedView>),
    Check(ReconciliationLoop<PresenceView>),
}

impl ActiveLoop {
    pub async fn start(&self) -> ReconResult<()> {
        match self {
            Self::Assign(recon) => recon.start().await,
            Self::Check(recon) => recon.start().await,
        }
    }

    pub async fn stop(&self) -> ReconResult<()> {
        match self {
            Self::Assign(recon) => recon.stop().await,
            Self::Check(recon) => recon.stop().await,
        }
    }

    pub async fn clear(&self) -> ReconResult<()> {
        match self {
            Self::Assign(recon) => recon.clear().await,
            Self::Check(recon) => recon.clear().await,
        }
    }

    pub async fn refresh_view(&self) -> ReconResult<()> {
        match self {
            Self::Assign(recon) => recon.refresh_view().await,
            Self::Check(recon) => recon.refresh_view().await,
        }
    }

    /// Unassigned detections; always empty on the check screen.
    pub async fn unassigned(&self) -> Vec<TagId> {
        match self {
            Self::Assign(recon) => recon.view().await,
            Self::Check(_) => Vec::new(),
        }
    }

    pub async fn status(&self) -> Value {
        let value = match self {
            Self::Assign(recon) => serde_json::to_value(recon.status().await),
            Self::Check(recon) => serde_json::to_value(recon.status().await),
        };
        value.unwrap_or_else(|err| {
            warn!("failed to encode loop status: {}", err);
            Value::Null
        })
    }

    pub async fn report(&self) -> Value {
        let value = match self {
            Self::Assign(recon) => serde_json::to_value(recon.view().await),
            Self::Check(recon) => serde_json::to_value(recon.view().await),
        };
        value.unwrap_or_else(|err| {
            warn!("failed to encode view: {}", err);
            Value::Null
        })
    }
}

/// HTTP surface over one reconciliation loop and the assignment workflow.
pub struct GuiBridge {
    active: ActiveLoop,
    workflow: AssignmentWorkflow,
}

impl GuiBridge {
    pub fn new(active: ActiveLoop, workflow: AssignmentWorkflow) -> Self {
        Self { active, workflow }
    }

    pub fn routes(&self) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
        let active = self.active.clone();
        let active_filter = warp::any().map(move || active.clone());
        let workflow = self.workflow.clone();
        let workflow_filter = warp::any().map(move || workflow.clone());

        let status_route = warp::path("status")
            .and(warp::path::end())
            .and(warp::get())
            .and(active_filter.clone())
            .and_then(|active: ActiveLoop| async move {
                Ok::<_, Infallible>(warp::reply::json(&active.status().await))
            });

        let report_route = warp::path("report")
            .and(warp::path::end())
            .and(warp::get())
            .and(active_filter.clone())
            .and_then(|active: ActiveLoop| async move {
                Ok::<_, Infallible>(warp::reply::json(&active.report().await))
            });

        let unassigned_route = warp::path("unassigned")
            .and(warp::path::end())
            .and(warp::get())
            .and(active_filter.clone())
            .and_then(|active: ActiveLoop| async move {
                Ok::<_, Infallible>(warp::reply::json(&active.unassigned().await))
            });

        let assignments_route = warp::path("assignments")
            .and(warp::path::end())
            .and(warp::get())
            .and(workflow_filter.clone())
            .and_then(|workflow: AssignmentWorkflow| async move {
                Ok::<_, Infallible>(warp::reply::json(&workflow.assignments().await))
            });

        let start_route = warp::path!("scan" / "start")
            .and(warp::post())
            .and(active_filter.clone())
            .and_then(|active: ActiveLoop| async move {
                let result = active.start().await.map(|_| "scanning started".to_string());
                Ok::<_, Infallible>(reply_result(result))
            });

        let stop_route = warp::path!("scan" / "stop")
            .and(warp::post())
            .and(active_filter.clone())
            .and_then(|active: ActiveLoop| async move {
                let result = active.stop().await.map(|_| "scanning stopped".to_string());
                Ok::<_, Infallible>(reply_result(result))
            });

        let clear_route = warp::path!("scan" / "clear")
            .and(warp::post())
            .and(active_filter.clone())
            .and_then(|active: ActiveLoop| async move {
                let result = active.clear().await.map(|_| "detections cleared".to_string());
                Ok::<_, Infallible>(reply_result(result))
            });

        let assign_route = warp::path("assign")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and(active_filter.clone())
            .and(workflow_filter.clone())
            .and_then(
                |request: AssignRequest, active: ActiveLoop, workflow: AssignmentWorkflow| async move {
                    Ok::<_, Infallible>(reply_result(assign_tag(request, active, workflow).await))
                },
            );

        let unassign_route = warp::path("unassign")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and(active_filter)
            .and(workflow_filter)
            .and_then(
                |request: UnassignRequest, active: ActiveLoop, workflow: AssignmentWorkflow| async move {
                    Ok::<_, Infallible>(unassign_name(request, active, workflow).await)
                },
            );

        status_route
            .or(report_route)
            .or(unassigned_route)
            .or(assignments_route)
            .or(start_route)
            .or(stop_route)
            .or(clear_route)
            .or(assign_route)
            .or(unassign_route)
    }

    pub fn publish_status(&self, message: &str) {
        println!("[GUI] {}", message);
    }
}

async fn assign_tag(
    request: AssignRequest,
    active: ActiveLoop,
    workflow: AssignmentWorkflow,
) -> ReconResult<String> {
    let tag = normalize(&request.tag);
    let unassigned = active.unassigned().await;
    workflow.assign(&unassigned, &tag, &request.name).await?;
    active.refresh_view().await?;
    Ok(format!("assigned `{}` to {}", request.name.trim(), tag))
}

async fn unassign_name(
    request: UnassignRequest,
    active: ActiveLoop,
    workflow: AssignmentWorkflow,
) -> WithStatus<Json> {
    let outcome = match workflow.unassign(&request.name).await {
        Ok(outcome) => outcome,
        Err(err) => return reply_result(Err(err)),
    };
    match outcome.removed {
        Some(tag) => {
            if let Err(err) = active.refresh_view().await {
                return reply_result(Err(err));
            }
            reply_result(Ok(format!("removed `{}` from {}", request.name, tag)))
        }
        None => warp::reply::with_status(
            warp::reply::json(&json!({
                "status": "error",
                "message": format!("no assignment named `{}`", request.name)
            })),
            StatusCode::NOT_FOUND,
        ),
    }
}

fn reply_result(result: ReconResult<String>) -> WithStatus<Json> {
    match result {
        Ok(message) => warp::reply::with_status(
            warp::reply::json(&BridgeReply::ok(message)),
            StatusCode::OK,
        ),
        Err(err) => {
            warn!("bridge request failed: {}", err);
            warp::reply::with_status(
                warp::reply::json(&BridgeReply::error(&err)),
                status_for(&err),
            )
        }
    }
}

fn status_for(err: &ReconError) -> StatusCode {
    match err {
        ReconError::InvalidAssignment(_) | ReconError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ReconError::AlreadyScanning => StatusCode::CONFLICT,
        ReconError::RadioCommand(_) | ReconError::RadioRead(_) => StatusCode::BAD_GATEWAY,
        ReconError::StoreRead(_) | ReconError::StoreWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{GeneratorConfig, SimulatedRadio};
    use rfidcore::processing::PresenceReport;
    use rfidcore::store::{MemoryStore, NameStoreAdapter};
    use rfidcore::tag_interface::RadioInterface;
    use rfidcore::ScanConfig;
    use std::sync::Arc;

    fn bridge(tags: &[&str]) -> (GuiBridge, ReconciliationLoop<UnassignedView>, Arc<SimulatedRadio>) {
        let radio = Arc::new(SimulatedRadio::new(GeneratorConfig {
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            detection_rate: 1.0,
            ..Default::default()
        }));
        let store = NameStoreAdapter::new(Arc::new(MemoryStore::new()));
        let recon = ReconciliationLoop::new(
            radio.clone(),
            store.clone(),
            UnassignedView::new(),
            ScanConfig::default(),
        )
        .unwrap();
        let bridge = GuiBridge::new(
            ActiveLoop::Assign(recon.clone()),
            AssignmentWorkflow::new(store),
        );
        (bridge, recon, radio)
    }

    #[tokio::test]
    async fn assign_route_names_an_unassigned_tag() {
        let (bridge, recon, radio) = bridge(&["AA", "BB"]);
        radio.open().await.unwrap();
        recon.start().await.unwrap();
        recon.poll_once().await;
        let routes = bridge.routes();

        let unassigned: Vec<TagId> = serde_json::from_slice(
            warp::test::request()
                .method("GET")
                .path("/unassigned")
                .reply(&routes)
                .await
                .body(),
        )
        .unwrap();
        assert_eq!(unassigned.len(), 2);

        let reply = warp::test::request()
            .method("POST")
            .path("/assign")
            .json(&json!({"tag": "AA000000", "name": "Laptop"}))
            .reply(&routes)
            .await;
        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(recon.view().await, vec![TagId::from("BB")]);

        let reply = warp::test::request()
            .method("POST")
            .path("/assign")
            .json(&json!({"tag": "CC", "name": "Keys"}))
            .reply(&routes)
            .await;
        assert_eq!(reply.status(), StatusCode::BAD_REQUEST);
        recon.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn scan_routes_report_conflicts_and_missing_names() {
        let (bridge, recon, radio) = bridge(&["AA"]);
        radio.open().await.unwrap();
        let routes = bridge.routes();

        let start = || warp::test::request().method("POST").path("/scan/start");
        assert_eq!(start().reply(&routes).await.status(), StatusCode::OK);
        assert_eq!(start().reply(&routes).await.status(), StatusCode::CONFLICT);

        let reply = warp::test::request()
            .method("POST")
            .path("/unassign")
            .json(&json!({"name": "Nobody"}))
            .reply(&routes)
            .await;
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);

        let reply = warp::test::request()
            .method("POST")
            .path("/scan/stop")
            .reply(&routes)
            .await;
        assert_eq!(reply.status(), StatusCode::OK);
        recon.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn check_loop_serves_presence_report() {
        let radio = Arc::new(SimulatedRadio::new(GeneratorConfig {
            tags: vec!["AA".into()],
            detection_rate: 1.0,
            ..Default::default()
        }));
        let store = NameStoreAdapter::new(Arc::new(MemoryStore::with_value(
            "assignedTags",
            r#"{"AA":"Laptop","BB":"Keys"}"#,
        )));
        let recon = ReconciliationLoop::new(
            radio.clone(),
            store.clone(),
            PresenceView::new(),
            ScanConfig::default(),
        )
        .unwrap();
        let bridge = GuiBridge::new(ActiveLoop::Check(recon.clone()), AssignmentWorkflow::new(store));
        radio.open().await.unwrap();
        recon.start().await.unwrap();
        recon.poll_once().await;

        let reply = warp::test::request()
            .method("GET")
            .path("/report")
            .reply(&bridge.routes())
            .await;
        let report: Value = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(report["entries"].as_array().map(Vec::len), Some(2));
        assert_eq!(report["entries"][0]["status"], "present");
        assert_eq!(report["entries"][1]["status"], "missing");
        let decoded: PresenceReport = serde_json::from_value(report).unwrap();
        assert_eq!(decoded.present_count(), 1);
        recon.shutdown().await.unwrap();
    }
}
