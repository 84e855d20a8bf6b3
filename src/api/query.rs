use super::{ApiError, AppState};
use crate::identity::canonical_id;
use crate::reconcile::{Status, StatusSource};
use crate::state::{Entity, ExperimentStatus, FieldValue, GroupType};
use crate::topology::EntityKind;
use crate::view::{categorize, EntityFilter};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Query parameters for entity listing
#[derive(Deserialize, Default)]
pub struct EntityQueryParams {
    /// Filter by status (working, faulty, deactivated, unknown)
    pub status: Option<String>,
    /// Filter by entity kind (tile, midspan-port, ...)
    pub kind: Option<String>,
}

impl EntityQueryParams {
    fn filter(&self) -> Result<EntityFilter, ApiError> {
        let status = match self.status.as_deref() {
            Some(raw) => Some(
                Status::parse(raw)
                    .ok_or_else(|| ApiError::BadRequest(format!("invalid status '{}'", raw)))?,
            ),
            None => None,
        };
        let kind = match self.kind.as_deref() {
            Some(raw) => Some(
                EntityKind::parse(raw)
                    .ok_or_else(|| ApiError::BadRequest(format!("invalid kind '{}'", raw)))?,
            ),
            None => None,
        };
        Ok(EntityFilter { status, kind })
    }
}

/// Entity status as rendered to clients
#[derive(Serialize)]
pub struct StatusResponse {
    pub value: Status,
    #[serde(rename = "observedAt")]
    pub observed_at: Option<String>,
    pub source: Option<StatusSource>,
}

/// One telemetry field and when it was observed
#[derive(Serialize)]
pub struct FieldResponse {
    pub value: Value,
    #[serde(rename = "observedAt")]
    pub observed_at: String,
}

impl From<FieldValue> for FieldResponse {
    fn from(field: FieldValue) -> Self {
        Self {
            value: field.value,
            observed_at: field.observed_at.to_rfc3339(),
        }
    }
}

/// Entity response
#[derive(Serialize)]
pub struct EntityResponse {
    pub id: String,
    pub kind: EntityKind,
    pub walls: Vec<String>,
    pub segments: Vec<String>,
    /// Latest value of every field, sorted by name
    pub fields: BTreeMap<String, FieldResponse>,
    pub status: StatusResponse,
    #[serde(rename = "lastReceived")]
    pub last_received: Option<String>,
}

impl From<Entity> for EntityResponse {
    fn from(entity: Entity) -> Self {
        Self {
            id: entity.id,
            kind: entity.kind,
            walls: entity.walls.into_iter().collect(),
            segments: entity.segments.into_iter().collect(),
            fields: entity
                .fields
                .into_iter()
                .map(|(name, field)| (name, field.into()))
                .collect(),
            status: StatusResponse {
                value: entity.status.value,
                observed_at: entity.status.observed_at.map(|t| t.to_rfc3339()),
                source: entity.status.source,
            },
            last_received: entity.last_received.map(|t| t.to_rfc3339()),
        }
    }
}

/// Experiment status response
#[derive(Serialize)]
pub struct ExperimentResponse {
    pub active: bool,
    pub message: String,
    #[serde(rename = "observedAt")]
    pub observed_at: Option<String>,
}

impl From<ExperimentStatus> for ExperimentResponse {
    fn from(status: ExperimentStatus) -> Self {
        Self {
            active: status.active,
            message: status.message,
            observed_at: status.observed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Create query API router
pub fn create_query_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/entities", get(list_entities))
        .route("/api/entities/:id", get(get_entity))
        .route("/api/categories/:group_type", get(get_categories))
        .route("/api/experiment", get(get_experiment))
        .with_state(state)
}

/// GET /api/entities - List all entities sorted by id
///
/// Query parameters:
/// - `status`: only entities currently in this status
/// - `kind`: only entities of this kind
async fn list_entities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EntityQueryParams>,
) -> Result<Json<Vec<EntityResponse>>, ApiError> {
    let filter = params.filter()?;

    let response = state
        .store
        .all()
        .into_iter()
        .filter(|entity| filter.matches(entity))
        .map(EntityResponse::from)
        .collect();

    Ok(Json(response))
}

/// GET /api/entities/:id - Get one entity (id is normalized first)
async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EntityResponse>, ApiError> {
    let entity_id = canonical_id(&id);
    let entity = state
        .store
        .get(&entity_id)
        .ok_or_else(|| ApiError::NotFound(format!("Entity '{}' not found", entity_id)))?;

    Ok(Json(entity.into()))
}

/// GET /api/categories/:group_type - Entities grouped by wall or segment
///
/// Every group is present even when the filter leaves it empty.
async fn get_categories(
    State(state): State<Arc<AppState>>,
    Path(group_type): Path<String>,
    Query(params): Query<EntityQueryParams>,
) -> Result<Json<BTreeMap<String, Vec<EntityResponse>>>, ApiError> {
    let group_type = GroupType::parse(&group_type)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid group type '{}'", group_type)))?;
    let filter = params.filter()?;

    let view = categorize(&state.store, group_type, |entity| filter.matches(entity));
    let response = view
        .into_iter()
        .map(|(group, members)| {
            (group, members.into_iter().map(EntityResponse::from).collect())
        })
        .collect();

    Ok(Json(response))
}

/// GET /api/experiment - Current experiment status
async fn get_experiment(State(state): State<Arc<AppState>>) -> Json<ExperimentResponse> {
    Json(state.store.experiment().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{CommandSink, ControlService};
    use crate::probe::{LivenessProber, ProbeConfig, Reachability, ReachabilityProbe};
    use crate::reconcile::StatusCandidate;
    use crate::state::{EntityStore, EntityUpdate};
    use crate::topology::{Topology, TopologyEntry};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    struct NullSink;

    #[async_trait::async_trait]
    impl CommandSink for NullSink {
        async fn publish(&self, _subject: String, _payload: Vec<u8>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct UpProbe;

    #[async_trait::async_trait]
    impl ReachabilityProbe for UpProbe {
        async fn probe(&self, _host: &str, _timeout: Duration) -> Reachability {
            Reachability::Reachable
        }
    }

    fn create_test_state() -> Arc<AppState> {
        let tile = |id: &str, wall: &str| TopologyEntry {
            id: id.to_string(),
            kind: EntityKind::Tile,
            walls: vec![wall.to_string()],
            segments: vec!["Seg1".to_string()],
        };
        let topology = Topology::from_entries(vec![
            tile("A01", "West"),
            tile("A02", "West"),
            tile("B01", "East"),
            TopologyEntry {
                id: "server".to_string(),
                kind: EntityKind::Server,
                walls: vec![],
                segments: vec![],
            },
        ])
        .unwrap();
        let store = Arc::new(EntityStore::from_topology(&topology));
        let prober = Arc::new(LivenessProber::new(
            Arc::clone(&store),
            Arc::new(UpProbe),
            ProbeConfig::default(),
        ));
        let control = Arc::new(ControlService::new(
            Arc::new(NullSink),
            Arc::clone(&store),
            "rpi.control",
            60,
        ));
        Arc::new(AppState {
            store,
            prober,
            control,
        })
    }

    fn mark(state: &AppState, id: &str, status: Status) {
        state
            .store
            .merge(
                id,
                EntityUpdate::status_only(StatusCandidate::new(status, StatusSource::Telemetry))
                    .with_field("cpuLoad", serde_json::json!(12)),
                Utc.timestamp_opt(100, 0).unwrap(),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_entities_no_filters() {
        let state = create_test_state();

        let result = list_entities(State(state), Query(EntityQueryParams::default()))
            .await
            .unwrap();

        let ids: Vec<&str> = result.0.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["A01", "A02", "B01", "server"]);
    }

    #[tokio::test]
    async fn test_list_entities_status_and_kind_filter() {
        let state = create_test_state();
        mark(&state, "A02", Status::Faulty);

        let params = EntityQueryParams {
            status: Some("faulty".to_string()),
            kind: None,
        };
        let result = list_entities(State(Arc::clone(&state)), Query(params))
            .await
            .unwrap();
        assert_eq!(result.0.len(), 1);
        assert_eq!(result.0[0].id, "A02");
        let cpu_load = &result.0[0].fields["cpuLoad"];
        assert_eq!(cpu_load.value, 12);
        assert_eq!(cpu_load.observed_at, "1970-01-01T00:01:40+00:00");

        let params = EntityQueryParams {
            status: None,
            kind: Some("server".to_string()),
        };
        let result = list_entities(State(state), Query(params)).await.unwrap();
        assert_eq!(result.0.len(), 1);
        assert_eq!(result.0[0].id, "server");
    }

    #[tokio::test]
    async fn test_list_entities_invalid_filter() {
        let state = create_test_state();
        let params = EntityQueryParams {
            status: Some("sleepy".to_string()),
            kind: None,
        };

        let result = list_entities(State(state), Query(params)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_get_entity_normalizes_id() {
        let state = create_test_state();

        let result = get_entity(State(Arc::clone(&state)), Path("a1".to_string()))
            .await
            .unwrap();
        assert_eq!(result.0.id, "A01");
        assert_eq!(result.0.status.value, Status::Unknown);
        assert!(result.0.last_received.is_none());

        let missing = get_entity(State(state), Path("Z99".to_string())).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_categories_keep_empty_groups() {
        let state = create_test_state();
        mark(&state, "B01", Status::Working);

        let params = EntityQueryParams {
            status: Some("working".to_string()),
            kind: None,
        };
        let result = get_categories(State(state), Path("walls".to_string()), Query(params))
            .await
            .unwrap();

        assert_eq!(result.0.len(), 2);
        assert!(result.0["West"].is_empty());
        assert_eq!(result.0["East"][0].id, "B01");
    }

    #[tokio::test]
    async fn test_categories_invalid_group_type() {
        let state = create_test_state();

        let result = get_categories(
            State(state),
            Path("floors".to_string()),
            Query(EntityQueryParams::default()),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_experiment_default() {
        let state = create_test_state();

        let result = get_experiment(State(state)).await;
        assert!(!result.0.active);
        assert!(result.0.observed_at.is_none());
    }
}
