//! HTTP处理器

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use nmdose_core::utils::parse_fhir_datetime;
use nmdose_core::{DoseError, OrderContext, WeightObservation};
use nmdose_engine::{DecisionBuilder, DoseRequest};
use nmdose_fhir::{order_from_service_request, weight_observation, weights_for_patient};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dto::{
    DecisionRequest, DecisionResponse, DecisionView, RecommendRequest, RecommendResponse,
    StudyView, WeightEntryRequest,
};
use crate::error::ApiError;
use crate::server::AppState;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// 健康检查处理器
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "ruleset": state.engine.catalog().version(),
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// 规则目录
pub async fn list_rules(State(state): State<AppState>) -> impl IntoResponse {
    let catalog = state.engine.catalog();
    let studies: Vec<StudyView> = catalog.rules().into_iter().map(StudyView::from).collect();

    Json(json!({
        "ok": true,
        "version": catalog.version(),
        "guideline": catalog.guideline(),
        "studies": studies
    }))
}

/// 剂量推荐
pub async fn recommend(
    State(state): State<AppState>,
    Json(body): Json<RecommendRequest>,
) -> ApiResult<Json<RecommendResponse>> {
    let (order, observations) = read_inputs(&body)?;
    let now = body.evaluated_at.unwrap_or_else(Utc::now);
    info!(
        "Recommendation requested for order {} ({}|{})",
        order.order_id, order.coding.system, order.coding.code
    );

    let assessment = state.engine.assess(DoseRequest {
        order: &order,
        observations: &observations,
        variant: body.variant.as_deref(),
        now,
    })?;
    let rule = state.engine.rule_for(&order)?;

    Ok(Json(RecommendResponse::from_assessment(
        &assessment,
        rule,
        body.variant.as_deref(),
        state.engine.catalog().version(),
        &order.order_id,
    )))
}

/// 提交决策：服务端重新计算推荐后接受或人工调整
pub async fn submit_decision(
    State(state): State<AppState>,
    Json(body): Json<DecisionRequest>,
) -> ApiResult<Json<DecisionResponse>> {
    let (order, observations) = read_inputs(&body.inputs)?;
    let now = body.inputs.evaluated_at.unwrap_or_else(Utc::now);

    let recommendation = state.engine.recommend(DoseRequest {
        order: &order,
        observations: &observations,
        variant: body.inputs.variant.as_deref(),
        now,
    })?;

    if let Some(previous) = body.supersedes {
        check_superseded(&state, previous, &order).await?;
    }

    let mut builder = DecisionBuilder::new(recommendation, order);
    if let Some(note) = &body.note {
        builder = builder.note(note.as_str());
    }
    if let Some(previous) = body.supersedes {
        builder = builder.superseding(previous);
    }

    let record = match &body.override_input {
        Some(input) => builder.override_with(input.activity_mbq, &input.reason)?,
        None => builder.accept()?,
    };

    let stored = state.store.submit(&record).await?;

    Ok(Json(DecisionResponse {
        ok: true,
        id: stored.id,
        decision: DecisionView::from(&record),
        resource: stored.resource,
    }))
}

/// 获取已存储的 MedicationRequest
pub async fn get_decision(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    debug!("Fetching prescription {}", id);
    let stored = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| DoseError::NotFound(format!("MedicationRequest/{}", id)))?;

    Ok(Json(stored.resource))
}

/// 录入新的体重 Observation
pub async fn record_weight(Json(body): Json<WeightEntryRequest>) -> ApiResult<impl IntoResponse> {
    let effective = match body.effective_date_time.as_deref() {
        Some(value) => parse_fhir_datetime(value)
            .ok_or_else(|| DoseError::Fhir(format!("无法解析 effectiveDateTime: {}", value)))?,
        None => Utc::now(),
    };

    let resource = weight_observation(&body.patient_id, body.weight_kg, effective)?;

    Ok(Json(json!({
        "ok": true,
        "id": resource["id"].clone(),
        "weightKg": body.weight_kg,
        "resource": resource
    })))
}

/// 被取代的处方必须存在且基于同一检查申请
async fn check_superseded(state: &AppState, previous: Uuid, order: &OrderContext) -> ApiResult<()> {
    let stored = state
        .store
        .get(&previous.to_string())
        .await?
        .ok_or_else(|| DoseError::NotFound(format!("MedicationRequest/{}", previous)))?;

    let expected = format!("ServiceRequest/{}", order.order_id);
    match stored.based_on() {
        Some(based_on) if based_on == expected => Ok(()),
        other => Err(DoseError::OrderMismatch {
            expected,
            actual: other.unwrap_or_default().to_string(),
        }
        .into()),
    }
}

fn read_inputs(body: &RecommendRequest) -> ApiResult<(OrderContext, Vec<WeightObservation>)> {
    let order = order_from_service_request(&body.service_request)?;
    let observations = weights_for_patient(&body.weight_observations, &order.patient_reference);
    Ok((order, observations))
}
