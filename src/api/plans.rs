//! Plan endpoints: per-user CRUD and plan generation

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::identity::require_identity;
use super::{ApiError, ApiState};
use crate::budget::form::PlanForm;
use crate::budget::{Expense, Plan, PlanDraft, PlanId};
use crate::render;
use crate::store::Identity;
use crate::Error;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build plans router; every route requires an identity
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(list_plans).post(create_plan))
        .route("/generate", post(generate_plan))
        .route("/{id}", get(get_plan).put(update_plan).delete(delete_plan))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_identity))
        .with_state(state)
}

async fn list_plans(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<Plan>>> {
    Ok(Json(state.store.list(Some(&identity))?))
}

async fn get_plan(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<Plan>> {
    let id = PlanId::from(id);
    state
        .store
        .get(Some(&identity), &id)?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("plan {id}")).into())
}

async fn create_plan(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Json(draft): Json<PlanDraft>,
) -> ApiResult<(StatusCode, Json<Plan>)> {
    let plan = state.store.create(Some(&identity), draft)?;
    tracing::info!(plan_id = %plan.id, user_id = identity.user_id(), "plan created");
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn update_plan(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(draft): Json<PlanDraft>,
) -> ApiResult<Json<Plan>> {
    let plan = state.store.update(Some(&identity), &PlanId::from(id), draft)?;
    tracing::info!(plan_id = %plan.id, user_id = identity.user_id(), "plan updated");
    Ok(Json(plan))
}

async fn delete_plan(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete(Some(&identity), &PlanId::from(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// A money field sent either as a JSON number or as typed text
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AmountField {
    Number(serde_json::Number),
    Text(String),
}

impl Default for AmountField {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl AmountField {
    fn into_text(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// Expense line in a generation request
#[derive(Debug, Deserialize)]
pub struct GenerateExpense {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub amount: AmountField,
}

/// Plan generation request
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub income: AmountField,
    #[serde(default)]
    pub expenses: Vec<GenerateExpense>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl GenerateRequest {
    fn into_form(self) -> PlanForm {
        PlanForm {
            name: String::new(),
            income: self.income.into_text(),
            expenses: self
                .expenses
                .into_iter()
                .map(|e| Expense::new(e.category, e.amount.into_text()))
                .collect(),
            notes: self.notes.unwrap_or_default(),
        }
    }
}

/// Generated plan in both display forms
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub plan_text: String,
    /// Escaped HTML with `<br>` line breaks, safe to insert directly
    pub plan_html: String,
}

async fn generate_plan(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    let input = request.into_form().validate()?;
    let generator = state
        .generator
        .as_ref()
        .ok_or_else(|| Error::Config("plan generation is not configured".to_string()))?;

    let plan_text = generator.generate(&input).await?;
    tracing::info!(
        provider = generator.name(),
        user_id = identity.user_id(),
        words = plan_text.split_whitespace().count(),
        "plan generated"
    );

    Ok(Json(GenerateResponse {
        plan_html: render::to_html(&plan_text),
        plan_text,
    }))
}
