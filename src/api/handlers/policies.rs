use crate::AppState;
use crate::services::registry::ContentClass;
use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

/// Public view of a content class. Signatures and internals stay server-side.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentClassView {
    pub name: String,
    pub max_size_bytes: u64,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
}

impl From<&ContentClass> for ContentClassView {
    fn from(class: &ContentClass) -> Self {
        Self {
            name: class.name.clone(),
            max_size_bytes: class.max_size,
            allowed_extensions: class
                .allowed_extensions()
                .into_iter()
                .map(str::to_string)
                .collect(),
            allowed_content_types: class
                .allowed_declared_mime_types()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/policies",
    responses(
        (status = 200, description = "Configured upload policies", body = Vec<ContentClassView>)
    ),
    tag = "system"
)]
pub async fn list_policies(State(state): State<AppState>) -> Json<Vec<ContentClassView>> {
    Json(
        state
            .registry
            .classes()
            .iter()
            .map(ContentClassView::from)
            .collect(),
    )
}
