//! Handlers for theme descriptors consumed by the form front end.

use axum::extract::Path;
use axum::Json;
use pau_core::theme::{Theme, ThemeDescriptor};

use crate::response::DataResponse;

/// GET /api/v1/themes
///
/// Every supported theme, default first.
pub async fn list_themes() -> Json<DataResponse<Vec<ThemeDescriptor>>> {
    Json(DataResponse {
        data: Theme::ALL.iter().map(|t| t.descriptor()).collect(),
    })
}

/// GET /api/v1/themes/{name}
///
/// Descriptor of the theme `name` resolves to. Unknown names resolve to the
/// default theme.
pub async fn get_theme(Path(name): Path<String>) -> Json<DataResponse<ThemeDescriptor>> {
    Json(DataResponse {
        data: Theme::resolve(&name).descriptor(),
    })
}
