//! 仪表盘统计端点

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use retina_database::DatabaseQueries;
use serde_json::json;
use tracing::error;

use crate::server::AppState;

/// 站点统计端点，返回各站点的AI可用率
pub async fn site_statistics(State(state): State<AppState>) -> impl IntoResponse {
    let queries = DatabaseQueries::new(&state.pool);

    let result = async {
        let sites = queries.list_sites().await?;
        let images = queries.list_images().await?;
        Ok::<_, retina_core::RetinaError>(retina_stats::site_statistics(&sites, &images))
    }
    .await;

    match result {
        Ok(stats) => Json(json!({ "status": "success", "data": stats })).into_response(),
        Err(e) => {
            error!("Failed to compute site statistics: {}", e);
            statistics_error(e)
        }
    }
}

/// 影像质量统计端点，返回质量、解剖与过曝分布
pub async fn image_quality_statistics(State(state): State<AppState>) -> impl IntoResponse {
    let queries = DatabaseQueries::new(&state.pool);

    let result = async {
        let images = queries.list_images().await?;
        Ok::<_, retina_core::RetinaError>(retina_stats::image_quality_statistics(&images))
    }
    .await;

    match result {
        Ok(stats) => Json(json!({ "status": "success", "data": stats })).into_response(),
        Err(e) => {
            error!("Failed to compute image quality statistics: {}", e);
            statistics_error(e)
        }
    }
}

fn statistics_error(e: retina_core::RetinaError) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": "error",
            "message": format!("Failed to retrieve statistics: {}", e)
        })),
    )
        .into_response()
}
