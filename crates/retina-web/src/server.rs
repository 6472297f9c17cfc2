//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use retina_core::{Result, RetinaError};
use retina_database::DatabasePool;
use retina_storage::FileStore;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use crate::dashboard::{image_quality_statistics, site_statistics};
use crate::handlers::{
    api_root, create_patient, create_site, delete_image, delete_patient, delete_site, get_image,
    get_patient, get_site, health, list_patient_images, list_patients, list_sites, update_image,
    update_patient, update_site, upload_image,
};

/// 上传请求体上限：20MB
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// 共享应用状态
#[derive(Clone)]
pub struct AppState {
    pub pool: DatabasePool,
    pub files: FileStore,
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        let app = Self::create_app(state);

        Self { addr, app }
    }

    fn create_app(state: AppState) -> Router {
        let web_dir = state.files.web_dir().map(|p| p.to_path_buf());

        let mut app = Router::new()
            // 根路径
            .route("/", get(api_root))
            // 健康检查
            .route("/health", get(health))
            // API路由
            .nest("/api/v1", api_routes())
            .with_state(state);

        // 已上传影像的静态文件服务
        if let Some(dir) = web_dir {
            app = app.nest_service("/uploads", ServeDir::new(dir));
        }

        // 全局中间件
        app.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| RetinaError::Internal(format!("Failed to start web server: {}", e)))?;

        Ok(())
    }
}

/// API v1 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api_root))
        // 受试者
        .route("/patients", get(list_patients).post(create_patient))
        .route(
            "/patients/:id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        // 受试者影像
        .route(
            "/patients/:id/images",
            get(list_patient_images).post(upload_image),
        )
        // 站点
        .route("/sites", get(list_sites).post(create_site))
        .route(
            "/sites/:id",
            get(get_site).put(update_site).delete(delete_site),
        )
        // 影像
        .route(
            "/images/:id",
            get(get_image).put(update_image).delete(delete_image),
        )
        // 仪表盘统计
        .route("/statistics/sites", get(site_statistics))
        .route("/statistics/images", get(image_quality_statistics))
}
