//! Web服务器

use axum::{
    routing::{get, post},
    Router,
};
use nmdose_core::Result;
use nmdose_engine::DoseEngine;
use nmdose_fhir::PrescriptionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{
    get_decision, health, list_rules, recommend, record_weight, submit_decision,
};

/// 请求处理共享状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DoseEngine>,
    pub store: Arc<dyn PrescriptionStore>,
}

impl AppState {
    pub fn new(engine: Arc<DoseEngine>, store: Arc<dyn PrescriptionStore>) -> Self {
        Self { engine, store }
    }
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            app: create_app(state),
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;

        Ok(())
    }
}

/// 构建路由
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rules", get(list_rules))
        .nest("/cds/nm-dose", dose_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

fn dose_routes() -> Router<AppState> {
    Router::new()
        .route("/recommend", post(recommend))
        .route("/decisions", post(submit_decision))
        .route("/decisions/:id", get(get_decision))
        .route("/weights", post(record_weight))
}
