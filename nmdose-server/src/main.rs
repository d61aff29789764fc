//! 剂量推荐服务主程序

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use nmdose_engine::{Catalog, DoseEngine};
use nmdose_fhir::InMemoryPrescriptionStore;
use nmdose_web::{AppState, WebServer};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigValidator, ServiceConfig};

/// 剂量推荐服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "nmdose-server")]
#[command(about = "儿科核医学放射性药物剂量推荐服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 服务器端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 规则定义文件
    #[arg(short, long)]
    rules: Option<String>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(rules) = args.rules {
        config.rules.path = Some(rules);
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // 初始化日志
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    ConfigValidator::new().validate(&config)?;

    info!("启动剂量推荐服务...");

    let catalog = match &config.rules.path {
        Some(path) => Catalog::load_from_path(path)
            .with_context(|| format!("Failed to load rule definition from {}", path))?,
        None => Catalog::bundled().context("Failed to load bundled rule definition")?,
    };

    info!("服务配置:");
    info!("  规则版本: {}", catalog.version());
    info!("  检查类型: {}", catalog.len());
    info!("  体重回溯天数: {}", config.weight.lookback_days);
    info!("  过期体重视为缺失: {}", config.weight.stale_as_missing);

    let engine = DoseEngine::new(Arc::new(catalog), config.weight_policy());
    let state = AppState::new(Arc::new(engine), Arc::new(InMemoryPrescriptionStore::new()));
    let server = WebServer::new(config.listen_addr()?, state);

    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}
