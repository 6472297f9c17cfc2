//! 视网膜影像数据管理服务器主程序

mod config;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use retina_core::Result;
use retina_database::{DatabasePool, DatabaseQueries};
use retina_import::{ImportConfig, ImportPipeline};
use retina_storage::FileStore;
use retina_web::{AppState, WebServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::RetinaConfig;

/// 服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "retina-server")]
#[command(about = "视网膜影像数据管理服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别（覆盖配置文件）
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 启动Web服务器
    Serve {
        /// 监听主机（覆盖配置文件）
        #[arg(long)]
        host: Option<String>,

        /// 监听端口（覆盖配置文件）
        #[arg(long)]
        port: Option<u16>,
    },
    /// 运行随机化导入流水线
    Import {
        /// 受试者CSV文件
        #[arg(long)]
        csv_file: Option<PathBuf>,

        /// 真实影像文件目录
        #[arg(long)]
        images_folder: PathBuf,

        /// 目标站点数
        #[arg(long, default_value_t = 3)]
        site_count: usize,

        /// 目标最少受试者数
        #[arg(long, default_value_t = 10)]
        min_patients: usize,

        /// 合成回填时每名受试者的最大影像数
        #[arg(long, default_value_t = 3)]
        max_images_per_patient: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = RetinaConfig::load(args.config.as_deref())?;

    // 初始化日志
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&log_level))
        .init();

    match args.command {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Import {
            csv_file,
            images_folder,
            site_count,
            min_patients,
            max_images_per_patient,
        } => {
            let import_config = ImportConfig {
                csv_file,
                images_folder,
                site_count,
                min_patients,
                max_images_per_patient,
            };
            import(config, import_config).await
        }
    }
}

/// 初始化数据库和文件存储
async fn bootstrap(config: &RetinaConfig) -> Result<(DatabasePool, FileStore)> {
    info!("连接数据库...");
    let pool = DatabasePool::connect(&config.database.url, config.database.max_connections).await?;

    let queries = DatabaseQueries::new(&pool);
    queries.create_tables().await?;
    info!("数据库初始化完成");

    let files = FileStore::new(
        &config.storage.upload_dir,
        config.storage.web_dir.as_ref().map(PathBuf::from),
    );
    files.ensure_dirs().await?;

    Ok((pool, files))
}

async fn serve(config: RetinaConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    info!("启动视网膜影像服务器...");

    let (pool, files) = bootstrap(&config).await?;

    let host = host.unwrap_or(config.server.host);
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| retina_core::RetinaError::Config(format!("无效的监听地址: {}", e)))?;

    info!("服务器配置:");
    info!("  监听地址: {}", addr);
    info!("  上传目录: {}", config.storage.upload_dir);

    let server = WebServer::new(addr, AppState { pool, files });

    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        return Err(e);
    }

    Ok(())
}

async fn import(config: RetinaConfig, import_config: ImportConfig) -> Result<()> {
    info!("启动导入流水线...");

    let (pool, files) = bootstrap(&config).await?;
    let queries = DatabaseQueries::new(&pool);

    let mut pipeline = ImportPipeline::new(&queries, &files, StdRng::from_entropy());
    let report = pipeline.run(&import_config).await?;

    info!("导入完成:");
    info!(
        "  受试者: 新建 {}, 更新 {}, 失败 {}",
        report.patients.created, report.patients.updated, report.patients.errored
    );
    info!("  新建站点: {}", report.sites_created);
    info!("  生成受试者: {}", report.patients_generated);
    info!(
        "  影像: 入库 {}, 失败 {}",
        report.images_processed, report.images_errored
    );

    Ok(())
}
