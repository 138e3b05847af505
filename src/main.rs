mod analyzer;
mod config;
mod llm;
mod parser;
mod prompts;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::schema::SCHEMA_PATH;
use crate::config::{AnalysisSchema, AppConfig, ModelConfig, SETTINGS_PATH};
use llm::{check, LlmClient};
use parser::StructurePipeline;
use storage::PaperWorkspace;
use utils::logger;

#[derive(Parser)]
#[command(name = "paperagent")]
#[command(about = "学术论文结构化解析与深度分析工具", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成默认配置和目录
    Init,
    /// 检查语言模型与视觉模型API的连通性
    Check {
        /// 测试图片，不指定时使用内置的小图
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// 第1步：合并PDF目录与Markdown正文，生成结构化数据
    Preprocess {
        /// 论文名称（不含.pdf后缀，与解析输出目录同名）
        paper: String,
    },
    /// 第2步：把论文章节映射到分析分类
    Structure { paper: String },
    /// 第3步：逐张分析图表
    Images { paper: String },
    /// 第4步：按分类深度分析章节内容（支持断点续传）
    Content { paper: String },
    /// 第5步：全局洞察
    Insight { paper: String },
    /// 第6步：生成最终报告
    Report { paper: String },
    /// 依次执行全部六步
    Run { paper: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 配置文件可能还不存在（例如 init 之前），此时用默认级别
    let level = AppConfig::load()
        .map(|config| config.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    logger::init_logger(&level);
    info!("paperagent 启动");

    match cli.command {
        Commands::Init => init_command().await?,
        Commands::Check { image } => check_command(image).await?,
        Commands::Preprocess { paper } => preprocess_command(&paper).await?,
        Commands::Structure { paper } => structure_command(&paper).await?,
        Commands::Images { paper } => images_command(&paper).await?,
        Commands::Content { paper } => content_command(&paper).await?,
        Commands::Insight { paper } => insight_command(&paper).await?,
        Commands::Report { paper } => report_command(&paper).await?,
        Commands::Run { paper } => run_command(&paper).await?,
    }

    Ok(())
}

async fn init_command() -> Result<()> {
    info!("初始化系统...");

    let app_config = AppConfig::default();
    tokio::fs::create_dir_all("config").await?;
    for dir in [
        &app_config.paths.pdf_dir,
        &app_config.paths.parsed_dir,
        &app_config.paths.output_dir,
    ] {
        tokio::fs::create_dir_all(dir).await?;
    }

    app_config.save(SETTINGS_PATH)?;
    info!("已生成配置文件: {}", SETTINGS_PATH);

    let schema_toml = toml::to_string_pretty(&AnalysisSchema::default())?;
    tokio::fs::write(SCHEMA_PATH, schema_toml).await?;
    info!("已生成分析框架配置: {}", SCHEMA_PATH);

    info!("✅ 系统初始化完成！");
    info!("下一步:");
    info!("  1. 编辑 {} 配置API密钥", SETTINGS_PATH);
    info!("  2. 把PDF放入 {}，把PDF解析工具的输出放入 {}", app_config.paths.pdf_dir, app_config.paths.parsed_dir);
    info!("  3. 运行 'paperagent run <论文名>'");

    Ok(())
}

fn workspace_for(app_config: &AppConfig, paper: &str) -> PaperWorkspace {
    PaperWorkspace::from_config(&app_config.paths, paper)
}

/// 未配置 key 时返回 None，由调用方跳过该阶段
fn model_client(model_config: &ModelConfig, label: &str) -> Result<Option<LlmClient>> {
    if !model_config.is_configured() {
        warn!("❌ {} API key 未配置。请在 {} 中设置", label, SETTINGS_PATH);
        return Ok(None);
    }
    let client = LlmClient::new(model_config.clone()).context("创建HTTP客户端失败")?;
    info!("{} 使用模型: {} @ {}", label, client.model(), model_config.base_url);
    Ok(Some(client))
}

async fn check_command(image: Option<PathBuf>) -> Result<()> {
    let app_config = AppConfig::load()?;
    info!("开始进行API连通性测试");

    let llm_ok = match model_client(&app_config.llm, "LLM")? {
        Some(client) => log_check("语言模型", check::check_text_model(&client).await),
        None => false,
    };
    let vision_ok = match model_client(&app_config.vision, "视觉模型")? {
        Some(client) => log_check(
            "视觉模型",
            check::check_vision_model(&client, image.as_deref()).await,
        ),
        None => false,
    };

    info!("语言模型 (LLM) API: {}", if llm_ok { "✅ 通讯正常" } else { "❌ 通讯失败" });
    info!("视觉模型 (Vision) API: {}", if vision_ok { "✅ 通讯正常" } else { "❌ 通讯失败" });
    if !llm_ok || !vision_ok {
        warn!("请检查 {} 中的 API Key 和 Base URL，并确认网络可以访问对应的API服务", SETTINGS_PATH);
    }
    Ok(())
}

fn log_check(label: &str, result: Result<String>) -> bool {
    match result {
        Ok(reply) => {
            info!("{} 响应: {}", label, reply.trim());
            true
        }
        Err(e) => {
            error!("{} 调用失败: {:#}", label, e);
            false
        }
    }
}

async fn preprocess_command(paper: &str) -> Result<()> {
    let app_config = AppConfig::load()?;
    let workspace = workspace_for(&app_config, paper);
    workspace
        .ensure()
        .with_context(|| format!("无法创建输出目录: {}", workspace.root().display()))?;

    let pipeline = StructurePipeline::new(app_config.paths.clone());
    match pipeline.process(paper, &workspace) {
        Some(document) => {
            info!("预处理完成:");
            info!("  标题: {}", document.paper_title);
            info!("  顶层章节数: {}", document.sections.len());
            info!("  图表数: {}", document.all_assets().len());
        }
        None => warn!("预处理中止: {}", paper),
    }
    Ok(())
}

async fn structure_command(paper: &str) -> Result<()> {
    let app_config = AppConfig::load()?;
    let Some(client) = model_client(&app_config.llm, "LLM")? else {
        return Ok(());
    };

    let workspace = workspace_for(&app_config, paper);
    if let Some(mapping) = analyzer::analyze_structure(&workspace, &client).await? {
        for (category, titles) in mapping.iter() {
            info!("  {}: {:?}", category, titles);
        }
    }
    Ok(())
}

async fn images_command(paper: &str) -> Result<()> {
    let app_config = AppConfig::load()?;
    let Some(client) = model_client(&app_config.vision, "视觉模型")? else {
        return Ok(());
    };

    let workspace = workspace_for(&app_config, paper);
    analyzer::analyze_images(&workspace, &client).await?;
    Ok(())
}

async fn content_command(paper: &str) -> Result<()> {
    let app_config = AppConfig::load()?;
    let schema = AnalysisSchema::load()?;
    let Some(client) = model_client(&app_config.llm, "LLM")? else {
        return Ok(());
    };

    let workspace = workspace_for(&app_config, paper);
    analyzer::analyze_content(&workspace, &client, &schema).await?;
    Ok(())
}

async fn insight_command(paper: &str) -> Result<()> {
    let app_config = AppConfig::load()?;
    let schema = AnalysisSchema::load()?;
    let Some(client) = model_client(&app_config.llm, "LLM")? else {
        return Ok(());
    };

    let workspace = workspace_for(&app_config, paper);
    analyzer::analyze_insight(&workspace, &client, &schema).await?;
    Ok(())
}

async fn report_command(paper: &str) -> Result<()> {
    let app_config = AppConfig::load()?;
    let workspace = workspace_for(&app_config, paper);
    analyzer::generate_report(&workspace)?;
    Ok(())
}

/// 某一步失败只记录日志，后续步骤仍然执行，各步骤都能利用已有产物
async fn run_command(paper: &str) -> Result<()> {
    info!("=== 开始执行全流程分析: {} ===", paper);

    log_step("预处理", preprocess_command(paper).await);
    log_step("结构分析", structure_command(paper).await);
    log_step("图表分析", images_command(paper).await);
    log_step("内容分析", content_command(paper).await);
    log_step("全局洞察", insight_command(paper).await);
    log_step("生成报告", report_command(paper).await);

    info!("=== 全流程分析结束 ===");
    Ok(())
}

fn log_step(name: &str, result: Result<()>) {
    match result {
        Ok(()) => info!("✅ {} 完成", name),
        Err(e) => error!("❌ {} 失败: {:#}", name, e),
    }
}
