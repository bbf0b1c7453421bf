//! Site Vitals 主程序入口

use anyhow::{Context, Result};
use clap::Parser;
use site_vitals::cli::args::{Args, Commands};
use site_vitals::cli::commands::{
    CheckCommand, Command, InitCommand, StartCommand, ValidateCommand, VersionCommand,
};
use site_vitals::config::{ConfigLoader, FileConfigLoader};
use site_vitals::logging::{LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _logging_system =
        LoggingSystem::setup_logging(resolve_log_config(&args).await).context("初始化日志系统失败")?;

    info!("Site Vitals v{} 启动", site_vitals::VERSION);

    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 命令行指定的级别（含 --verbose）优先，其次是配置文件中的 log_level
async fn resolve_log_config(args: &Args) -> LogConfig {
    if let Some(level) = args.cli_log_level() {
        return LogConfig {
            level,
            ..LogConfig::default()
        };
    }

    match FileConfigLoader::new(true)
        .load_from_file(args.get_config_path())
        .await
    {
        Ok(config) => LogConfig::with_level_str(&config.global.log_level),
        Err(_) => LogConfig::default(),
    }
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Start { .. } => Box::new(StartCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command
        .execute(args)
        .await
        .with_context(|| format!("执行命令失败: {:?}", args.command))
}
