//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, FileConfigLoader};
use crate::error::Result;
use crate::health::RoundReport;
use crate::logging::LoggingSystem;
use crate::monitor::{filter_sites, Monitor, MonitorEvent, MonitorSnapshot};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// 示例配置文件
const SAMPLE_CONFIG: &str = include_str!("../../demos/config.toml");

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载配置文件
async fn load_config(path: &Path) -> Result<Config> {
    FileConfigLoader::new(true).load_from_file(path).await
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                _ => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 写入示例配置文件，已存在且未指定 `force` 时不覆盖
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(config_path, SAMPLE_CONFIG).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加需要监控的站点");

        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            println!("验证配置文件: {}", config_file.display());
            let config = load_config(&config_file).await?;

            if *verbose {
                println!("配置验证通过！");
                println!("全局配置:");
                println!("  检测间隔: {}秒", config.global.check_interval_seconds);
                println!("  请求超时: {}毫秒", config.global.request_timeout_ms);
                println!("  历史容量: {}", config.global.history_capacity);
                println!("  时间线条数: {}", config.global.timeline_limit);
                println!("  日志级别: {}", config.global.log_level);
                println!(
                    "  自动刷新: {}",
                    if config.global.auto_refresh { "是" } else { "否" }
                );

                println!("站点配置:");
                for (i, site) in config.sites.iter().enumerate() {
                    println!("  {}. {} ({})", i + 1, site.name, site.url);
                    if let Some(description) = &site.description {
                        println!("     描述: {description}");
                    }
                }
            } else {
                println!("✓ 配置文件验证通过");
                println!("✓ 找到 {} 个站点配置", config.sites.len());
            }
        }
        Ok(())
    }
}

/// 检测命令，执行一轮后输出结果
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check {
            site,
            format,
            timeout,
        } = &args.command
        {
            let mut config = load_config(&args.get_config_path()).await?;

            if let Some(term) = site {
                config.sites = filter_sites(&config.sites, term)
                    .into_iter()
                    .cloned()
                    .collect();
                if config.sites.is_empty() {
                    eprintln!("未找到匹配 '{term}' 的站点");
                    return Ok(());
                }
            }
            if let Some(timeout_ms) = timeout {
                config.global.request_timeout_ms = *timeout_ms;
            }

            let monitor = Monitor::from_config(&config)?;
            monitor.run_round().await?;
            let snapshot = monitor.snapshot().await;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                OutputFormat::Table => print_table(&snapshot),
                OutputFormat::Text => print_text(&snapshot),
            }
        }
        Ok(())
    }
}

/// 启动命令，在前台持续监控直到收到 Ctrl+C
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Start {
            interval,
            no_auto_refresh,
        } = &args.command
        {
            let mut config = load_config(&args.get_config_path()).await?;
            if let Some(interval_secs) = interval {
                config.global.check_interval_seconds = *interval_secs;
            }

            let monitor = Monitor::from_config(&config)?;
            info!("已加载 {} 个站点", monitor.registry().len());

            if *no_auto_refresh || !config.global.auto_refresh {
                info!("自动刷新已关闭，只执行一轮检测");
                let report = monitor.run_round().await?;
                log_round(&report);
                print_text(&monitor.snapshot().await);
                return Ok(());
            }

            return self.run_until_interrupted(&monitor).await;
        }
        Ok(())
    }
}

impl StartCommand {
    async fn run_until_interrupted(&self, monitor: &Monitor) -> Result<()> {
        let logging = LoggingSystem::current();
        let mut events = monitor.subscribe();
        monitor.start().await?;

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!("监听中断信号失败: {}", e);
                    }
                    info!("收到中断信号，正在停止监控...");
                    break;
                }
                event = events.recv() => match event {
                    Ok(MonitorEvent::EndpointUpdated(snapshot)) if snapshot.status.is_settled() => {
                        if let Some(logging) = &logging {
                            logging.site_status_log(&snapshot);
                        }
                    }
                    Ok(MonitorEvent::EndpointUpdated(_)) => {}
                    Ok(MonitorEvent::RoundCompleted(report)) => {
                        log_round(&report);
                        print_text(&monitor.snapshot().await);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("事件处理落后，跳过 {} 条事件", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        monitor.stop().await?;
        info!("监控已停止");
        Ok(())
    }
}

fn log_round(report: &RoundReport) {
    if let Some(logging) = LoggingSystem::current() {
        logging.round_log(report);
    }
}

/// 格式化响应时间
fn format_latency(response_time_ms: Option<u64>) -> String {
    response_time_ms
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "-".to_string())
}

/// 打印文本格式结果
fn print_text(snapshot: &MonitorSnapshot) {
    let summary = &snapshot.summary;
    println!(
        "[{}] 共 {} 个站点: 在线 {} / 离线 {} / 检测中 {}，平均响应 {}ms，在线率 {:.1}%",
        snapshot.taken_at.format("%Y-%m-%d %H:%M:%S"),
        summary.total,
        summary.online,
        summary.offline,
        summary.checking,
        summary.avg_response_time_ms,
        summary.uptime_pct
    );

    for endpoint in &snapshot.endpoints {
        let status_icon = if endpoint.status.is_online() { "✓" } else { "✗" };
        println!(
            "{} {} ({}) - {} - {}",
            status_icon,
            endpoint.name,
            endpoint.url,
            endpoint.status,
            format_latency(endpoint.response_time_ms)
        );
        if let Some(error) = &endpoint.last_error {
            println!("  错误: {error}");
        }
    }

    if !snapshot.timeline.is_empty() {
        println!("最近事件:");
        for event in &snapshot.timeline {
            println!(
                "  {} {} {} {}",
                event.event.timestamp.format("%H:%M:%S"),
                event.endpoint_name,
                event.event.status,
                format_latency(event.event.response_time_ms)
            );
        }
    }

    if let Some(next_round_at) = snapshot.scheduler.next_round_at {
        let remaining = (next_round_at - snapshot.taken_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        println!("下一轮检测: {}秒后", remaining.as_secs());
    }
}

/// 打印表格格式结果
fn print_table(snapshot: &MonitorSnapshot) {
    println!(
        "{:<20} {:<8} {:<8} {:<10} {:<8} {:<30}",
        "站点名称", "状态", "状态码", "响应时间", "分级", "错误信息"
    );
    println!("{}", "-".repeat(90));

    for endpoint in &snapshot.endpoints {
        let status_code = endpoint
            .last_status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let latency_class = endpoint
            .latency_class
            .map(|class| class.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<20} {:<8} {:<8} {:<10} {:<8} {:<30}",
            truncate_string(&endpoint.name, 20),
            endpoint.status.to_string(),
            status_code,
            format_latency(endpoint.response_time_ms),
            latency_class,
            endpoint.last_error.as_deref().unwrap_or("")
        );
    }

    let summary = &snapshot.summary;
    println!("{}", "-".repeat(90));
    println!(
        "在线 {}/{}，平均响应 {}ms，在线率 {:.1}%",
        summary.online, summary.total, summary.avg_response_time_ms, summary.uptime_pct
    );
}

/// 截断过长的字符串
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::LatencyClass;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("blog", 20), "blog");
        assert_eq!(truncate_string("abcdefghij", 6), "abc...");
        assert_eq!(truncate_string("中文站点名称很长", 5), "中文...");
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(Some(120)), "120ms");
        assert_eq!(format_latency(None), "-");
    }

    #[tokio::test]
    async fn test_sample_config_is_valid() {
        let config = FileConfigLoader::new(false)
            .load_from_string(SAMPLE_CONFIG, crate::config::ConfigFormat::Toml)
            .await
            .unwrap();
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[0].id.as_deref(), Some("example"));
    }

    #[tokio::test]
    async fn test_init_writes_sample_and_respects_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let path_str = path.to_str().unwrap();

        let args = Args::try_parse_from(["site-vitals", "init", path_str]).unwrap();
        InitCommand.execute(&args).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE_CONFIG);

        // 未指定 --force 时保留已有内容
        std::fs::write(&path, "# custom").unwrap();
        InitCommand.execute(&args).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# custom");

        let args = Args::try_parse_from(["site-vitals", "init", path_str, "--force"]).unwrap();
        InitCommand.execute(&args).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE_CONFIG);
    }

    #[tokio::test]
    async fn test_start_without_auto_refresh_runs_single_round() {
        let mut server = mockito::Server::new_async().await;
        let up = server
            .mock("HEAD", "/up")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!(
                "[global]\nauto_refresh = false\n\n[[sites]]\nid = \"up\"\nname = \"Up\"\nurl = \"{}/up\"\n",
                server.url()
            ),
        )
        .unwrap();

        let args =
            Args::try_parse_from(["site-vitals", "-c", path.to_str().unwrap(), "start"]).unwrap();
        StartCommand.execute(&args).await.unwrap();
        up.assert_async().await;

        // 其他子命令交给 StartCommand 时不做任何事
        let args = Args::try_parse_from(["site-vitals", "version"]).unwrap();
        assert!(StartCommand.execute(&args).await.is_ok());
    }

    #[test]
    fn test_latency_class_labels_in_table() {
        let labels: Vec<_> = [120, 1500, 4000]
            .into_iter()
            .map(|ms| LatencyClass::classify(ms).to_string())
            .collect();
        assert_eq!(labels, vec!["fast", "medium", "slow"]);
    }

    #[tokio::test]
    async fn test_validate_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");

        let args =
            Args::try_parse_from(["site-vitals", "validate", path.to_str().unwrap()]).unwrap();
        assert!(ValidateCommand.execute(&args).await.is_err());
    }
}
