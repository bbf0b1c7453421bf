//! 日志系统模块
//!
//! 基于 tracing 的结构化日志，log crate 的输出通过 LogTracer 桥接

use crate::health::scheduler::RoundReport;
use crate::monitor::registry::EndpointSnapshot;
use log::LevelFilter;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, registry, EnvFilter, Layer};

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    initialized: bool,
    init_error: Option<String>,
    current_config: Option<LogConfig>,
}

static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

fn global_state() -> MutexGuard<'static, GlobalLoggingState> {
    GLOBAL_LOGGING_STATE
        .get_or_init(|| Mutex::new(GlobalLoggingState::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径（可选）
    pub file_path: Option<PathBuf>,
    /// 是否输出到控制台
    pub console: bool,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            console: true,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// 从级别字符串创建配置，无法识别时回退到 info
    pub fn with_level_str(level: &str) -> Self {
        Self {
            level: level.parse().unwrap_or(LevelFilter::Info),
            ..Self::default()
        }
    }
}

/// 日志系统管理器
#[derive(Debug)]
pub struct LoggingSystem {
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 重复调用不会重新安装 subscriber，返回基于新配置的实例
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        Self::setup_logging_with_options(config, false)
    }

    /// 初始化日志系统（带选项）
    ///
    /// # 参数
    /// * `config` - 日志配置
    /// * `force_reinit` - 是否忽略之前的初始化结果重新执行（主要用于测试）
    pub fn setup_logging_with_options(
        config: LogConfig,
        force_reinit: bool,
    ) -> anyhow::Result<Self> {
        {
            let state = global_state();
            if state.initialized && !force_reinit {
                if let Some(e) = &state.init_error {
                    return Err(anyhow::anyhow!("日志系统之前初始化失败: {}", e));
                }
                return Ok(Self { config });
            }
        }

        let init_result = Self::init_log_tracer().and_then(|_| Self::init_subscriber(&config));

        let mut state = global_state();
        state.initialized = true;
        state.current_config = Some(config.clone());
        state.init_error = init_result.as_ref().err().map(|e| e.to_string());

        init_result.map(|_| Self { config })
    }

    /// 初始化 log crate 到 tracing 的桥接
    fn init_log_tracer() -> anyhow::Result<()> {
        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        let result =
            LOG_TRACER_INIT.get_or_init(|| tracing_log::LogTracer::init().map_err(|e| e.to_string()));
        match result {
            Ok(()) => Ok(()),
            // 进程里已有其他 log 实现，tracing 本身仍然可用
            Err(e) if e.contains("attempted to set a logger") => Ok(()),
            Err(e) => Err(anyhow::anyhow!("LogTracer初始化失败: {}", e)),
        }
    }

    fn init_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let mut env_filter =
            EnvFilter::from_default_env().add_directive(Self::level_directive(config.level));

        for (module, level) in &config.module_levels {
            match format!("{}={}", module, Self::level_name(*level)).parse::<Directive>() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(e) => tracing::warn!("忽略无效的模块日志级别 {}: {}", module, e),
            }
        }

        let writer_layer = match (&config.file_path, config.console) {
            (Some(file_path), false) => {
                let file = std::fs::File::create(file_path)
                    .map_err(|e| anyhow::anyhow!("创建日志文件失败: {}", e))?;
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_timer(fmt::time::ChronoUtc::rfc_3339())
                    .with_target(true)
                    .boxed()
            }
            _ if config.json_format => fmt::layer()
                .json()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_target(true)
                .boxed(),
            _ => fmt::layer()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_target(false)
                .boxed(),
        };

        // LogTracer 已单独安装，这里只设置全局 dispatcher
        let subscriber = registry().with(env_filter).with(writer_layer);
        match tracing::subscriber::set_global_default(subscriber) {
            Ok(()) => {
                tracing::debug!("日志配置: {:?}", config);
                Ok(())
            }
            // 测试中多个用例共享进程，全局 subscriber 可能已经被设置
            Err(e) if e.to_string().contains("already been set") => Ok(()),
            Err(e) => Err(anyhow::anyhow!("tracing subscriber初始化失败: {}", e)),
        }
    }

    fn level_directive(level: LevelFilter) -> Directive {
        match level {
            LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF.into(),
            LevelFilter::Error => tracing::Level::ERROR.into(),
            LevelFilter::Warn => tracing::Level::WARN.into(),
            LevelFilter::Info => tracing::Level::INFO.into(),
            LevelFilter::Debug => tracing::Level::DEBUG.into(),
            LevelFilter::Trace => tracing::Level::TRACE.into(),
        }
    }

    fn level_name(level: LevelFilter) -> &'static str {
        match level {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        }
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 获取基于当前全局配置的实例（如果已初始化）
    pub fn current() -> Option<Self> {
        Self::current_config().map(|config| Self { config })
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        GLOBAL_LOGGING_STATE.get().is_some() && global_state().initialized
    }

    /// 获取当前日志配置（如果已初始化）
    pub fn current_config() -> Option<LogConfig> {
        GLOBAL_LOGGING_STATE.get()?;
        global_state().current_config.clone()
    }

    #[cfg(test)]
    pub fn reset_for_testing() {
        *global_state() = GlobalLoggingState::default();
    }

    /// 记录单个站点的检测结论
    pub fn site_status_log(&self, snapshot: &EndpointSnapshot) {
        if self.config.json_format {
            let entry = json!({
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "type": "site_status",
                "site": snapshot.id,
                "status": snapshot.status,
                "response_time_ms": snapshot.response_time_ms,
                "error": snapshot.last_error,
            });
            tracing::info!("{entry}");
        } else {
            tracing::info!(
                "SITE: {} - {} ({}) {}",
                snapshot.name,
                snapshot.status,
                snapshot
                    .response_time_ms
                    .map(|ms| format!("{ms}ms"))
                    .unwrap_or_else(|| "-".to_string()),
                snapshot.last_error.as_deref().unwrap_or("")
            );
        }
    }

    /// 记录一轮检测的汇总
    pub fn round_log(&self, report: &RoundReport) {
        let duration_ms = (report.finished_at - report.started_at).num_milliseconds();

        if self.config.json_format {
            let entry = json!({
                "timestamp": report.finished_at.to_rfc3339(),
                "type": "round",
                "round": report.round,
                "online": report.online,
                "offline": report.offline,
                "duration_ms": duration_ms,
            });
            tracing::info!("{entry}");
        } else {
            tracing::info!(
                "ROUND: #{} - 在线 {} / 离线 {} ({}ms)",
                report.round,
                report.online,
                report.offline,
                duration_ms
            );
        }
    }
}

/// 获取默认日志文件路径
pub fn get_default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("site-vitals")
        .join("site-vitals.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    fn create_test_config() -> LogConfig {
        LogConfig {
            level: LevelFilter::Info,
            ..LogConfig::default()
        }
    }

    #[test]
    #[serial]
    fn test_single_initialization() {
        LoggingSystem::reset_for_testing();

        assert!(LoggingSystem::setup_logging(create_test_config()).is_ok());
        assert!(LoggingSystem::is_initialized());

        // 第二次调用复用之前的结果
        assert!(LoggingSystem::setup_logging(create_test_config()).is_ok());
    }

    #[test]
    #[serial]
    fn test_setup_installs_dispatcher_and_log_bridge() {
        LoggingSystem::reset_for_testing();

        let system = LoggingSystem::setup_logging(create_test_config());
        assert!(system.is_ok(), "{:?}", system.err());
        assert!(tracing::dispatcher::has_been_set());
        assert_eq!(log::max_level(), LevelFilter::Trace);

        // 重置状态后再次安装同样成功
        LoggingSystem::reset_for_testing();
        assert!(LoggingSystem::setup_logging(create_test_config()).is_ok());
        log::info!("log crate 的输出经由 LogTracer 转发");
    }

    #[test]
    #[serial]
    fn test_force_reinit() {
        LoggingSystem::reset_for_testing();

        LoggingSystem::setup_logging(create_test_config()).unwrap();
        assert!(LoggingSystem::setup_logging_with_options(create_test_config(), true).is_ok());
    }

    #[test]
    #[serial]
    fn test_file_output() {
        LoggingSystem::reset_for_testing();

        let temp_file = NamedTempFile::new().unwrap();
        let config = LogConfig {
            file_path: Some(temp_file.path().to_path_buf()),
            console: false,
            ..create_test_config()
        };

        assert!(LoggingSystem::setup_logging(config).is_ok());
    }

    #[test]
    #[serial]
    fn test_current_config_retrieval() {
        LoggingSystem::reset_for_testing();

        let config = LogConfig {
            json_format: true,
            ..create_test_config()
        };
        let system = LoggingSystem::setup_logging(config).unwrap();
        assert!(system.config().json_format);

        let current = LoggingSystem::current_config().unwrap();
        assert_eq!(current.level, LevelFilter::Info);
        assert!(current.json_format);
    }

    #[test]
    #[serial]
    fn test_module_level_filtering() {
        LoggingSystem::reset_for_testing();

        let mut config = create_test_config();
        config
            .module_levels
            .insert("site_vitals::health".to_string(), LevelFilter::Debug);
        config
            .module_levels
            .insert("reqwest".to_string(), LevelFilter::Warn);

        assert!(LoggingSystem::setup_logging(config).is_ok());
    }

    #[test]
    fn test_level_string_parsing() {
        assert_eq!(LogConfig::with_level_str("debug").level, LevelFilter::Debug);
        assert_eq!(LogConfig::with_level_str("WARN").level, LevelFilter::Warn);
        assert_eq!(LogConfig::with_level_str("nonsense").level, LevelFilter::Info);
    }

    #[test]
    fn test_default_log_path() {
        let path = get_default_log_path();
        assert!(path.ends_with("site-vitals/site-vitals.log"));
    }
}
