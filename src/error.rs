//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Site Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum SiteVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探测相关错误
    #[error("探测错误: {0}")]
    Probe(#[from] ProbeError),

    /// 监控核心错误
    #[error("监控错误: {0}")]
    Monitor(#[from] MonitorError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 单次探测的错误类型
///
/// 三种错误都会被检测执行器吸收并归类为离线，不会向上传播
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// DNS解析或连接失败
    #[error("传输失败: {0}")]
    Transport(String),

    /// 超过截止时间
    #[error("请求超时 ({timeout_ms}ms)")]
    Timeout { timeout_ms: u64 },

    /// 目标返回了非成功状态码
    #[error("非预期状态码: {status_code}")]
    UnexpectedStatus { status_code: u16 },
}

/// 监控核心错误类型
///
/// 只在构造阶段或控制接口上出现，检测过程本身不会产生这些错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// 历史容量必须大于0
    #[error("历史记录容量无效: {0}")]
    InvalidCapacity(usize),

    /// 时间线条数必须大于0
    #[error("时间线条数不能为0")]
    InvalidTimelineLimit,

    /// 历史事件必须是已完成的检测，且在线事件必须带响应时间
    #[error("历史事件无效: {0}")]
    InvalidHistoryEvent(String),

    /// 超时时间必须大于0
    #[error("检测超时时间不能为0")]
    InvalidTimeout,

    /// 调度间隔必须大于0
    #[error("调度间隔不能为0")]
    InvalidInterval,

    /// 站点ID重复
    #[error("站点ID重复: {0}")]
    DuplicateEndpoint(String),

    /// 站点不存在
    #[error("站点不存在: {0}")]
    EndpointNotFound(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, SiteVitalsError>;
