//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// 主配置结构，包含全局配置和站点列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 站点配置列表（顺序即注册顺序）
    pub sites: Vec<SiteConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 检测间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// 单次检测超时时间（毫秒）
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 每个站点保留的历史记录条数
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// 时间线默认展示条数
    #[serde(default = "default_timeline_limit")]
    pub timeline_limit: usize,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 探测请求使用的User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// 是否自动刷新
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
}

/// 站点配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    /// 站点ID，未指定时自动生成
    pub id: Option<String>,
    /// 站点名称
    pub name: String,
    /// 站点URL
    pub url: String,
    /// 站点描述
    pub description: Option<String>,
}

impl GlobalConfig {
    /// 检测间隔
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// 单次检测超时时间
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            request_timeout_ms: default_request_timeout_ms(),
            history_capacity: default_history_capacity(),
            timeline_limit: default_timeline_limit(),
            log_level: default_log_level(),
            user_agent: default_user_agent(),
            auto_refresh: default_auto_refresh(),
        }
    }
}

// 默认值函数
fn default_check_interval() -> u64 {
    30
}
fn default_request_timeout_ms() -> u64 {
    6000
}
fn default_history_capacity() -> usize {
    10
}
fn default_timeline_limit() -> usize {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; WebsiteMonitor/1.0)".to_string()
}
fn default_auto_refresh() -> bool {
    true
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.check_interval_seconds == 0 {
        return Err("检测间隔不能为0".to_string());
    }

    if config.global.request_timeout_ms == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.global.history_capacity == 0 {
        return Err("历史记录容量不能为0".to_string());
    }

    if config.global.timeline_limit == 0 {
        return Err("时间线条数不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    // 验证站点配置
    if config.sites.is_empty() {
        return Err("至少需要配置一个站点".to_string());
    }

    let mut seen_ids = HashSet::new();
    for site in &config.sites {
        if site.name.trim().is_empty() {
            return Err("站点名称不能为空".to_string());
        }

        if !site.url.starts_with("http://") && !site.url.starts_with("https://") {
            return Err(format!("站点 {} 的URL格式无效", site.name));
        }

        if let Some(id) = &site.id {
            if id.trim().is_empty() {
                return Err(format!("站点 {} 的ID不能为空字符串", site.name));
            }
            if !seen_ids.insert(id.as_str()) {
                return Err(format!("站点ID重复: {id}"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            global: GlobalConfig::default(),
            sites: vec![SiteConfig {
                id: Some("blog".to_string()),
                name: "Blog".to_string(),
                url: "https://example.com".to_string(),
                description: Some("个人博客".to_string()),
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        let config = create_test_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_global_defaults() {
        let global = GlobalConfig::default();
        assert_eq!(global.check_interval(), Duration::from_secs(30));
        assert_eq!(global.request_timeout(), Duration::from_millis(6000));
        assert_eq!(global.history_capacity, 10);
        assert_eq!(global.timeline_limit, 10);
        assert!(global.auto_refresh);
    }

    #[test]
    fn test_invalid_interval() {
        let mut config = create_test_config();
        config.global.check_interval_seconds = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_history_capacity() {
        let mut config = create_test_config();
        config.global.history_capacity = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("历史记录容量"));
    }

    #[test]
    fn test_invalid_url() {
        let mut config = create_test_config();
        config.sites[0].url = "ftp://example.com".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_sites() {
        let mut config = create_test_config();
        config.sites.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_ids() {
        let mut config = create_test_config();
        let mut second = config.sites[0].clone();
        second.name = "Mirror".to_string();
        config.sites.push(second);

        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("blog"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = create_test_config();
        config.global.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }
}
