//! 探测客户端
//!
//! 单次探测的传输层抽象，以及基于HTTP HEAD请求的默认实现

use crate::error::{ProbeError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 单次探测的原始结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// 目标是否可达
    pub ok: bool,
    /// HTTP状态码（如果有）
    pub status_code: Option<u16>,
    /// 错误描述（如果有）
    pub error: Option<String>,
}

impl ProbeResponse {
    /// 可达的探测结果
    pub fn reachable(status_code: u16) -> Self {
        Self {
            ok: true,
            status_code: Some(status_code),
            error: None,
        }
    }

    /// 不可达的探测结果
    pub fn unreachable(status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            status_code,
            error: Some(error.into()),
        }
    }
}

/// 探测客户端trait
///
/// 实现方必须自行遵守 `timeout`，到期后返回 [`ProbeError::Timeout`] 而不是挂起
#[async_trait]
pub trait ProbeClient: Send + Sync {
    /// 对目标URL执行一次存活探测
    ///
    /// # 参数
    /// * `url` - 目标URL
    /// * `timeout` - 截止时间
    ///
    /// # 返回
    /// * `Result<ProbeResponse, ProbeError>` - 探测结果或传输层错误
    async fn probe(&self, url: &str, timeout: Duration)
        -> std::result::Result<ProbeResponse, ProbeError>;
}

/// 基于HTTP HEAD请求的探测客户端
#[derive(Debug, Clone)]
pub struct HttpProbeClient {
    /// HTTP客户端
    client: Client,
}

impl HttpProbeClient {
    /// 创建新的HTTP探测客户端
    ///
    /// # 参数
    /// * `user_agent` - 请求使用的User-Agent
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ProbeError::Transport(format!("HTTP客户端创建失败: {e}")))?;

        Ok(Self { client })
    }

    /// 判断状态码是否表示站点可达
    ///
    /// 4xx仍说明站点在响应请求，只有5xx视为不可达
    fn is_reachable(status: StatusCode) -> bool {
        status.is_success() || status.as_u16() < 500
    }

    /// 格式化请求错误信息，使其更加清晰易读
    fn format_request_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "Connection refused".to_string()
        } else if error.is_request() {
            "Invalid request".to_string()
        } else if error.is_decode() {
            "Response decode error".to_string()
        } else {
            let error_str = error.to_string();
            if error_str.contains("dns") || error_str.contains("DNS") {
                "DNS resolution failed".to_string()
            } else if error_str.contains("certificate")
                || error_str.contains("tls")
                || error_str.contains("ssl")
            {
                "SSL/TLS certificate error".to_string()
            } else {
                format!("Request failed: {error_str}")
            }
        }
    }
}

#[async_trait]
impl ProbeClient for HttpProbeClient {
    async fn probe(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<ProbeResponse, ProbeError> {
        let response = self
            .client
            .request(Method::HEAD, url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }
                } else {
                    ProbeError::Transport(Self::format_request_error(&e))
                }
            })?;

        let status = response.status();
        if Self::is_reachable(status) {
            Ok(ProbeResponse::reachable(status.as_u16()))
        } else {
            let error = ProbeError::UnexpectedStatus {
                status_code: status.as_u16(),
            };
            Ok(ProbeResponse::unreachable(
                Some(status.as_u16()),
                error.to_string(),
            ))
        }
    }
}
