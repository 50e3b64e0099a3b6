use crate::instrument::{Decoded, Instrument};
use async_trait::async_trait;
use labpoll_types::DeviceAddress;
use std::marker::PhantomData;
use std::time::Duration;
use thiserror::Error;

/// 采集失败；所有变体都归类为网络错误
#[derive(Error, Debug)]
pub enum FetchError {
    /// 超时、拒绝连接等传输层错误
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// 非成功状态码
    #[error("Device responded with HTTP status {0}")]
    Status(u16),

    /// 响应为空
    #[error("Empty response body")]
    Empty,

    /// 报文格式错误
    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// 是否为传输层失败（与报文解码失败区分）
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Status(_))
    }
}

/// 测量数据来源
#[async_trait]
pub trait MeasurementSource<R>: Send + Sync {
    async fn fetch(&self) -> Result<Decoded<R>, FetchError>;
}

/// 构建带超时的共享 HTTP 客户端
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// 基于 HTTP GET 的数据来源
pub struct HttpSource<I> {
    client: reqwest::Client,
    url: String,
    _instrument: PhantomData<fn() -> I>,
}

impl<I: Instrument> HttpSource<I> {
    pub fn new(client: reqwest::Client, address: &DeviceAddress) -> Self {
        Self {
            client,
            url: address.url(I::ENDPOINT),
            _instrument: PhantomData,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<I: Instrument> MeasurementSource<I::Reading> for HttpSource<I> {
    async fn fetch(&self) -> Result<Decoded<I::Reading>, FetchError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(FetchError::Empty);
        }

        Ok(I::decode(&body)?)
    }
}
