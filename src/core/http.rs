//! HTTP access to the appliance's local API, used when BLE is unavailable.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::core::bluetooth::ApiResponse;
use crate::error::{Result, TransportError};

#[async_trait::async_trait]
pub trait HttpApi: Send + Sync {
    async fn get_wifi_list(&self) -> Result<ApiResponse>;

    async fn get_wifi_status(&self) -> Result<ApiResponse>;

    async fn connect_wifi(&self, ssid: &str, password: &str, country_code: &str) -> Result<ApiResponse>;
}

#[async_trait::async_trait]
impl<T: HttpApi + ?Sized> HttpApi for Arc<T> {
    async fn get_wifi_list(&self) -> Result<ApiResponse> {
        (**self).get_wifi_list().await
    }

    async fn get_wifi_status(&self) -> Result<ApiResponse> {
        (**self).get_wifi_status().await
    }

    async fn connect_wifi(&self, ssid: &str, password: &str, country_code: &str) -> Result<ApiResponse> {
        (**self).connect_wifi(ssid, password, country_code).await
    }
}

pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<ApiResponse> {
        let response = request.send().await?;
        let status = response.status();
        debug!("HTTP {} from {}", status, response.url());
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        let data = serde_json::from_str(&body).unwrap_or(Value::String(body));
        Ok(ApiResponse { data })
    }
}

#[async_trait::async_trait]
impl HttpApi for HttpClient {
    async fn get_wifi_list(&self) -> Result<ApiResponse> {
        self.send(self.client.get(self.url("wifi/list"))).await
    }

    async fn get_wifi_status(&self) -> Result<ApiResponse> {
        self.send(self.client.get(self.url("wifi/status"))).await
    }

    async fn connect_wifi(&self, ssid: &str, password: &str, country_code: &str) -> Result<ApiResponse> {
        let form = [
            ("ssid", ssid),
            ("password", password),
            ("countryCode", country_code),
        ];
        self.send(self.client.post(self.url("wifi/connect")).form(&form))
            .await
    }
}
