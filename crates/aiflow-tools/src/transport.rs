use std::time::Duration;

use futures::future::BoxFuture;

use aiflow_core::error::{AiflowError, Result};
use aiflow_core::traits::HttpTransport;
use aiflow_core::{HttpRequest, HttpResponse};

/// `HttpTransport` backed by a shared reqwest client.
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ReqwestTransport {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AiflowError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(async move {
            let method = request
                .method
                .parse::<reqwest::Method>()
                .map_err(|_| AiflowError::InvalidMethod(request.method.clone()))?;

            let mut req = self.client.request(method, &request.url);
            for (k, v) in &request.headers {
                req = req.header(k.as_str(), v.as_str());
            }
            if let Some(body) = request.body {
                req = req.body(body);
            }

            let resp = req.send().await.map_err(|e| {
                if e.is_timeout() {
                    AiflowError::ToolTimeout {
                        tool: request.url.clone(),
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    AiflowError::ToolInvocation {
                        tool: request.url.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

            let status = resp.status().as_u16();
            let body = resp.text().await.map_err(|e| AiflowError::ToolInvocation {
                tool: request.url.clone(),
                message: e.to_string(),
            })?;
            Ok(HttpResponse { status, body })
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}
