//! Request Dispatcher
//!
//! Maps each protocol action onto one handler. Handlers consult the
//! browser surface, the tab registry, or the capture orchestrator and
//! return a JSON payload; every failure leaves as a structured
//! `{code, message}` error response. One failed handler never disturbs
//! state owned by other requests.

use std::sync::Arc;

use async_trait::async_trait;
use bridge::{Action, HandlerError, RequestHandler};
use capture::CaptureOrchestrator;
use serde_json::{json, Value};
use url::Url;

use crate::error::{Result, ToolError};
use crate::surface::BrowserSurface;
use crate::tabs::TabRegistry;

/// Schemes a capture may target. Everything else - chrome://, about:,
/// devtools://, extension pages - is protected browser UI.
const CAPTURABLE_SCHEMES: [&str; 3] = ["http", "https", "file"];

pub struct Dispatcher {
    surface: Arc<dyn BrowserSurface>,
    registry: Arc<TabRegistry>,
    orchestrator: CaptureOrchestrator,
}

impl Dispatcher {
    pub fn new(
        surface: Arc<dyn BrowserSurface>,
        registry: Arc<TabRegistry>,
        orchestrator: CaptureOrchestrator,
    ) -> Self {
        Self {
            surface,
            registry,
            orchestrator,
        }
    }

    async fn take_screenshot(&self, params: &Value) -> Result<Value> {
        let tab = self.surface.active_tab().await?;
        ensure_capturable(&tab.url)?;

        let full_page = params
            .get("fullPage")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let driver = self.surface.page_driver();
        let result = if full_page {
            self.orchestrator.capture_full_page(driver).await?
        } else {
            self.orchestrator.capture_viewport(driver).await?
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn get_console_logs(&self, params: &Value) -> Result<Value> {
        let tab = self.surface.active_tab().await?;
        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .map(|limit| limit as usize);
        Ok(serde_json::to_value(
            self.registry.console_logs(tab.id, limit),
        )?)
    }

    async fn get_active_tab(&self) -> Result<Value> {
        let tab = self.surface.active_tab().await?;
        Ok(serde_json::to_value(tab)?)
    }

    async fn get_network_requests(&self) -> Result<Value> {
        let tab = self.surface.active_tab().await?;
        Ok(serde_json::to_value(self.registry.network_requests(tab.id))?)
    }

    async fn get_exceptions(&self) -> Result<Value> {
        let tab = self.surface.active_tab().await?;
        Ok(serde_json::to_value(self.registry.exceptions(tab.id))?)
    }

    async fn evaluate_js(&self, params: &Value) -> Result<Value> {
        let expression = params
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("missing `expression`".into()))?;
        self.surface.evaluate(expression).await
    }

    async fn refresh_page(&self) -> Result<Value> {
        self.surface.reload().await?;
        Ok(json!({ "reloaded": true }))
    }
}

#[async_trait]
impl RequestHandler for Dispatcher {
    async fn handle(
        &self,
        action: Action,
        params: Value,
    ) -> std::result::Result<Value, HandlerError> {
        tracing::debug!("Dispatching {}", action);
        let result = match action {
            Action::TakeScreenshot => self.take_screenshot(&params).await,
            Action::GetConsoleLogs => self.get_console_logs(&params).await,
            Action::GetActiveTab => self.get_active_tab().await,
            Action::GetNetworkRequests => self.get_network_requests().await,
            Action::GetExceptions => self.get_exceptions().await,
            Action::EvaluateJs => self.evaluate_js(&params).await,
            Action::GetDomSnapshot => self.surface.dom_snapshot().await,
            Action::GetPerformanceMetrics => self.surface.performance_metrics().await,
            Action::GetStorageData => self.surface.storage_data().await,
            Action::RefreshPage => self.refresh_page().await,
        };
        result.map_err(HandlerError::from)
    }
}

fn ensure_capturable(raw_url: &str) -> Result<()> {
    let parsed =
        Url::parse(raw_url).map_err(|_| ToolError::RestrictedPage(raw_url.to_string()))?;
    if CAPTURABLE_SCHEMES.contains(&parsed.scheme()) {
        Ok(())
    } else {
        Err(ToolError::RestrictedPage(raw_url.to_string()))
    }
}
