//! Cell API over HTTP.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    CellApi, CellApiError, CellApiFuture, CellData, CellMap, CellStatusRequest, FormationStep,
    TrayStatus,
};
use crate::recipe::StepConfiguration;

/// Default request timeout.
pub const DEFAULT_CELL_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoint path templates.
///
/// `{tray}` is replaced with the tray serial, `{fixture}` with the fixture
/// barcode and `{status}` with `start`/`end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellApiEndpoints {
    pub next_process_step: String,
    pub cell_map: String,
    pub process_status: String,
    pub cell_status: String,
    pub close_process: String,
    pub hold_tray: String,
}

impl Default for CellApiEndpoints {
    fn default() -> Self {
        Self {
            next_process_step: "/trays/{tray}/formation".to_string(),
            cell_map: "/trays/{tray}/cells".to_string(),
            process_status: "/trays/{tray}/{fixture}/{status}".to_string(),
            cell_status: "/trays/{tray}/formation/cd/status".to_string(),
            close_process: "/trays/{tray}/formation/next".to_string(),
            hold_tray: "/trays/{tray}/hold".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct CellMapResponse {
    #[serde(default)]
    cells: Vec<CellData>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ErrorMessage {
    message: String,
    description: String,
}

#[derive(Serialize)]
struct CloseRequest<'a> {
    current_recipe_name: &'a str,
    current_recipe_version: u32,
}

/// HTTP client for the Cell API.
#[derive(Debug, Clone)]
pub struct HttpCellApi {
    http: reqwest::Client,
    base_url: String,
    endpoints: CellApiEndpoints,
}

impl HttpCellApi {
    pub fn new(
        base_url: impl Into<String>,
        endpoints: CellApiEndpoints,
        timeout: Duration,
    ) -> Result<Self, CellApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoints,
        })
    }

    fn url(&self, template: &str, tray: &str) -> String {
        format!("{}{}", self.base_url, template.replace("{tray}", tray))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, CellApiError> {
        debug!(url = %url, "Cell API GET");
        let response = self.http.get(&url).send().await?;
        let response = check_status(url, response).await?;
        Ok(response.json().await?)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: String,
        body: Option<&B>,
    ) -> Result<(), CellApiError> {
        debug!(url = %url, "Cell API POST");
        let mut request = self.http.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        check_status(url, response).await?;
        Ok(())
    }
}

async fn check_status(
    url: String,
    response: reqwest::Response,
) -> Result<reqwest::Response, CellApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) if !body.error.message.is_empty() => {
            format!("{}; {}", body.error.message, body.error.description)
        }
        _ => text,
    };
    Err(CellApiError::Status {
        url,
        status: status.as_u16(),
        message,
    })
}

impl CellApi for HttpCellApi {
    fn next_process_step<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, FormationStep> {
        Box::pin(async move {
            self.get_json(self.url(&self.endpoints.next_process_step, tray))
                .await
        })
    }

    fn step_configuration<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, StepConfiguration> {
        Box::pin(async move {
            let step = self.next_process_step(tray).await?;
            if step.step_configuration.step_ordering.is_empty() {
                return Err(CellApiError::InvalidResponse(format!(
                    "empty step configuration for tray {}",
                    tray
                )));
            }
            Ok(step.step_configuration)
        })
    }

    fn cell_map<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, CellMap> {
        Box::pin(async move {
            let response: CellMapResponse =
                self.get_json(self.url(&self.endpoints.cell_map, tray)).await?;
            Ok(response
                .cells
                .into_iter()
                .filter(|c| !c.is_empty && c.status_code == 0)
                .map(|c| (c.position.clone(), c))
                .collect())
        })
    }

    fn update_process_status<'a>(
        &'a self,
        tray: &'a str,
        fixture: &'a str,
        status: TrayStatus,
    ) -> CellApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self
                .url(&self.endpoints.process_status, tray)
                .replace("{fixture}", fixture)
                .replace("{status}", status.as_str());
            self.post::<()>(url, None).await
        })
    }

    fn set_cell_statuses<'a>(
        &'a self,
        tray: &'a str,
        request: &'a CellStatusRequest,
        close: bool,
    ) -> CellApiFuture<'a, ()> {
        Box::pin(async move {
            let mut url = self.url(&self.endpoints.cell_status, tray);
            if !close {
                // the service closes the step unless told otherwise
                url.push_str("?complete=0");
            }
            self.post(url, Some(request)).await
        })
    }

    fn close_process_step<'a>(
        &'a self,
        tray: &'a str,
        recipe: &'a str,
        version: u32,
    ) -> CellApiFuture<'a, ()> {
        Box::pin(async move {
            let (name, _) = crate::recipe::parse_recipe_version(recipe);
            let body = CloseRequest {
                current_recipe_name: &name,
                current_recipe_version: version,
            };
            self.post(self.url(&self.endpoints.close_process, tray), Some(&body))
                .await
        })
    }

    fn hold_tray<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, ()> {
        Box::pin(async move {
            self.post::<()>(self.url(&self.endpoints.hold_tray, tray), None)
                .await
        })
    }
}
