use crate::auth::TokenProvider;
use crate::metrics_defs::{STORE_ERRORS, STORE_REQUEST_DURATION, STORE_REQUESTS};
use crate::range::A1Range;
use crate::store::{Grid, Row, StoreError, TabularStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/";

/// Which spreadsheet to talk to and where the API lives.
#[derive(Clone, Debug)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub base_url: Url,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Grid,
}

#[derive(Serialize)]
struct WriteBody<'a> {
    range: String,
    values: &'a Grid,
}

#[derive(Serialize)]
struct AppendBody<'a> {
    values: [&'a Row; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateBody {
    value_input_option: &'static str,
    data: Vec<BatchRange>,
}

#[derive(Serialize)]
struct BatchRange {
    range: String,
    values: Grid,
}

/// Google Sheets v4 values API client. Every write uses `RAW` input so cells
/// are stored exactly as sent.
pub struct SheetsStore {
    client: reqwest::Client,
    config: SheetsConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl SheetsStore {
    pub fn new(config: SheetsConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        SheetsStore {
            client: reqwest::Client::new(),
            config,
            tokens,
        }
    }

    /// `{base}/v4/spreadsheets/{id}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.config.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.config.spreadsheet_id.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        op: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        let started = Instant::now();
        counter!(STORE_REQUESTS, "op" => op).increment(1);

        let result = self.send_inner(request).await;

        histogram!(STORE_REQUEST_DURATION, "op" => op).record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            counter!(STORE_ERRORS, "op" => op).increment(1);
            tracing::warn!(op, error = %e, "Sheets request failed");
        }
        result
    }

    async fn send_inner(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        let headers = self.tokens.headers().await?;
        let response = request.headers(headers).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Api { status, body })
    }
}

#[async_trait]
impl TabularStore for SheetsStore {
    async fn read(&self, range: &A1Range) -> Result<Grid, StoreError> {
        let url = self.url(&["values", &range.to_string()])?;
        let response = self.send("read", self.client.get(url)).await?;
        Ok(response.json::<ValueRange>().await?.values)
    }

    async fn write(&self, range: &A1Range, values: Grid) -> Result<(), StoreError> {
        let a1 = range.to_string();
        let url = self.url(&["values", &a1])?;
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&WriteBody {
                range: a1,
                values: &values,
            });
        self.send("write", request).await?;
        Ok(())
    }

    async fn append(&self, tab: &str, row: Row) -> Result<(), StoreError> {
        let target = format!("{}:append", A1Range::first_column(tab));
        let url = self.url(&["values", &target])?;
        let request = self
            .client
            .post(url)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&AppendBody { values: [&row] });
        self.send("append", request).await?;
        Ok(())
    }

    async fn batch_write(&self, updates: Vec<(A1Range, Grid)>) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }

        let url = self.url(&["values:batchUpdate"])?;
        let body = BatchUpdateBody {
            value_input_option: "RAW",
            data: updates
                .into_iter()
                .map(|(range, values)| BatchRange {
                    range: range.to_string(),
                    values,
                })
                .collect(),
        };
        self.send("batch_write", self.client.post(url).json(&body))
            .await?;
        Ok(())
    }
}
