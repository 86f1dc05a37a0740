//! Sheets v4 client scoped to one spreadsheet.

use super::{endpoint, expect_success, json_body, TokenProvider};
use crate::error::RemoteError;
use crate::pipeline::sheet::SheetService;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const SERVICE: &str = "sheets";

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

/// [`SheetService`] backed by the Sheets REST API.
pub struct SheetsClient {
    http: reqwest::Client,
    token: Arc<dyn TokenProvider>,
    spreadsheet_id: String,
    api_base: String,
}

impl SheetsClient {
    pub fn new(
        http: reqwest::Client,
        token: Arc<dyn TokenProvider>,
        spreadsheet_id: impl Into<String>,
    ) -> Self {
        Self::with_base_url(http, token, spreadsheet_id, SHEETS_API_BASE)
    }

    /// Point the client at another host, e.g. a local test server.
    pub fn with_base_url(
        http: reqwest::Client,
        token: Arc<dyn TokenProvider>,
        spreadsheet_id: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token,
            spreadsheet_id: spreadsheet_id.into(),
            api_base: api_base.into(),
        }
    }

    fn url(&self, tail: &[&str]) -> Result<reqwest::Url, RemoteError> {
        let mut segments = vec![self.spreadsheet_id.as_str()];
        segments.extend_from_slice(tail);
        endpoint(SERVICE, &self.api_base, &segments)
    }

    async fn put_values(
        &self,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<(), RemoteError> {
        let token = self.token.access_token().await?;
        let response = self
            .http
            .put(self.url(&["values", range])?)
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": values,
            }))
            .send()
            .await
            .map_err(|e| RemoteError::transport(SERVICE, e))?;
        expect_success(SERVICE, response).await?;
        Ok(())
    }
}

/// `'name'!range`, quoting the worksheet title as A1 notation requires.
pub fn a1(worksheet: &str, range: &str) -> String {
    format!("'{}'!{}", worksheet.replace('\'', "''"), range)
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetService for SheetsClient {
    fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    async fn worksheet_exists(&self, worksheet: &str) -> Result<bool, RemoteError> {
        let token = self.token.access_token().await?;
        let response = self
            .http
            .get(self.url(&[])?)
            .bearer_auth(token)
            .query(&[("fields", "sheets.properties.title")])
            .send()
            .await
            .map_err(|e| RemoteError::transport(SERVICE, e))?;
        let spreadsheet: Spreadsheet = json_body(SERVICE, response).await?;
        Ok(spreadsheet
            .sheets
            .iter()
            .any(|s| s.properties.title == worksheet))
    }

    async fn column_values(&self, worksheet: &str, column: &str) -> Result<Vec<String>, RemoteError> {
        let token = self.token.access_token().await?;
        let range = a1(worksheet, &format!("{column}:{column}"));
        let response = self
            .http
            .get(self.url(&["values", range.as_str()])?)
            .bearer_auth(token)
            .query(&[("majorDimension", "COLUMNS")])
            .send()
            .await
            .map_err(|e| RemoteError::transport(SERVICE, e))?;
        let body: ValueRange = json_body(SERVICE, response).await?;
        let values: Vec<String> = body
            .values
            .first()
            .map(|col| col.iter().map(cell_text).collect())
            .unwrap_or_default();
        debug!("Sheets: {} has {} values in column {}", worksheet, values.len(), column);
        Ok(values)
    }

    async fn update_range(
        &self,
        worksheet: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), RemoteError> {
        self.put_values(&a1(worksheet, range), rows).await
    }

    async fn update_formulas(
        &self,
        worksheet: &str,
        cells: Vec<(String, String)>,
    ) -> Result<(), RemoteError> {
        let token = self.token.access_token().await?;
        let data: Vec<serde_json::Value> = cells
            .into_iter()
            .map(|(cell, formula)| {
                json!({
                    "range": a1(worksheet, &cell),
                    "values": [[formula]],
                })
            })
            .collect();
        let response = self
            .http
            .post(self.url(&["values:batchUpdate"])?)
            .bearer_auth(token)
            .json(&json!({
                "valueInputOption": "USER_ENTERED",
                "data": data,
            }))
            .send()
            .await
            .map_err(|e| RemoteError::transport(SERVICE, e))?;
        expect_success(SERVICE, response).await?;
        Ok(())
    }

    async fn update_cell(&self, worksheet: &str, cell: &str, value: &str) -> Result<(), RemoteError> {
        self.put_values(&a1(worksheet, cell), vec![vec![value.to_string()]])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a1_quotes_titles() {
        assert_eq!(a1("bulco", "A:A"), "'bulco'!A:A");
        assert_eq!(a1("O'Brien", "F3"), "'O''Brien'!F3");
    }

    #[test]
    fn cells_render_as_text() {
        assert_eq!(cell_text(&json!("x")), "x");
        assert_eq!(cell_text(&json!(42)), "42");
        assert_eq!(cell_text(&serde_json::Value::Null), "");
    }
}
