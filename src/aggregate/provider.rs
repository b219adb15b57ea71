// src/aggregate/provider.rs
//
// Where reference tables come from. The aggregator only ever sees a `Table`.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, instrument};
use url::Url;

use super::table::Table;

pub trait TableProvider {
    /// Short description for logs.
    fn describe(&self) -> String;
    fn fetch(&self) -> Result<Table>;
}

/// A CSV file on disk.
pub struct CsvFile {
    path: PathBuf,
}

impl CsvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TableProvider for CsvFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn fetch(&self) -> Result<Table> {
        let table = Table::from_path(&self.path)?;
        debug!(rows = table.len(), "read reference table");
        Ok(table)
    }
}

/// A CSV document served over HTTP(S). One attempt, no retries.
pub struct HttpCsv {
    client: Client,
    url: Url,
}

impl HttpCsv {
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl TableProvider for HttpCsv {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    #[instrument(level = "debug", skip(self), fields(url = %self.url))]
    fn fetch(&self) -> Result<Table> {
        let body = self
            .client
            .get(self.url.clone())
            .send()
            .with_context(|| format!("GET {} failed", self.url))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", self.url))?
            .text()
            .with_context(|| format!("Reading text from {}", self.url))?;
        let table = Table::from_reader(body.as_bytes()).with_context(|| format!("parsing {}", self.url))?;
        info!(url = %self.url, rows = table.len(), "downloaded reference table");
        Ok(table)
    }
}

/// A provider for `source`: an http(s) URL or a local path.
pub fn provider_for(source: &str) -> Result<Box<dyn TableProvider>> {
    match Url::parse(source) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Box::new(HttpCsv::new(url)?)),
        _ => Ok(Box::new(CsvFile::new(source))),
    }
}
