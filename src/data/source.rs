//! Dataset retrieval: local CSV files or a plain HTTP GET.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::domain::DataSource;
use crate::error::AppError;

/// Environment variable holding the default loan dataset URL.
pub const LOAN_URL_ENV: &str = "RISK_LOAN_URL";
/// Environment variable holding the default transaction dataset URL.
pub const TRANSACTIONS_URL_ENV: &str = "RISK_TRANSACTIONS_URL";

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Pick the data source: explicit flags first, then `env_var` (after loading `.env`).
pub fn resolve_source(
    csv: Option<&std::path::Path>,
    url: Option<&str>,
    env_var: &str,
) -> Result<DataSource, AppError> {
    if let Some(path) = csv {
        return Ok(DataSource::File(path.to_path_buf()));
    }
    if let Some(url) = url {
        return Ok(DataSource::Url(url.to_string()));
    }

    dotenvy::dotenv().ok();
    match std::env::var(env_var) {
        Ok(url) if !url.trim().is_empty() => Ok(DataSource::Url(url.trim().to_string())),
        _ => Err(AppError::usage(format!(
            "No dataset given: pass --csv or --url, or set {env_var} in the environment (.env)."
        ))),
    }
}

/// Load the raw CSV bytes for a source.
pub fn fetch_bytes(source: &DataSource) -> Result<Vec<u8>, AppError> {
    match source {
        DataSource::File(path) => {
            info!(path = %path.display(), "reading dataset");
            std::fs::read(path)
                .map_err(|e| AppError::usage(format!("Failed to read CSV '{}': {e}", path.display())))
        }
        DataSource::Url(url) => fetch_url(url),
    }
}

fn fetch_url(url: &str) -> Result<Vec<u8>, AppError> {
    info!(%url, "fetching dataset");
    let client = Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| AppError::runtime(format!("Failed to build HTTP client: {e}")))?;

    let resp = client
        .get(url)
        .send()
        .map_err(|e| AppError::runtime(format!("Dataset request failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(AppError::runtime(format!(
            "Dataset request failed with status {}.",
            resp.status()
        )));
    }

    let body = resp
        .bytes()
        .map_err(|e| AppError::runtime(format!("Failed to read dataset response: {e}")))?;
    debug!(bytes = body.len(), "dataset downloaded");
    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn explicit_file_wins_over_url() {
        let src = resolve_source(Some(Path::new("loans.csv")), Some("http://x/y.csv"), "UNUSED_VAR").unwrap();
        assert_eq!(src, DataSource::File("loans.csv".into()));
    }

    #[test]
    fn explicit_url_is_used() {
        let src = resolve_source(None, Some("https://example.org/t.csv"), "UNUSED_VAR").unwrap();
        assert_eq!(src, DataSource::Url("https://example.org/t.csv".to_string()));
    }

    #[test]
    fn missing_source_is_usage_error() {
        let err = resolve_source(None, None, "RISK_SCREEN_TEST_VAR_THAT_IS_NEVER_SET").unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_USAGE);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = fetch_bytes(&DataSource::File("/nonexistent/risk/data.csv".into())).unwrap_err();
        assert!(err.message().contains("/nonexistent/risk/data.csv"));
    }
}
