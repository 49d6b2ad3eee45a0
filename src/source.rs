// src/source.rs
//
// Fetch the input CSV and hand out its data lines (header skipped).

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use std::path::PathBuf;
use tracing::info;
use url::Url;

const GCS_API: &str = "https://storage.googleapis.com/storage/v1/b/";

/// Where the input CSV lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLocation {
    Local(PathBuf),
    Http(Url),
    Gcs { bucket: String, object: String },
}

impl InputLocation {
    /// Accepts a plain path, `file://`, `http(s)://` or `gs://bucket/object`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("empty input location");
        }
        if let Some(rest) = raw.strip_prefix("gs://") {
            let (bucket, object) = rest
                .split_once('/')
                .filter(|(b, o)| !b.is_empty() && !o.is_empty())
                .ok_or_else(|| anyhow!("expected gs://<bucket>/<object>, got {}", raw))?;
            return Ok(InputLocation::Gcs {
                bucket: bucket.to_string(),
                object: object.to_string(),
            });
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            let url = Url::parse(raw).with_context(|| format!("parsing input url {}", raw))?;
            return Ok(InputLocation::Http(url));
        }
        if raw.starts_with("file://") {
            let url = Url::parse(raw).with_context(|| format!("parsing input url {}", raw))?;
            let path = url
                .to_file_path()
                .map_err(|_| anyhow!("not a local file url: {}", raw))?;
            return Ok(InputLocation::Local(path));
        }
        Ok(InputLocation::Local(PathBuf::from(raw)))
    }
}

/// GCS JSON API media download URL for `bucket`/`object`.
fn gcs_media_url(bucket: &str, object: &str) -> Result<Url> {
    let mut url = Url::parse(GCS_API)?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("bad GCS base url"))?
        .pop_if_empty()
        .push(bucket)
        .push("o")
        .push(object);
    url.query_pairs_mut().append_pair("alt", "media");
    Ok(url)
}

async fn download(http: &Client, url: Url, token: Option<&str>) -> Result<Vec<u8>> {
    let mut req = http.get(url.clone());
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    let resp = req
        .send()
        .await
        .with_context(|| format!("requesting {}", url))?
        .error_for_status()
        .with_context(|| format!("downloading {}", url))?;
    Ok(resp.bytes().await?.to_vec())
}

/// Read the whole input into memory as UTF-8 text.
pub async fn fetch_text(
    location: &InputLocation,
    http: &Client,
    token: Option<&str>,
) -> Result<String> {
    let bytes = match location {
        InputLocation::Local(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        InputLocation::Http(url) => download(http, url.clone(), token).await?,
        InputLocation::Gcs { bucket, object } => {
            let token = token.context("gs:// input needs an access token")?;
            download(http, gcs_media_url(bucket, object)?, Some(token)).await?
        }
    };
    info!(?location, bytes = bytes.len(), "input fetched");
    String::from_utf8(bytes).context("input is not valid UTF-8")
}

/// Every line after the header. CRLF endings are stripped.
pub fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().skip(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_locations() {
        assert_eq!(
            InputLocation::parse("data/tdf_winners.csv").unwrap(),
            InputLocation::Local(PathBuf::from("data/tdf_winners.csv"))
        );
        assert_eq!(
            InputLocation::parse("gs://tdf-bucket/raw/tdf_winners.csv").unwrap(),
            InputLocation::Gcs {
                bucket: "tdf-bucket".into(),
                object: "raw/tdf_winners.csv".into()
            }
        );
        assert!(matches!(
            InputLocation::parse("https://example.com/tdf.csv").unwrap(),
            InputLocation::Http(_)
        ));
        assert_eq!(
            InputLocation::parse("file:///tmp/tdf.csv").unwrap(),
            InputLocation::Local(PathBuf::from("/tmp/tdf.csv"))
        );
        assert!(InputLocation::parse("gs://bucket-only").is_err());
        assert!(InputLocation::parse("gs:///object").is_err());
        assert!(InputLocation::parse("  ").is_err());
    }

    #[test]
    fn test_gcs_media_url_encodes_object() {
        let url = gcs_media_url("tdf-bucket", "raw/tdf winners.csv").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/tdf-bucket/o/raw%2Ftdf%20winners.csv?alt=media"
        );
    }

    #[test]
    fn test_data_lines_skip_header() {
        let text = "Year,TourNo,Winner\r\n1903,1,Garin\r\n\r\n1904,2,Cornet";
        let lines: Vec<&str> = data_lines(text).collect();
        assert_eq!(lines, vec!["1903,1,Garin", "", "1904,2,Cornet"]);
        assert_eq!(data_lines("header only\n").count(), 0);
        assert_eq!(data_lines("").count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "Year,TourNo\n1903,1\n").unwrap();
        let loc = InputLocation::parse(tmp.path().to_str().unwrap()).unwrap();
        let text = fetch_text(&loc, &Client::new(), None).await.unwrap();
        assert_eq!(text, "Year,TourNo\n1903,1\n");
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let loc = InputLocation::Local(PathBuf::from("/definitely/not/here.csv"));
        let err = fetch_text(&loc, &Client::new(), None).await.unwrap_err();
        assert!(err.to_string().contains("reading"));
    }

    #[tokio::test]
    async fn test_gcs_requires_token() {
        let loc = InputLocation::parse("gs://b/o.csv").unwrap();
        let err = fetch_text(&loc, &Client::new(), None).await.unwrap_err();
        assert!(err.to_string().contains("access token"));
    }
}
