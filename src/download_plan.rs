//! Serializable download plans and their execution.
//!
//! A plan is generated once from the catalog, written to JSON so a run can
//! be inspected or repeated, and then executed task by task. Each task
//! resolves its asset href to a final download URL and streams the file to
//! disk, resuming interrupted transfers from a `.partial` file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::client::ApiClient;
use crate::s3::{self, S3Object};

#[derive(Deserialize, Serialize, Debug)]
pub struct DownloadTask {
    item_id: String,
    href: String,
    output: String,
}

impl DownloadTask {
    pub fn new(item_id: &str, href: &str, output: &str) -> Self {
        DownloadTask {
            item_id: item_id.to_string(),
            href: href.to_string(),
            output: output.to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct DownloadPlan {
    id: String,
    tasks: Vec<DownloadTask>,
}

impl DownloadPlan {
    pub fn new(id: &str, tasks: Vec<DownloadTask>) -> Self {
        Self {
            id: id.to_string(),
            tasks,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub async fn execute(&self, client: &ApiClient) -> Result<()> {
        for (n, task) in self.tasks.iter().enumerate() {
            info!(
                task = n + 1,
                total = self.tasks.len(),
                item_id = %task.item_id,
                output = %task.output,
                "running download task"
            );
            download_asset(client, &task.href, &task.output).await?;
        }
        Ok(())
    }
}

/// Resolves `href` and streams the file to `output`, dispatching on where
/// the resolved URL points.
pub async fn download_asset(client: &ApiClient, href: &str, output: &str) -> Result<()> {
    let resolved = client.resolve_download_url(href).await?;
    let url = Url::parse(&resolved)?;

    if url.scheme() == "s3" {
        let object = S3Object::from_s3_uri(&resolved)?;
        let provider = s3::AnonProvider::for_region(&object.region).await;
        return s3::try_download(&provider, &object.bucket, &object.key, output).await;
    }

    // A bare bucket URL can be fetched with ranged S3 reads; a presigned
    // one (query string) must go through plain HTTP or the signature breaks.
    if url.query().is_none() {
        if let Ok(object) = S3Object::from_virtual_hosted_url(&resolved) {
            let provider = s3::AnonProvider::for_region(&object.region).await;
            return s3::try_download(&provider, &object.bucket, &object.key, output).await;
        }
    }

    try_download_http(client.download_client(), &resolved, output).await
}

/// Streams an http(s) URL to `output` with `.partial` resume, sending a
/// Range header when a previous partial exists.
pub async fn try_download_http(http: &reqwest::Client, url: &str, output: &str) -> Result<()> {
    let dst = Path::new(output);
    if dst.exists() {
        info!(output, "output file already exists");
        return Ok(());
    }

    if let Some(parent_dir) = dst.parent() {
        fs::create_dir_all(parent_dir)?;
    }

    let partial = format!("{}.partial", output);
    let mut partial_file = OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(&partial)?;
    let mut byte_count = partial_file.metadata()?.len();

    let mut request = http.get(url);
    if byte_count > 0 {
        request = request.header(RANGE, format!("bytes={}-", byte_count));
    }
    let response = request.send().await?;

    // A 416 on resume means the partial already holds the whole file; an
    // earlier run was interrupted after the stream but before the rename.
    if byte_count > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
        info!(output, bytes = byte_count, "partial file already complete");
        fs::rename(partial, dst)?;
        return Ok(());
    }
    let response = response.error_for_status()?;

    if byte_count > 0 {
        if response.status() == StatusCode::PARTIAL_CONTENT {
            info!(output, resumed_from = byte_count, "resuming download");
        } else {
            // Server ignored the range; start over
            warn!(output, "server does not support ranges; restarting download");
            partial_file.set_len(0)?;
            byte_count = 0;
        }
    }

    let stream = response.bytes_stream();
    futures_util::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        byte_count += bytes.len() as u64;
        partial_file.write_all(&bytes)?;
    }

    debug!(output, bytes = byte_count, "download complete");
    fs::rename(partial, dst)?;

    Ok(())
}
