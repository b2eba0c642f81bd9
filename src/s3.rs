//! Anonymous S3 access for assets whose download URLs point into buckets.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::Client;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

const DEFAULT_REGION: &str = "us-east-1";

/// A bucket object addressed by either an `s3://` URI or a
/// virtual-hosted https URL.
#[derive(Debug, PartialEq)]
pub struct S3Object {
    pub region: String,
    pub bucket: String,
    pub key: String,
}

impl S3Object {
    /// Parses `https://<bucket>.s3.<region>.amazonaws.com/<key>`.
    pub fn from_virtual_hosted_url(url: &str) -> Result<Self> {
        let re = Regex::new(
            r"https:\/\/(?<bucket>[\d\w-]+)\.s3\.(?<region>[\d\w-]+)\.amazonaws.com\/(?<key>.+)",
        )
        .expect("Regex pattern should always compile");

        let captures = re
            .captures(url)
            .ok_or(anyhow!("Not a virtual-hosted S3 url: {}", url))?;

        let (_, [bucket, region, key]) = captures.extract();

        Ok(Self {
            region: region.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Parses `s3://<bucket>/<key>`. The scheme carries no region, so the
    /// default region is assumed.
    pub fn from_s3_uri(uri: &str) -> Result<Self> {
        let parsed = Url::parse(uri)?;
        if parsed.scheme() != "s3" {
            return Err(anyhow!("Not an s3 uri: {}", uri));
        }
        let bucket = parsed
            .host_str()
            .ok_or(anyhow!("Missing bucket in s3 uri: {}", uri))?;
        let key = parsed.path().trim_start_matches('/');
        if key.is_empty() {
            return Err(anyhow!("Missing key in s3 uri: {}", uri));
        }
        Ok(Self {
            region: DEFAULT_REGION.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

pub async fn anon_client(region: &str) -> Client {
    let region = Region::new(region.to_string());
    let config = aws_config::defaults(BehaviorVersion::latest())
        .no_credentials()
        .region(region)
        .load()
        .await;
    Client::new(&config)
}

pub trait S3ObjOps {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<HeadObjectOutput>;

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<GetObjectOutput>;
}

/// Unsigned-request provider; the MLHub-hosted buckets allow anonymous reads.
pub struct AnonProvider {
    client: Client,
}

impl AnonProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn for_region(region: &str) -> Self {
        let client = anon_client(region).await;
        Self { client }
    }
}

impl S3ObjOps for AnonProvider {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<HeadObjectOutput> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        Ok(head)
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<GetObjectOutput> {
        let range = format!("bytes={}-{}", start_byte, end_byte);
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range)
            .send()
            .await?;
        Ok(object)
    }
}

/// Downloads a bucket object to `output`, resuming from a `.partial` file
/// if a previous attempt was interrupted.
pub async fn try_download(
    provider: &impl S3ObjOps,
    bucket: &str,
    key: &str,
    output: &str,
) -> Result<()> {
    // Check if the output file already exists; return early if so
    let dst = Path::new(output);
    if dst.exists() {
        info!(output, "output file already exists");
        return Ok(());
    }

    if let Some(parent_dir) = dst.parent() {
        fs::create_dir_all(parent_dir)?;
    }

    // Check if partial file exists and get its size
    let partial = format!("{}.partial", output);
    let mut partial_file = OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(&partial)?;
    let mut byte_count = partial_file.metadata()?.len();

    let head_object = provider.head_object(bucket, key).await?;

    let total_size = head_object
        .content_length()
        .ok_or(anyhow!("Error reading size of remote object"))? as u64;

    let progress = (byte_count as f64 / total_size as f64) * 100.;
    if progress > 0.0 {
        info!(output, "resuming download from {:.2}% completion", progress);
    }

    if byte_count < total_size {
        let mut response = provider
            .get_object_range(bucket, key, byte_count, total_size - 1)
            .await?;

        while let Some(bytes) = response.body.try_next().await? {
            let bytes_len = bytes.len() as u64;
            partial_file.write_all(&bytes)?;
            byte_count += bytes_len;
        }
    }

    debug!(output, bytes = byte_count, "download complete");
    // Rename the file to remove .partial suffix
    fs::rename(partial, dst)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_virtual_hosted_url() {
        let url = "https://radiant-mlhub.s3.us-west-2.amazonaws.com/landcovernet/ref_landcovernet_v1_labels_29PKL_19/labels.tif";
        let object = S3Object::from_virtual_hosted_url(url).unwrap();
        assert_eq!(
            object,
            S3Object {
                bucket: "radiant-mlhub".to_string(),
                region: "us-west-2".to_string(),
                key: "landcovernet/ref_landcovernet_v1_labels_29PKL_19/labels.tif".to_string()
            }
        );
    }

    #[test]
    fn test_from_virtual_hosted_url_rejects_other_hosts() {
        let url = "https://api.radiant.earth/mlhub/v1/download/abc123";
        assert!(S3Object::from_virtual_hosted_url(url).is_err());
    }

    #[test]
    fn test_from_s3_uri() {
        let uri = "s3://radiant-mlhub/landcovernet/labels.tif";
        let object = S3Object::from_s3_uri(uri).unwrap();
        assert_eq!(object.bucket, "radiant-mlhub");
        assert_eq!(object.key, "landcovernet/labels.tif");
        assert_eq!(object.region, DEFAULT_REGION);
    }

    #[test]
    fn test_from_s3_uri_rejects_http() {
        assert!(S3Object::from_s3_uri("https://radiant-mlhub/landcovernet").is_err());
    }
}
