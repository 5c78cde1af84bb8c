//! The Block Cache Client: a gzip-compressed get/put of encoded enriched
//! blocks against an S3-compatible object store, keyed by decimal block
//! number.

mod error;

use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use ingestr_types::{block_cache_key, BlockNumber};
use tracing::{debug, instrument};

pub use error::CacheError;

/// Fetches and stores the gzip-compressed, encoded enriched-block blob for a
/// block number.
///
/// Abstracted behind a trait so the claim/fetch/publish/store/retire pipeline
/// can be driven by an in-memory fake in tests.
#[async_trait]
pub trait BlockCache: Send + Sync {
    async fn get_block(&self, block_number: BlockNumber) -> Result<Vec<u8>, CacheError>;
    async fn store_block(&self, block_number: BlockNumber, bytes: &[u8]) -> Result<(), CacheError>;
}

/// S3-backed implementation. `bucket_uri` is an `s3://bucket[/prefix]` URI;
/// the prefix, if present, is joined with the block number key.
pub struct S3BlockCache {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: Option<String>,
    timeout: Duration,
}

impl S3BlockCache {
    pub fn new(client: aws_sdk_s3::Client, bucket_uri: &str, timeout: Duration) -> Self {
        let (bucket, prefix) = parse_bucket_uri(bucket_uri);
        Self { client, bucket, prefix, timeout }
    }

    fn object_key(&self, block_number: BlockNumber) -> String {
        let key = block_cache_key(block_number);
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key,
        }
    }
}

/// Splits `s3://bucket/optional/prefix` into `(bucket, Some(prefix))`, or
/// `(bucket, None)` when there is no prefix.
fn parse_bucket_uri(uri: &str) -> (String, Option<String>) {
    let rest = uri.strip_prefix("s3://").unwrap_or(uri);
    match rest.split_once('/') {
        Some((bucket, prefix)) if !prefix.is_empty() => (bucket.to_string(), Some(prefix.to_string())),
        _ => (rest.trim_end_matches('/').to_string(), None),
    }
}

#[async_trait]
impl BlockCache for S3BlockCache {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get_block(&self, block_number: BlockNumber) -> Result<Vec<u8>, CacheError> {
        let key = self.object_key(block_number);

        let output = tokio::time::timeout(
            self.timeout,
            self.client.get_object().bucket(&self.bucket).key(&key).send(),
        )
        .await
        .map_err(|_| CacheError::Timeout)?;

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    return Err(CacheError::NotFound(block_number));
                }
                return Err(CacheError::Get(Box::new(err)));
            }
        };

        let compressed = output
            .body
            .collect()
            .await
            .map_err(|err| CacheError::Get(Box::new(err)))?
            .into_bytes();

        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut bytes = Vec::new();
        decoder.read_to_end(&mut bytes).map_err(CacheError::Decompress)?;

        debug!(target: "ingestr::cache", block_number, bytes = bytes.len(), "cache hit");
        Ok(bytes)
    }

    #[instrument(skip(self, bytes), fields(bucket = %self.bucket))]
    async fn store_block(&self, block_number: BlockNumber, bytes: &[u8]) -> Result<(), CacheError> {
        let key = self.object_key(block_number);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).map_err(CacheError::Compress)?;
        let compressed = encoder.finish().map_err(CacheError::Compress)?;

        tokio::time::timeout(
            self.timeout,
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(ByteStream::from(compressed))
                .send(),
        )
        .await
        .map_err(|_| CacheError::Timeout)?
        .map_err(|err| CacheError::Put(Box::new(err)))?;

        Ok(())
    }
}
