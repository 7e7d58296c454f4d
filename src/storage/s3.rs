//! S3-compatible blob store.
//!
//! Works against AWS S3 and self-hosted servers such as MinIO or LocalStack.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::SdkError,
    primitives::ByteStream,
    types::Object,
    Client,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::config::S3Config;
use crate::Result;

use super::{BlobError, BlobMetadata, BlobOwner, BlobStore, ListPage};

/// Blob store over one S3 bucket.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a store for `bucket` with the given connection settings.
    pub async fn new(bucket: &str, config: &S3Config) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                &config.access_key,
                &config.secret_key,
                None,
                None,
                "recman-s3",
            ))
            .sleep_impl(aws_smithy_async::rt::sleep::TokioSleep::new());
        if !config.endpoint.is_empty() {
            loader = loader.endpoint_url(&config.endpoint);
        }
        let sdk_config = loader.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket: bucket.to_string(),
        })
    }

    fn to_metadata(&self, object: &Object) -> Option<BlobMetadata> {
        let key = object.key()?.to_string();
        let last_modified = last_modified_or_now(&key, object.last_modified(), Utc::now());

        Some(BlobMetadata {
            bucket_name: self.bucket.clone(),
            key,
            etag: object.e_tag().unwrap_or_default().to_string(),
            size: object.size().unwrap_or(0).max(0) as u64,
            last_modified,
            storage_class: object
                .storage_class()
                .map(|c| c.as_str().to_string())
                .unwrap_or_default(),
            owner: object.owner().and_then(|o| {
                o.id().map(|id| BlobOwner {
                    id: id.to_string(),
                    display_name: o.display_name().map(str::to_string),
                })
            }),
        })
    }
}

/// Convert an object's last-modified stamp, using `now` when it is missing or out of range.
fn last_modified_or_now(
    key: &str,
    value: Option<&aws_sdk_s3::primitives::DateTime>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match value.and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())) {
        Some(at) => at,
        None => {
            tracing::warn!(key = %key, "Object has no usable last-modified time, using now");
            now
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, source: &Path) -> std::result::Result<(), BlobError> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| BlobError::Backend(format!("failed to open {}: {e}", source.display())))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let details = match &e {
                    SdkError::ServiceError(se) => {
                        format!("HTTP {}: {:?}", se.raw().status(), se.err())
                    }
                    SdkError::TimeoutError(_) => "Timeout".to_string(),
                    SdkError::DispatchFailure(df) => format!("Dispatch: {df:?}"),
                    _ => format!("{e:?}"),
                };
                BlobError::Backend(format!(
                    "S3 put_object failed: bucket={}, key={key}, details={details}",
                    self.bucket
                ))
            })?;

        Ok(())
    }

    async fn get(&self, key: &str) -> std::result::Result<Bytes, BlobError> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => {
                let collected = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| BlobError::Read(format!("S3 body read failed: {e}")))?;
                Ok(collected.into_bytes())
            }
            Err(e) => {
                let no_such_key = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if no_such_key || is_not_found_error(&e) {
                    Err(BlobError::NotFound(key.to_string()))
                } else {
                    Err(BlobError::Backend(format!("S3 get_object failed: {e}")))
                }
            }
        }
    }

    async fn list(
        &self,
        continuation_token: Option<String>,
    ) -> std::result::Result<ListPage, BlobError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .fetch_owner(true)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| BlobError::Backend(format!("S3 list_objects_v2 failed: {e}")))?;

        let entries = output
            .contents()
            .iter()
            .filter_map(|o| self.to_metadata(o))
            .collect();

        Ok(ListPage {
            entries,
            next_token: output.next_continuation_token().map(str::to_string),
            is_truncated: output.is_truncated().unwrap_or(false),
        })
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), BlobError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| BlobError::Backend(format!("S3 delete_object failed: {e}")))?;

        Ok(())
    }
}

/// Check if an S3 error is a "Not Found" error.
fn is_not_found_error<E>(err: &SdkError<E>) -> bool
where
    E: std::error::Error + 'static,
{
    matches!(err, SdkError::ServiceError(e) if e.raw().status().as_u16() == 404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::primitives::DateTime as SdkDateTime;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 31, 21, 15, 7).unwrap()
    }

    #[test]
    fn test_last_modified_is_converted() {
        let stamp = SdkDateTime::from_secs(1_725_138_907);
        let at = last_modified_or_now("k", Some(&stamp), Utc::now());
        assert_eq!(at, now());
    }

    #[test]
    fn test_missing_last_modified_uses_now() {
        assert_eq!(last_modified_or_now("k", None, now()), now());
    }

    #[test]
    fn test_out_of_range_last_modified_uses_now() {
        let stamp = SdkDateTime::from_secs(i64::MAX);
        assert_eq!(last_modified_or_now("k", Some(&stamp), now()), now());
    }
}
