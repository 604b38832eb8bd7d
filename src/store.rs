use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use futures::TryStreamExt;
use rusoto_core::{Region, RusotoError};
use rusoto_credential::AwsCredentials;
use rusoto_s3::util::{PreSignedRequest, PreSignedRequestOption};
use rusoto_s3::{
    DeleteObjectRequest, GetObjectError, GetObjectRequest, HeadObjectError, HeadObjectRequest,
    ListObjectsV2Request, PutObjectRequest, S3Client, StreamingBody, S3,
};
use url::Url;

use crate::errors::StoreError;

pub mod mock;

/// A flat key/value blob store.
pub trait Store: Send + Sync {
    /// Gets the whole object.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StoreError>>;

    /// Gets up to `len` bytes starting at `offset`, along with the total
    /// size of the object.
    fn get_range<'a>(
        &'a self,
        key: &'a str,
        offset: u64,
        len: u64,
    ) -> BoxFuture<'a, Result<(Vec<u8>, u64), StoreError>>;

    /// Gets the size of the object without its content.
    fn size<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>>;

    /// Saves the given data under the given key.
    fn put<'a>(
        &'a self,
        key: &'a str,
        raw: Vec<u8>,
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Deletes the given object.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Lists every key under `prefix`, across all pages.
    fn list_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>>;

    /// Generates a URL that lets a client `PUT` the object directly.
    fn signed_upload_url(
        &self,
        key: &str,
        content_type: Option<&str>,
        ttl: Duration,
    ) -> Result<Url, StoreError>;

    /// Deletes every object under `prefix` and returns how many there were.
    fn delete_by_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<usize, StoreError>> {
        async move {
            let keys = self.list_keys(prefix).await?;

            for key in &keys {
                self.delete(key).await?;
            }

            Ok(keys.len())
        }
        .boxed()
    }
}

/// A store that keeps its data in an S3 bucket.
pub struct S3Store {
    client: Arc<S3Client>,
    bucket: String,
    cache_control: Option<String>,
    region: Region,
    credentials: AwsCredentials,
}

impl S3Store {
    /// Creates a new instance.
    pub fn new(
        client: Arc<S3Client>,
        bucket: String,
        cache_control: Option<String>,
        region: Region,
        credentials: AwsCredentials,
    ) -> Self {
        Self {
            client,
            bucket,
            cache_control,
            region,
            credentials,
        }
    }

    pub fn from_env() -> Result<Self, rusoto_core::request::TlsError> {
        use rusoto_core::request::HttpClient;
        use rusoto_credential::StaticProvider;

        use crate::config::get_variable;

        let access_key = get_variable("S3_ACCESS_KEY");
        let secret_access_key = get_variable("S3_SECRET_ACCESS_KEY");

        let region = Region::Custom {
            name: get_variable("S3_REGION_NAME"),
            endpoint: get_variable("S3_ENDPOINT"),
        };

        let bucket = get_variable("S3_BUCKET_NAME");
        let cache_control = std::env::var("BACKEND_S3_CACHE_CONTROL").ok();

        let client = Arc::new(S3Client::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(access_key.clone(), secret_access_key.clone()),
            region.clone(),
        ));

        let credentials = AwsCredentials::new(access_key, secret_access_key, None, None);

        Ok(S3Store::new(client, bucket, cache_control, region, credentials))
    }
}

impl Store for S3Store {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StoreError>> {
        get(self, key, None).map(|r| r.map(|(raw, _)| raw)).boxed()
    }

    fn get_range<'a>(
        &'a self,
        key: &'a str,
        offset: u64,
        len: u64,
    ) -> BoxFuture<'a, Result<(Vec<u8>, u64), StoreError>> {
        get(self, key, Some((offset, len))).boxed()
    }

    fn size<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        size(self, key).boxed()
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        raw: Vec<u8>,
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        upload(self, key, raw, content_type).boxed()
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        delete(self, key).boxed()
    }

    fn list_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        list_keys(self, prefix).boxed()
    }

    fn signed_upload_url(
        &self,
        key: &str,
        content_type: Option<&str>,
        ttl: Duration,
    ) -> Result<Url, StoreError> {
        let request = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_owned(),
            content_type: content_type.map(str::to_owned),
            ..Default::default()
        };

        let options = PreSignedRequestOption { expires_in: ttl };
        let url = request.get_presigned_url(&self.region, &self.credentials, &options);

        Url::parse(&url).map_err(|e| StoreError::SigningFailed(e.to_string()))
    }
}

async fn get(
    store: &S3Store,
    key: &str,
    range: Option<(u64, u64)>,
) -> Result<(Vec<u8>, u64), StoreError> {
    let request = GetObjectRequest {
        bucket: store.bucket.clone(),
        key: key.to_owned(),
        range: range.map(|(offset, len)| format!("bytes={}-{}", offset, offset + len.max(1) - 1)),
        ..Default::default()
    };

    let output = store
        .client
        .get_object(request)
        .await
        .map_err(|source| match source {
            RusotoError::Service(GetObjectError::NoSuchKey(_)) => not_found(key),
            RusotoError::Unknown(ref response) if response.status.as_u16() == 404 => {
                not_found(key)
            }
            source => StoreError::GetFailed { source },
        })?;

    let content_length = output.content_length;
    let raw = match output.body {
        Some(body) => body
            .map_ok(|chunk| chunk.to_vec())
            .try_concat()
            .await
            .map_err(StoreError::ReadFailed)?,
        None => Vec::new(),
    };

    // `Content-Range: bytes 0-127/12345` carries the full size of a ranged read
    let total = output
        .content_range
        .as_deref()
        .and_then(|range| range.rsplit('/').next())
        .and_then(|total| total.parse().ok())
        .or_else(|| content_length.and_then(|len| u64::try_from(len).ok()))
        .unwrap_or(raw.len() as u64);

    Ok((raw, total))
}

async fn size(store: &S3Store, key: &str) -> Result<u64, StoreError> {
    let request = HeadObjectRequest {
        bucket: store.bucket.clone(),
        key: key.to_owned(),
        ..Default::default()
    };

    let output = store
        .client
        .head_object(request)
        .await
        .map_err(|source| match source {
            RusotoError::Service(HeadObjectError::NoSuchKey(_)) => not_found(key),
            RusotoError::Unknown(ref response) if response.status.as_u16() == 404 => {
                not_found(key)
            }
            source => StoreError::HeadFailed { source },
        })?;

    Ok(output
        .content_length
        .and_then(|len| u64::try_from(len).ok())
        .unwrap_or(0))
}

async fn upload(
    store: &S3Store,
    key: &str,
    raw: Vec<u8>,
    content_type: &str,
) -> Result<(), StoreError> {
    let len = i64::try_from(raw.len()).map_err(|e| StoreError::Unavailable(e.to_string()))?;

    let request = PutObjectRequest {
        body: Some(StreamingBody::from(raw)),
        bucket: store.bucket.clone(),
        cache_control: store.cache_control.clone(),
        content_length: Some(len),
        content_type: Some(content_type.to_owned()),
        key: key.to_owned(),
        ..Default::default()
    };

    let result = store.client.put_object(request).await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(StoreError::UploadFailed { source: e }),
    }
}

async fn delete(store: &S3Store, key: &str) -> Result<(), StoreError> {
    let request = DeleteObjectRequest {
        bucket: store.bucket.clone(),
        key: key.to_owned(),
        ..Default::default()
    };

    let result = store.client.delete_object(request).await;

    result
        .map(|_| ())
        .map_err(|source| StoreError::DeleteFailed { source })
}

async fn list_keys(store: &S3Store, prefix: &str) -> Result<Vec<String>, StoreError> {
    let mut keys = Vec::new();
    let mut continuation_token = None;

    loop {
        let request = ListObjectsV2Request {
            bucket: store.bucket.clone(),
            prefix: Some(prefix.to_owned()),
            continuation_token,
            ..Default::default()
        };

        let output = store
            .client
            .list_objects_v2(request)
            .await
            .map_err(|source| StoreError::ListFailed { source })?;

        keys.extend(
            output
                .contents
                .unwrap_or_default()
                .into_iter()
                .filter_map(|object| object.key),
        );

        match output.next_continuation_token {
            Some(token) if output.is_truncated == Some(true) => continuation_token = Some(token),
            _ => break,
        }
    }

    Ok(keys)
}

fn not_found(key: &str) -> StoreError {
    StoreError::NotFound {
        key: key.to_owned(),
    }
}
