//! Resolution of YLE program IDs into playable media URLs.
//!
//! The provider needs two sequential lookups: the program's publication
//! events give a media ID, and the playouts endpoint gives an encrypted
//! HLS URL for that media. The URL is AES-CBC encrypted with a pre-shared
//! key, prefixed by its IV and base64 encoded.
//!
//! Every failure, whatever step it happens in, surfaces as one
//! [`ResolutionError`] carrying the step-specific [`ResolutionCause`].
//! Nothing is cached: each call goes to the provider.

use std::sync::Arc;
use std::time::Duration;

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use futures::future::{BoxFuture, FutureExt};
use log::{debug, o, Logger};
use serde::Deserialize;
use url::Url;

use crate::config::YleConfig;
use crate::errors::{ResolutionCause, ResolutionError};

const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const CURRENT_STATUS: &str = "currently";
const PROTOCOL: &str = "HLS";

const PROGRAM_INFO_ENDPOINT: &str = "program info";
const PLAYOUTS_ENDPOINT: &str = "playouts";

/// Turns an opaque provider ID into something a browser can play.
pub trait Resolve: Send + Sync {
    fn resolve<'a>(&'a self, program_id: &'a str)
        -> BoxFuture<'a, Result<String, ResolutionError>>;
}

/// Performs a GET and returns the body of a successful response.
pub trait Fetch: Send + Sync {
    fn get(&self, url: Url) -> BoxFuture<'_, Result<Vec<u8>, ResolutionCause>>;
}

/// [`Fetch`] over HTTPS with a per-request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(HttpFetcher { client })
    }
}

impl Fetch for HttpFetcher {
    fn get(&self, url: Url) -> BoxFuture<'_, Result<Vec<u8>, ResolutionCause>> {
        async move {
            let response = self.client.get(url).send().await.map_err(map_http_error)?;
            let status = response.status();

            if !status.is_success() {
                return Err(ResolutionCause::Status(status.as_u16()));
            }

            let body = response.bytes().await.map_err(map_http_error)?;

            Ok(body.to_vec())
        }
        .boxed()
    }
}

fn map_http_error(e: reqwest::Error) -> ResolutionCause {
    if e.is_timeout() {
        ResolutionCause::Timeout
    } else {
        ResolutionCause::Http(e)
    }
}

/// Resolves program IDs against the YLE API.
pub struct YleResolver {
    config: YleConfig,
    fetcher: Arc<dyn Fetch>,
    logger: Arc<Logger>,
}

#[derive(Deserialize)]
struct ProgramInfo {
    data: ProgramData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgramData {
    #[serde(default)]
    publication_event: Vec<PublicationEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicationEvent {
    #[serde(default)]
    temporal_status: Option<String>,
    #[serde(default)]
    media: Option<MediaReference>,
}

#[derive(Deserialize)]
struct MediaReference {
    id: String,
}

#[derive(Deserialize)]
struct Playouts {
    data: Vec<Playout>,
}

#[derive(Deserialize)]
struct Playout {
    url: String,
}

impl YleResolver {
    pub fn new(config: YleConfig, fetcher: Arc<dyn Fetch>, logger: Arc<Logger>) -> Self {
        YleResolver {
            config,
            fetcher,
            logger,
        }
    }

    /// Builds a resolver that talks to the real provider.
    pub fn with_http(config: YleConfig, logger: Arc<Logger>) -> Result<Self, reqwest::Error> {
        let fetcher = Arc::new(HttpFetcher::new(config.timeout)?);

        Ok(YleResolver::new(config, fetcher, logger))
    }

    async fn resolve_program(&self, program_id: &str) -> Result<String, ResolutionCause> {
        let logger = self.logger.new(o!("program_id" => program_id.to_owned()));

        check_program_id(program_id)?;

        debug!(logger, "Looking up publication events...");
        let body = self.fetcher.get(self.program_info_url(program_id)?).await?;
        let media_id = current_media_id(&body)?;

        debug!(logger, "Fetching playouts..."; "media_id" => &media_id);
        let body = self
            .fetcher
            .get(self.playouts_url(program_id, &media_id)?)
            .await?;
        let encrypted = encrypted_url(&body)?;

        debug!(logger, "Decrypting media URL...");
        decrypt_url(&self.config.decryption_key, &encrypted)
    }

    fn program_info_url(&self, program_id: &str) -> Result<Url, ResolutionCause> {
        let mut url = self
            .config
            .api_base()
            .join(&format!("v1/programs/items/{}.json", program_id))
            .map_err(|_| ResolutionCause::MalformedProgramId)?;

        url.query_pairs_mut()
            .append_pair("app_id", &self.config.app_id)
            .append_pair("app_key", &self.config.app_key);

        Ok(url)
    }

    fn playouts_url(&self, program_id: &str, media_id: &str) -> Result<Url, ResolutionCause> {
        let mut url = self
            .config
            .api_base()
            .join("v1/media/playouts.json")
            .map_err(|_| ResolutionCause::MalformedProgramId)?;

        url.query_pairs_mut()
            .append_pair("program_id", program_id)
            .append_pair("media_id", media_id)
            .append_pair("protocol", PROTOCOL)
            .append_pair("app_id", &self.config.app_id)
            .append_pair("app_key", &self.config.app_key);

        Ok(url)
    }
}

impl Resolve for YleResolver {
    fn resolve<'a>(
        &'a self,
        program_id: &'a str,
    ) -> BoxFuture<'a, Result<String, ResolutionError>> {
        async move {
            self.resolve_program(program_id)
                .await
                .map_err(|cause| ResolutionError::new(program_id, cause))
        }
        .boxed()
    }
}

/// Program IDs look like `1-50000093`.
fn check_program_id(program_id: &str) -> Result<(), ResolutionCause> {
    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    match program_id.split_once('-') {
        Some((area, number)) if is_number(area) && is_number(number) => Ok(()),
        _ => Err(ResolutionCause::MalformedProgramId),
    }
}

/// Picks the media of the first publication event running right now.
fn current_media_id(body: &[u8]) -> Result<String, ResolutionCause> {
    let info: ProgramInfo =
        serde_json::from_slice(body).map_err(|e| ResolutionCause::InvalidResponse {
            endpoint: PROGRAM_INFO_ENDPOINT,
            reason: e.to_string(),
        })?;

    let event = info
        .data
        .publication_event
        .into_iter()
        .find(|event| event.temporal_status.as_deref() == Some(CURRENT_STATUS))
        .ok_or(ResolutionCause::NoCurrentPublication)?;

    event
        .media
        .map(|media| media.id)
        .ok_or_else(|| ResolutionCause::InvalidResponse {
            endpoint: PROGRAM_INFO_ENDPOINT,
            reason: "current publication event has no media".to_owned(),
        })
}

/// Extracts `data[0].url` from a playouts response.
fn encrypted_url(body: &[u8]) -> Result<String, ResolutionCause> {
    let playouts: Playouts =
        serde_json::from_slice(body).map_err(|e| ResolutionCause::InvalidResponse {
            endpoint: PLAYOUTS_ENDPOINT,
            reason: e.to_string(),
        })?;

    playouts
        .data
        .into_iter()
        .next()
        .map(|playout| playout.url)
        .ok_or_else(|| ResolutionCause::InvalidResponse {
            endpoint: PLAYOUTS_ENDPOINT,
            reason: "no playouts listed".to_owned(),
        })
}

/// Decrypts a base64 `IV || ciphertext` blob into a URL, dropping the
/// space padding.
pub fn decrypt_url(key: &[u8], encrypted: &str) -> Result<String, ResolutionCause> {
    let raw = STANDARD
        .decode(encrypted.trim())
        .map_err(ResolutionCause::Base64)?;

    if raw.len() <= IV_LEN {
        return Err(ResolutionCause::Decryption("ciphertext is too short"));
    }

    let (iv, message) = raw.split_at(IV_LEN);

    if message.len() % BLOCK_LEN != 0 {
        return Err(ResolutionCause::Decryption(
            "ciphertext is not a whole number of blocks",
        ));
    }

    let invalid_key = |_| ResolutionCause::Decryption("invalid key or IV length");
    let decrypted = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid_key)?
            .decrypt_padded_vec_mut::<NoPadding>(message),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid_key)?
            .decrypt_padded_vec_mut::<NoPadding>(message),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid_key)?
            .decrypt_padded_vec_mut::<NoPadding>(message),
        _ => return Err(ResolutionCause::Decryption("key must be 16, 24 or 32 bytes")),
    }
    .map_err(|_| ResolutionCause::Decryption("ciphertext could not be unpadded"))?;

    let url = String::from_utf8(decrypted).map_err(ResolutionCause::NotUtf8)?;

    Ok(url.trim_end().to_owned())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use aes::{Aes128, Aes256};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use cbc::cipher::block_padding::NoPadding;
    use cbc::cipher::{BlockEncryptMut, KeyIvInit};
    use futures::future::{BoxFuture, FutureExt};
    use serde_json::json;
    use url::Url;

    use tokio::net::TcpListener;

    use super::{decrypt_url, Fetch, HttpFetcher, Resolve, YleResolver};
    use crate::config::YleConfig;
    use crate::errors::ResolutionCause;

    const KEY: &[u8; 16] = b"0123456789abcdef";
    const IV: &[u8; 16] = b"1234567890123456";
    const PLAYABLE: &str = "https://yle-vod.example.com/media.m3u8";

    /// Answers by URL path; unknown paths get a 503.
    #[derive(Default)]
    struct CannedFetcher {
        responses: HashMap<&'static str, Vec<u8>>,
        requests: Mutex<Vec<Url>>,
    }

    impl CannedFetcher {
        fn with(mut self, path: &'static str, body: impl Into<Vec<u8>>) -> Self {
            self.responses.insert(path, body.into());
            self
        }

        fn requests(&self) -> Vec<Url> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Fetch for CannedFetcher {
        fn get(&self, url: Url) -> BoxFuture<'_, Result<Vec<u8>, ResolutionCause>> {
            self.requests.lock().unwrap().push(url.clone());

            let response = self
                .responses
                .get(url.path())
                .cloned()
                .ok_or(ResolutionCause::Status(503));

            async move { response }.boxed()
        }
    }

    fn encrypt_with_aes128(key: &[u8], iv: &[u8], url: &str) -> String {
        let mut padded = url.as_bytes().to_vec();
        while padded.len() % 16 != 0 {
            padded.push(b' ');
        }

        let ciphertext = cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_vec_mut::<NoPadding>(&padded);

        STANDARD.encode([iv, &ciphertext[..]].concat())
    }

    fn program_info(events: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({"data": {"publicationEvent": events}})).unwrap()
    }

    fn playouts(encrypted: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({"data": [{"url": encrypted}]})).unwrap()
    }

    fn resolver(fetcher: Arc<CannedFetcher>) -> YleResolver {
        let config = YleConfig::new(
            Url::parse("https://api.example.com").unwrap(),
            "test_id",
            "test_key",
            KEY.to_vec(),
            Duration::from_secs(1),
        )
        .unwrap();

        YleResolver::new(config, fetcher, Arc::new(log::discard()))
    }

    fn current_events() -> serde_json::Value {
        json!([
            {"temporalStatus": "in_past", "media": {"id": "old-media"}},
            {"temporalStatus": "currently", "media": {"id": "media-123"}},
            {"temporalStatus": "in_future", "media": {"id": "future-media"}}
        ])
    }

    #[tokio::test]
    async fn resolves_program_to_decrypted_url() {
        let fetcher = Arc::new(
            CannedFetcher::default()
                .with("/v1/programs/items/1-50000093.json", program_info(current_events()))
                .with("/v1/media/playouts.json", playouts(&encrypt_with_aes128(KEY, IV, PLAYABLE))),
        );

        let url = resolver(fetcher.clone())
            .resolve("1-50000093")
            .await
            .expect("resolve program");

        assert_eq!(url, PLAYABLE);

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 2);

        let query: HashMap<_, _> = requests[1].query_pairs().into_owned().collect();
        assert_eq!(query["program_id"], "1-50000093");
        assert_eq!(query["media_id"], "media-123");
        assert_eq!(query["protocol"], "HLS");
        assert_eq!(query["app_id"], "test_id");
        assert_eq!(query["app_key"], "test_key");
    }

    #[tokio::test]
    async fn provider_timeout_is_reported_as_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        // accept connections and hold them open without ever answering
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = YleConfig::new(
            Url::parse(&format!("http://{}", address)).unwrap(),
            "test_id",
            "test_key",
            KEY.to_vec(),
            Duration::from_millis(50),
        )
        .unwrap();
        let fetcher = Arc::new(HttpFetcher::new(Duration::from_millis(50)).unwrap());

        let error = YleResolver::new(config, fetcher, Arc::new(log::discard()))
            .resolve("1-50000093")
            .await
            .expect_err("provider never answers");

        assert_eq!(error.program_id, "1-50000093");
        assert!(matches!(error.cause, ResolutionCause::Timeout), "{:?}", error.cause);
    }

    #[tokio::test]
    async fn missing_current_publication_is_distinct() {
        let fetcher = Arc::new(CannedFetcher::default().with(
            "/v1/programs/items/1-50000093.json",
            program_info(json!([{"temporalStatus": "in_future", "media": {"id": "future-media"}}])),
        ));

        let error = resolver(fetcher.clone())
            .resolve("1-50000093")
            .await
            .expect_err("no current event");

        assert!(error.is_no_current_publication());
        assert_eq!(error.program_id, "1-50000093");
        assert_eq!(fetcher.requests().len(), 1, "playouts must not be requested");
    }

    #[tokio::test]
    async fn invalid_playouts_response_fails() {
        let fetcher = Arc::new(
            CannedFetcher::default()
                .with("/v1/programs/items/1-50000093.json", program_info(current_events()))
                .with("/v1/media/playouts.json", b"invalid json".to_vec()),
        );

        let error = resolver(fetcher).resolve("1-50000093").await.expect_err("bad JSON");

        assert!(matches!(
            error.cause,
            ResolutionCause::InvalidResponse { endpoint: "playouts", .. }
        ));
    }

    #[tokio::test]
    async fn empty_playouts_fail() {
        let fetcher = Arc::new(
            CannedFetcher::default()
                .with("/v1/programs/items/1-50000093.json", program_info(current_events()))
                .with("/v1/media/playouts.json", br#"{"data": []}"#.to_vec()),
        );

        let error = resolver(fetcher).resolve("1-50000093").await.expect_err("no playouts");

        assert!(matches!(error.cause, ResolutionCause::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn provider_errors_are_wrapped() {
        let fetcher = Arc::new(CannedFetcher::default());

        let error = resolver(fetcher).resolve("1-50000093").await.expect_err("503");

        assert!(matches!(error.cause, ResolutionCause::Status(503)));
        assert!(error.to_string().contains("content resolution failed"));
    }

    #[tokio::test]
    async fn malformed_program_ids_never_reach_the_provider() {
        let fetcher = Arc::new(CannedFetcher::default());
        let resolver = resolver(fetcher.clone());

        for id in &["", "123", "1-", "-2", "1-2-3", "a-1", "../1-2"] {
            let error = resolver.resolve(id).await.expect_err("malformed ID");
            assert!(matches!(error.cause, ResolutionCause::MalformedProgramId), "{:?}", id);
        }

        assert!(fetcher.requests().is_empty());
    }

    #[test]
    fn decrypts_with_longer_keys() {
        let key = [7u8; 32];
        let mut padded = PLAYABLE.as_bytes().to_vec();
        while padded.len() % 16 != 0 {
            padded.push(b' ');
        }

        let ciphertext = cbc::Encryptor::<Aes256>::new_from_slices(&key, IV)
            .unwrap()
            .encrypt_padded_vec_mut::<NoPadding>(&padded);
        let encrypted = STANDARD.encode([&IV[..], &ciphertext[..]].concat());

        assert_eq!(decrypt_url(&key, &encrypted).unwrap(), PLAYABLE);
    }

    #[test]
    fn rejects_truncated_ciphertext() {
        let encrypted = STANDARD.encode(&[0u8; 20]);

        assert!(matches!(
            decrypt_url(KEY, &encrypted),
            Err(ResolutionCause::Decryption(_))
        ));
        assert!(matches!(
            decrypt_url(KEY, "not base64!"),
            Err(ResolutionCause::Base64(_))
        ));
    }
}
