//! Media access resolution.
//!
//! Public assets resolve to a deterministic path under the public media
//! base. Signed assets get a short-lived URL whose token comes from a
//! [`Signer`]; issued tokens are cached in a [`TokenCache`] and never
//! reused past expiry.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use artnode_schema::{Diagnostic, Payload};
use artnode_storage::{Storage, join_path};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::timeout::{Abandoned, run_with_timeout};

/// Unreserved URL characters: A-Z a-z 0-9 - . _ ~
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Seconds since the Unix epoch.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Media URL settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSettings {
    /// Base path of public media URLs.
    pub public_base: String,
    /// Base path of signed media URLs.
    pub signed_base: String,
    /// Lifetime of signed URLs.
    pub ttl: Duration,
    /// Deadline for a single signing call.
    pub sign_timeout: Duration,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            public_base: "/media".to_owned(),
            signed_base: "/media/signed".to_owned(),
            ttl: Duration::from_secs(3600),
            sign_timeout: Duration::from_secs(2),
        }
    }
}

/// Access policy of a media asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[default]
    Public,
    Signed,
}

/// How a consumer reaches a media asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessDescriptor {
    /// Asset path relative to its node, or the remote URL.
    pub path: String,
    pub content_type: String,
    pub access: Access,
    pub url: String,
    /// Unix timestamp after which a signed URL stops working.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// A token issued by a [`Signer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedToken {
    pub token: String,
    /// Unix timestamp of expiry.
    pub expires_at: u64,
}

/// Error reported by a [`Signer`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SignError(pub String);

/// Issues access tokens for protected assets.
///
/// Verification is not part of this contract.
pub trait Signer: Send + Sync {
    /// Issue a token for `path` valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`SignError`] if no token can be issued.
    fn sign(&self, path: &str, ttl: Duration) -> Result<SignedToken, SignError>;
}

/// Keyed SHA-256 signer.
///
/// The token is `hex(sha256(secret \n path \n expires_at))`, which a
/// verifier holding the same secret can recompute.
pub struct Sha256Signer {
    secret: String,
}

impl Sha256Signer {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Token for `path` expiring at `expires_at`.
    #[must_use]
    pub fn token(&self, path: &str, expires_at: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires_at.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl Signer for Sha256Signer {
    fn sign(&self, path: &str, ttl: Duration) -> Result<SignedToken, SignError> {
        if ttl.is_zero() {
            return Err(SignError("ttl must be positive".to_owned()));
        }
        let expires_at = unix_now() + ttl.as_secs();
        Ok(SignedToken {
            token: self.token(path, expires_at),
            expires_at,
        })
    }
}

/// Issued tokens by asset path.
///
/// A token is handed out again only while at least half of `ttl` remains,
/// so rebuilds within that window produce identical URLs.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: Mutex<HashMap<String, SignedToken>>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn get(&self, path: &str, now: u64, ttl: Duration) -> Option<SignedToken> {
        let min_remaining = ttl.as_secs() / 2;
        self.tokens
            .lock()
            .unwrap()
            .get(path)
            .filter(|t| t.expires_at > now && t.expires_at - now >= min_remaining)
            .cloned()
    }

    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn insert(&self, path: impl Into<String>, token: SignedToken) {
        self.tokens.lock().unwrap().insert(path.into(), token);
    }

    /// Drop every token that expired before `now`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn purge(&self, now: u64) {
        self.tokens.lock().unwrap().retain(|_, t| t.expires_at > now);
    }
}

/// A media reference declared in a node's `media` list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRef {
    pub path: String,
    pub access: Access,
    pub content_type: Option<String>,
}

impl MediaRef {
    /// Parse a `media` item: a bare path or `{path, access, type}`.
    ///
    /// # Errors
    ///
    /// Returns a message if the item has no path or an unknown access policy.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        if let Some(path) = value.as_str() {
            return Ok(Self {
                path: normalize_media_path(path),
                access: Access::Public,
                content_type: None,
            });
        }
        let path = value
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| "media item has no 'path'".to_owned())?;
        let access = match value.get("access").and_then(Value::as_str) {
            None | Some("public") => Access::Public,
            Some("signed") => Access::Signed,
            Some(other) => return Err(format!("unknown access policy '{other}'")),
        };
        Ok(Self {
            path: normalize_media_path(path),
            access,
            content_type: value.get("type").and_then(Value::as_str).map(str::to_owned),
        })
    }

    fn is_remote(&self) -> bool {
        is_remote(&self.path)
    }
}

fn is_remote(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Normalize a local media path: forward slashes, no leading `./` or `/`.
pub(crate) fn normalize_media_path(path: &str) -> String {
    let path = path.trim();
    if is_remote(path) {
        return path.to_owned();
    }
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn guess_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}

/// Media of one node after resolution.
#[derive(Debug, Default)]
pub(crate) struct ResolvedMedia {
    pub assets: Vec<AccessDescriptor>,
    pub background: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolves media references of nodes.
pub(crate) struct MediaResolver<'a> {
    pub settings: &'a MediaSettings,
    pub signer: Option<&'a Arc<dyn Signer>>,
    pub tokens: &'a TokenCache,
    pub storage: &'a dyn Storage,
    /// Build start, Unix seconds.
    pub now: u64,
}

impl MediaResolver<'_> {
    /// Resolve the declared and discovered media of the node at `id`.
    ///
    /// `files` are the media files found in the node's directory; those not
    /// declared are published as public assets.
    pub fn resolve(&self, id: &str, payload: &Payload, files: &[String]) -> ResolvedMedia {
        let mut resolved = ResolvedMedia::default();
        let mut declared = BTreeSet::new();

        let items = payload
            .get("media")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice);
        for (i, item) in items.iter().enumerate() {
            let media = match MediaRef::from_value(item) {
                Ok(media) => media,
                Err(message) => {
                    resolved.diagnostics.push(Diagnostic::reference(
                        id,
                        "media.invalid",
                        format!("media[{i}]: {message}"),
                    ));
                    continue;
                }
            };
            declared.insert(media.path.clone());
            match self.resolve_asset(id, &media) {
                Ok(asset) => resolved.assets.push(asset),
                Err(diagnostic) => resolved.diagnostics.push(diagnostic),
            }
        }

        if let Some(background) = payload.str_field("background") {
            let media = MediaRef {
                path: normalize_media_path(background),
                access: Access::Public,
                content_type: None,
            };
            declared.insert(media.path.clone());
            match self.resolve_asset(id, &media) {
                Ok(asset) => resolved.background = Some(asset.url),
                Err(diagnostic) => resolved.diagnostics.push(diagnostic),
            }
        }

        for file in files.iter().filter(|f| !declared.contains(*f)) {
            resolved.assets.push(self.public(id, file, None));
        }
        resolved
    }

    /// Resolve a single asset reference of the node at `node_path`.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic if the local file is missing or signing failed.
    pub fn resolve_asset(
        &self,
        node_path: &str,
        media: &MediaRef,
    ) -> Result<AccessDescriptor, Diagnostic> {
        if media.is_remote() {
            return Ok(AccessDescriptor {
                path: media.path.clone(),
                content_type: media
                    .content_type
                    .clone()
                    .unwrap_or_else(|| guess_type(&media.path)),
                access: Access::Public,
                url: media.path.clone(),
                expires_at: None,
            });
        }

        let full = join_path(node_path, &media.path);
        if media.path.is_empty() || !self.storage.exists(&full) {
            return Err(Diagnostic::reference(
                node_path,
                "media.missing",
                format!("media file '{}' does not exist", media.path),
            ));
        }

        match media.access {
            Access::Public => Ok(self.public(node_path, &media.path, media.content_type.clone())),
            Access::Signed => self.signed(node_path, media, &full),
        }
    }

    fn public(&self, node_path: &str, file: &str, content_type: Option<String>) -> AccessDescriptor {
        let full = join_path(node_path, file);
        AccessDescriptor {
            path: file.to_owned(),
            content_type: content_type.unwrap_or_else(|| guess_type(file)),
            access: Access::Public,
            url: format!(
                "{}/{}",
                self.settings.public_base.trim_end_matches('/'),
                encode_path(&full)
            ),
            expires_at: None,
        }
    }

    fn signed(
        &self,
        node_path: &str,
        media: &MediaRef,
        full: &str,
    ) -> Result<AccessDescriptor, Diagnostic> {
        let token = self.token(full).map_err(|message| {
            tracing::warn!(path = full, %message, "Signing failed");
            Diagnostic::resource(
                node_path,
                "media.sign",
                format!("cannot sign '{}': {message}; asset omitted", media.path),
            )
        })?;
        Ok(AccessDescriptor {
            path: media.path.clone(),
            content_type: media
                .content_type
                .clone()
                .unwrap_or_else(|| guess_type(&media.path)),
            access: Access::Signed,
            url: format!(
                "{}/{}?token={}&expires={}",
                self.settings.signed_base.trim_end_matches('/'),
                encode_path(full),
                utf8_percent_encode(&token.token, SEGMENT_ENCODE_SET),
                token.expires_at
            ),
            expires_at: Some(token.expires_at),
        })
    }

    fn token(&self, full: &str) -> Result<SignedToken, String> {
        let ttl = self.settings.ttl;
        if let Some(token) = self.tokens.get(full, self.now, ttl) {
            return Ok(token);
        }
        let Some(signer) = self.signer else {
            return Err("no signer configured".to_owned());
        };

        let signer = Arc::clone(signer);
        let path = full.to_owned();
        let token = match run_with_timeout(self.settings.sign_timeout, move || {
            signer.sign(&path, ttl)
        }) {
            Ok(Ok(token)) => token,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(Abandoned::Panicked) => return Err("signer panicked".to_owned()),
            Err(Abandoned::TimedOut) => {
                return Err(format!(
                    "signer did not answer within {} ms",
                    self.settings.sign_timeout.as_millis()
                ));
            }
        };
        if token.expires_at <= self.now {
            return Err("signer returned an expired token".to_owned());
        }
        self.tokens.insert(full, token.clone());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use artnode_schema::{ErrorClass, parse_document};
    use artnode_storage::MockStorage;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    struct SlowSigner;

    impl Signer for SlowSigner {
        fn sign(&self, _path: &str, _ttl: Duration) -> Result<SignedToken, SignError> {
            thread::sleep(Duration::from_millis(500));
            Err(SignError("too late".to_owned()))
        }
    }

    struct FailingSigner;

    impl Signer for FailingSigner {
        fn sign(&self, _path: &str, _ttl: Duration) -> Result<SignedToken, SignError> {
            Err(SignError("key revoked".to_owned()))
        }
    }

    fn storage() -> MockStorage {
        MockStorage::new()
            .with_file("artists/zol/cover.jpg", "")
            .with_file("artists/zol/bg.png", "")
            .with_file("artists/zol/audio/demo one.mp3", "")
            .with_file("artists/zol/notes.txt", "")
    }

    fn payload(yaml: &str) -> Payload {
        Payload::new(parse_document(yaml).unwrap())
    }

    fn resolver<'a>(
        storage: &'a MockStorage,
        settings: &'a MediaSettings,
        signer: Option<&'a Arc<dyn Signer>>,
        tokens: &'a TokenCache,
    ) -> MediaResolver<'a> {
        MediaResolver {
            settings,
            signer,
            tokens,
            storage,
            now: unix_now(),
        }
    }

    #[test]
    fn test_public_declared_and_discovered() {
        let storage = storage();
        let settings = MediaSettings::default();
        let tokens = TokenCache::new();
        let resolver = resolver(&storage, &settings, None, &tokens);

        let media = resolver.resolve(
            "artists/zol",
            &payload("media:\n  - cover.jpg\n  - path: https://cdn.example.com/x.mp4\nbackground: ./bg.png"),
            &["bg.png".to_owned(), "cover.jpg".to_owned(), "notes.txt".to_owned()],
        );

        assert!(media.diagnostics.is_empty());
        let urls: Vec<&str> = media.assets.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "/media/artists/zol/cover.jpg",
                "https://cdn.example.com/x.mp4",
                "/media/artists/zol/notes.txt",
            ]
        );
        assert_eq!(media.assets[0].content_type, "image/jpeg");
        assert_eq!(media.assets[1].content_type, "video/mp4");
        assert_eq!(media.background.as_deref(), Some("/media/artists/zol/bg.png"));
    }

    #[test]
    fn test_missing_declared_file() {
        let storage = storage();
        let settings = MediaSettings::default();
        let tokens = TokenCache::new();
        let resolver = resolver(&storage, &settings, None, &tokens);

        let media = resolver.resolve("artists/zol", &payload("media: [gone.jpg]"), &[]);

        assert!(media.assets.is_empty());
        assert_eq!(media.diagnostics[0].rule, "media.missing");
        assert_eq!(media.diagnostics[0].class, ErrorClass::Reference);
    }

    #[test]
    fn test_signed_asset_encoded_and_expiring() {
        let storage = storage();
        let settings = MediaSettings::default();
        let tokens = TokenCache::new();
        let signer: Arc<dyn Signer> = Arc::new(Sha256Signer::new("s3cret"));
        let resolver = resolver(&storage, &settings, Some(&signer), &tokens);
        let media = MediaRef::from_value(&json!({"path": "audio\\demo one.mp3", "access": "signed"}))
            .unwrap();

        let asset = resolver.resolve_asset("artists/zol", &media).unwrap();

        assert_eq!(asset.access, Access::Signed);
        assert_eq!(asset.path, "audio/demo one.mp3");
        assert_eq!(asset.content_type, "audio/mpeg");
        let expires = asset.expires_at.unwrap();
        assert!(expires > resolver.now);
        assert!(expires <= resolver.now + 3600 + 5);
        assert!(
            asset
                .url
                .starts_with("/media/signed/artists/zol/audio/demo%20one.mp3?token=")
        );
        assert!(asset.url.ends_with(&format!("&expires={expires}")));
    }

    #[test]
    fn test_token_reused_within_half_ttl() {
        let storage = storage();
        let settings = MediaSettings::default();
        let tokens = TokenCache::new();
        let signer: Arc<dyn Signer> = Arc::new(Sha256Signer::new("s3cret"));
        let media = MediaRef::from_value(&json!({"path": "cover.jpg", "access": "signed"})).unwrap();

        let first = resolver(&storage, &settings, Some(&signer), &tokens)
            .resolve_asset("artists/zol", &media)
            .unwrap();
        let second = resolver(&storage, &settings, Some(&signer), &tokens)
            .resolve_asset("artists/zol", &media)
            .unwrap();

        assert_eq!(first.url, second.url);
    }

    #[test]
    fn test_token_cache_never_reuses_past_expiry() {
        let tokens = TokenCache::new();
        let ttl = Duration::from_secs(100);
        tokens.insert(
            "a",
            SignedToken {
                token: "t".to_owned(),
                expires_at: 1_000,
            },
        );

        assert!(tokens.get("a", 900, ttl).is_some());
        assert!(tokens.get("a", 960, ttl).is_none());
        assert!(tokens.get("a", 1_000, ttl).is_none());

        tokens.purge(1_000);
        assert!(tokens.get("a", 0, ttl).is_none());
    }

    #[test]
    fn test_sign_timeout_degrades() {
        let storage = storage();
        let settings = MediaSettings {
            sign_timeout: Duration::from_millis(20),
            ..MediaSettings::default()
        };
        let tokens = TokenCache::new();
        let signer: Arc<dyn Signer> = Arc::new(SlowSigner);
        let resolver = resolver(&storage, &settings, Some(&signer), &tokens);

        let media = resolver.resolve(
            "artists/zol",
            &payload("media:\n  - path: cover.jpg\n    access: signed\n"),
            &[],
        );

        assert!(media.assets.is_empty());
        assert_eq!(media.diagnostics[0].rule, "media.sign");
        assert_eq!(media.diagnostics[0].class, ErrorClass::Resource);
    }

    #[test]
    fn test_sign_failure_and_missing_signer() {
        let storage = storage();
        let settings = MediaSettings::default();
        let tokens = TokenCache::new();
        let signer: Arc<dyn Signer> = Arc::new(FailingSigner);
        let media = MediaRef::from_value(&json!({"path": "cover.jpg", "access": "signed"})).unwrap();

        let err = resolver(&storage, &settings, Some(&signer), &tokens)
            .resolve_asset("artists/zol", &media)
            .unwrap_err();
        assert!(err.message.contains("key revoked"));

        let err = resolver(&storage, &settings, None, &tokens)
            .resolve_asset("artists/zol", &media)
            .unwrap_err();
        assert!(err.message.contains("no signer"));
    }

    struct PanickingSigner;

    impl Signer for PanickingSigner {
        fn sign(&self, path: &str, _ttl: Duration) -> Result<SignedToken, SignError> {
            panic!("signing backend crashed on {path}");
        }
    }

    #[test]
    fn test_panicking_signer_is_not_a_timeout() {
        let storage = storage();
        let settings = MediaSettings::default();
        let tokens = TokenCache::new();
        let signer: Arc<dyn Signer> = Arc::new(PanickingSigner);
        let media = MediaRef::from_value(&json!({"path": "cover.jpg", "access": "signed"})).unwrap();

        let err = resolver(&storage, &settings, Some(&signer), &tokens)
            .resolve_asset("artists/zol", &media)
            .unwrap_err();

        assert!(err.message.contains("signer panicked"), "{}", err.message);
        assert!(!err.message.contains("did not answer"));
    }

    #[test]
    fn test_media_ref_parsing() {
        assert!(MediaRef::from_value(&json!({"access": "signed"})).is_err());
        assert!(MediaRef::from_value(&json!({"path": "a.jpg", "access": "secret"})).is_err());
        assert_eq!(normalize_media_path("./img\\a.jpg"), "img/a.jpg");
        assert_eq!(normalize_media_path("/a.jpg"), "a.jpg");
    }

    #[test]
    fn test_sha256_signer_is_keyed() {
        let a = Sha256Signer::new("one").token("x", 10);
        let b = Sha256Signer::new("two").token("x", 10);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
