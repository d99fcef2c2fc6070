use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::StorageConfig;

/// Reference to an uploaded object: the key to destroy it by and the URL clients fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub public_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Avatar,
    Poster,
    LectureVideo,
}

impl MediaKind {
    pub fn max_bytes(self) -> usize {
        match self {
            MediaKind::Avatar | MediaKind::Poster => 10 * 1024 * 1024,
            MediaKind::LectureVideo => 100 * 1024 * 1024,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            MediaKind::Avatar => "avatars",
            MediaKind::Poster => "posters",
            MediaKind::LectureVideo => "lectures",
        }
    }

    pub fn accepts(self, content_type: &str) -> bool {
        match self {
            MediaKind::Avatar | MediaKind::Poster => content_type.starts_with("image/"),
            MediaKind::LectureVideo => content_type.starts_with("video/"),
        }
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, kind: MediaKind, body: Bytes, content_type: &str) -> anyhow::Result<MediaRef>;
    async fn destroy(&self, public_id: &str) -> anyhow::Result<()>;
}

pub fn object_key(kind: MediaKind, id: Uuid, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("{}/{}.{}", kind.prefix(), id, ext)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "video/quicktime" => Some("mov"),
        _ => None,
    }
}

#[derive(Clone)]
pub struct S3MediaStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3MediaStore {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_base_url: cfg.public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn upload(&self, kind: MediaKind, body: Bytes, content_type: &str) -> anyhow::Result<MediaRef> {
        anyhow::ensure!(
            body.len() <= kind.max_bytes(),
            "{:?} exceeds {} bytes",
            kind,
            kind.max_bytes()
        );
        let key = object_key(kind, Uuid::new_v4(), content_type);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {}", key))?;
        tracing::debug!(%key, "media uploaded");
        Ok(MediaRef {
            url: format!("{}/{}", self.public_base_url, key),
            public_id: key,
        })
    }

    async fn destroy(&self, public_id: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(public_id)
            .send()
            .await
            .with_context(|| format!("s3 delete_object {}", public_id))?;
        tracing::debug!(key = %public_id, "media destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("video/mp4"), Some("mp4"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn object_keys_are_grouped_by_kind() {
        let id = Uuid::nil();
        assert_eq!(
            object_key(MediaKind::LectureVideo, id, "video/mp4"),
            format!("lectures/{}.mp4", id)
        );
        assert_eq!(object_key(MediaKind::Avatar, id, "text/plain"), format!("avatars/{}.bin", id));
    }

    #[test]
    fn video_ceiling_is_100mb() {
        assert_eq!(MediaKind::LectureVideo.max_bytes(), 100 * 1024 * 1024);
        assert!(MediaKind::Poster.max_bytes() < MediaKind::LectureVideo.max_bytes());
        assert!(MediaKind::LectureVideo.accepts("video/mp4"));
        assert!(!MediaKind::Avatar.accepts("video/mp4"));
    }
}
