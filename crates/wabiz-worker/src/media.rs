use wabiz_graph::MediaInfo;

use crate::error::{Result, WorkerError};
use crate::worker::WabizWorker;

const MB: usize = 1024 * 1024;

/// Largest upload accepted for any type, the provider's document limit.
pub const MAX_MEDIA_BYTES: usize = 100 * MB;

/// Upload limit the provider enforces for a mime type.
pub fn media_size_limit(mime_type: &str) -> usize {
    let mime = mime_type.trim().to_ascii_lowercase();
    match mime.split_once('/') {
        Some(("image", "webp")) => 500 * 1024,
        Some(("image", _)) => 5 * MB,
        Some(("audio" | "video", _)) => 16 * MB,
        _ => MAX_MEDIA_BYTES,
    }
}

impl WabizWorker {
    /// Uploads a file to the provider and returns its media id.
    pub async fn upload_media(
        &self,
        user_id: &str,
        account_id: Option<&str>,
        bytes: Vec<u8>,
        mime_type: &str,
        filename: Option<&str>,
    ) -> Result<String> {
        if bytes.is_empty() {
            return Err(WorkerError::Validation("Media file is empty".into()));
        }
        if !mime_type.contains('/') {
            return Err(WorkerError::Validation(format!("Invalid mime type: {mime_type}")));
        }
        let limit = media_size_limit(mime_type);
        if bytes.len() > limit {
            return Err(WorkerError::Validation(format!(
                "{mime_type} files are limited to {} KB, got {} KB",
                limit / 1024,
                bytes.len().div_ceil(1024)
            )));
        }

        let account = self.sending_account(user_id, account_id).await?;
        let size = bytes.len();
        let media_id = self
            .provider
            .upload_media(&self.credentials(&account)?, bytes, mime_type, filename)
            .await?;

        tracing::info!(account_id = %account.id, %media_id, size, mime_type, "Media uploaded");
        Ok(media_id)
    }

    pub async fn media_url(&self, user_id: &str, account_id: Option<&str>, media_id: &str) -> Result<MediaInfo> {
        let account = self.sending_account(user_id, account_id).await?;
        Ok(self.provider.media_url(&self.credentials(&account)?, media_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn uploads_through_default_account() {
        let h = harness().await;
        let id = h
            .worker
            .upload_media("u1", None, b"%PDF-1.4".to_vec(), "application/pdf", Some("a.pdf"))
            .await
            .unwrap();
        assert_eq!(id, "media-1");

        let info = h.worker.media_url("u1", None, &id).await.unwrap();
        assert_eq!(info.id, "media-1");
    }

    #[tokio::test]
    async fn rejects_empty_upload() {
        let h = harness().await;
        let err = h
            .worker
            .upload_media("u1", None, Vec::new(), "image/png", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));
    }

    #[test]
    fn limits_follow_the_media_type() {
        assert_eq!(media_size_limit("image/jpeg"), 5 * MB);
        assert_eq!(media_size_limit("image/webp"), 500 * 1024);
        assert_eq!(media_size_limit("video/mp4"), 16 * MB);
        assert_eq!(media_size_limit("Audio/OGG"), 16 * MB);
        assert_eq!(media_size_limit("application/pdf"), MAX_MEDIA_BYTES);
    }

    #[tokio::test]
    async fn oversized_image_is_rejected_but_document_is_not() {
        let h = harness().await;
        let six_mb = vec![0u8; 6 * MB];

        let err = h
            .worker
            .upload_media("u1", None, six_mb.clone(), "image/png", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Validation(ref m) if m.contains("limited to 5120 KB")));

        let id = h
            .worker
            .upload_media("u1", None, six_mb, "application/pdf", Some("big.pdf"))
            .await
            .unwrap();
        assert_eq!(id, "media-1");
    }
}
