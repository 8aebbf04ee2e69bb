//! Chunked media upload
//!
//! Several providers ingest large media through the same three-step shape:
//! initialize a session, append the bytes in segments, then finalize and
//! wait for asynchronous processing. The transfer itself is expressed as an
//! explicit phase machine with pure transitions, driven by a small async
//! loop over a [`MediaTransport`]. Adapters supply the transport; tests
//! supply fakes.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::PlatformError;
use crate::types::Media;

/// Segment size for append calls.
pub const CHUNK_SIZE: usize = 1024 * 1024;
/// Upper bound on processing status polls before giving up.
pub const MAX_POLLS: u32 = 60;
/// Wait between polls when the provider does not suggest one.
pub const DEFAULT_POLL_WAIT_SECS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

/// Provider-reported processing status after finalize or a poll.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingStatus {
    pub state: ProcessingState,
    /// Provider's suggested wait before the next poll, in seconds.
    pub check_after_secs: Option<u64>,
}

impl ProcessingStatus {
    pub fn succeeded() -> Self {
        Self {
            state: ProcessingState::Succeeded,
            check_after_secs: None,
        }
    }
}

/// The wire operations of one provider's chunked upload API.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Open an upload session, returning the provider's media id.
    async fn initialize(
        &self,
        media: &Media,
        total_bytes: usize,
    ) -> Result<String, PlatformError>;

    async fn append(
        &self,
        media_id: &str,
        segment_index: usize,
        chunk: &[u8],
    ) -> Result<(), PlatformError>;

    async fn finalize(&self, media_id: &str) -> Result<ProcessingStatus, PlatformError>;

    async fn status(&self, media_id: &str) -> Result<ProcessingStatus, PlatformError>;
}

/// Where a transfer currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPhase {
    Appending { media_id: String, next_segment: usize },
    Finalizing { media_id: String },
    Polling { media_id: String, polls: u32 },
    Complete { media_id: String },
}

impl UploadPhase {
    /// Transition after the provider reported processing status, either
    /// from finalize or from a poll.
    pub fn on_status(
        self,
        status: ProcessingStatus,
    ) -> Result<UploadPhase, PlatformError> {
        let (media_id, polls) = match self {
            UploadPhase::Finalizing { media_id } => (media_id, 0),
            UploadPhase::Polling { media_id, polls } => (media_id, polls),
            other => return Ok(other),
        };

        match status.state {
            ProcessingState::Succeeded => Ok(UploadPhase::Complete { media_id }),
            ProcessingState::Failed => Err(PlatformError::MediaProcessingFailed(format!(
                "media {media_id} failed provider-side processing"
            ))),
            ProcessingState::Pending | ProcessingState::InProgress => {
                let polls = polls + 1;
                if polls > MAX_POLLS {
                    Err(PlatformError::MediaProcessingTimeout(format!(
                        "media {media_id} still processing after {MAX_POLLS} polls"
                    )))
                } else {
                    Ok(UploadPhase::Polling { media_id, polls })
                }
            }
        }
    }
}

/// Drives a full upload through a [`MediaTransport`].
pub struct ChunkedUploader {
    chunk_size: usize,
    default_wait: Duration,
}

impl Default for ChunkedUploader {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            default_wait: Duration::from_secs(DEFAULT_POLL_WAIT_SECS),
        }
    }
}

impl ChunkedUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smaller chunks for tests that want multiple segments without
    /// megabytes of fixture data.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            default_wait: Duration::from_secs(DEFAULT_POLL_WAIT_SECS),
        }
    }

    /// Upload `bytes` and wait until the provider finishes processing,
    /// returning the provider media id.
    pub async fn upload(
        &self,
        transport: &dyn MediaTransport,
        media: &Media,
        bytes: &[u8],
    ) -> Result<String, PlatformError> {
        let media_id = transport.initialize(media, bytes.len()).await?;

        for (segment_index, chunk) in bytes.chunks(self.chunk_size).enumerate() {
            transport.append(&media_id, segment_index, chunk).await?;
        }

        let status = transport.finalize(&media_id).await?;
        let mut wait = status
            .check_after_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_wait);
        let mut phase = UploadPhase::Finalizing {
            media_id: media_id.clone(),
        }
        .on_status(status)?;

        while !matches!(phase, UploadPhase::Complete { .. }) {
            tokio::time::sleep(wait).await;
            let status = transport.status(&media_id).await?;
            wait = status
                .check_after_secs
                .map(Duration::from_secs)
                .unwrap_or(self.default_wait);
            phase = phase.on_status(status)?;
        }

        Ok(media_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaKind;
    use std::sync::Mutex;

    fn video() -> Media {
        Media {
            id: "m1".to_string(),
            kind: MediaKind::Video,
            url: "https://cdn.example/clip.mp4".to_string(),
            alt_text: None,
        }
    }

    #[derive(Debug, PartialEq)]
    enum Call {
        Init(usize),
        Append(String, usize, usize),
        Finalize(String),
        Status(String),
    }

    /// Transport that records calls and replays a scripted status sequence.
    struct FakeTransport {
        calls: Mutex<Vec<Call>>,
        finalize_status: ProcessingStatus,
        statuses: Mutex<Vec<ProcessingStatus>>,
    }

    impl FakeTransport {
        fn new(finalize_status: ProcessingStatus, statuses: Vec<ProcessingStatus>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                finalize_status,
                statuses: Mutex::new(statuses),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().drain(..).collect()
        }
    }

    #[async_trait]
    impl MediaTransport for FakeTransport {
        async fn initialize(
            &self,
            _media: &Media,
            total_bytes: usize,
        ) -> Result<String, PlatformError> {
            self.calls.lock().unwrap().push(Call::Init(total_bytes));
            Ok("media-77".to_string())
        }

        async fn append(
            &self,
            media_id: &str,
            segment_index: usize,
            chunk: &[u8],
        ) -> Result<(), PlatformError> {
            self.calls.lock().unwrap().push(Call::Append(
                media_id.to_string(),
                segment_index,
                chunk.len(),
            ));
            Ok(())
        }

        async fn finalize(&self, media_id: &str) -> Result<ProcessingStatus, PlatformError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Finalize(media_id.to_string()));
            Ok(self.finalize_status)
        }

        async fn status(&self, media_id: &str) -> Result<ProcessingStatus, PlatformError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Status(media_id.to_string()));
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.is_empty() {
                Ok(ProcessingStatus {
                    state: ProcessingState::InProgress,
                    check_after_secs: Some(0),
                })
            } else {
                Ok(statuses.remove(0))
            }
        }
    }

    fn pending(check_after_secs: Option<u64>) -> ProcessingStatus {
        ProcessingStatus {
            state: ProcessingState::InProgress,
            check_after_secs,
        }
    }

    #[tokio::test]
    async fn test_segments_are_ordered_and_sized() {
        let transport = FakeTransport::new(ProcessingStatus::succeeded(), vec![]);
        let uploader = ChunkedUploader::with_chunk_size(4);
        let media_id = uploader
            .upload(&transport, &video(), b"0123456789")
            .await
            .unwrap();

        assert_eq!(media_id, "media-77");
        assert_eq!(
            transport.calls(),
            vec![
                Call::Init(10),
                Call::Append("media-77".to_string(), 0, 4),
                Call::Append("media-77".to_string(), 1, 4),
                Call::Append("media-77".to_string(), 2, 2),
                Call::Finalize("media-77".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_succeeded_on_finalize_skips_polling() {
        let transport = FakeTransport::new(ProcessingStatus::succeeded(), vec![]);
        let uploader = ChunkedUploader::with_chunk_size(64);
        uploader.upload(&transport, &video(), b"abc").await.unwrap();

        let calls = transport.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::Status(_))));
    }

    #[tokio::test]
    async fn test_polls_until_succeeded() {
        let transport = FakeTransport::new(
            pending(Some(0)),
            vec![pending(Some(0)), ProcessingStatus::succeeded()],
        );
        let uploader = ChunkedUploader::with_chunk_size(64);
        let media_id = uploader.upload(&transport, &video(), b"abc").await.unwrap();
        assert_eq!(media_id, "media-77");

        let polls = transport
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Status(_)))
            .count();
        assert_eq!(polls, 2);
    }

    #[tokio::test]
    async fn test_failed_finalize_is_terminal_without_polling() {
        let transport = FakeTransport::new(
            ProcessingStatus {
                state: ProcessingState::Failed,
                check_after_secs: None,
            },
            vec![],
        );
        let uploader = ChunkedUploader::with_chunk_size(64);
        let err = uploader
            .upload(&transport, &video(), b"abc")
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::MediaProcessingFailed(_)));
        assert!(!transport
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Status(_))));
    }

    #[tokio::test]
    async fn test_failed_during_polling() {
        let transport = FakeTransport::new(
            pending(Some(0)),
            vec![ProcessingStatus {
                state: ProcessingState::Failed,
                check_after_secs: None,
            }],
        );
        let uploader = ChunkedUploader::with_chunk_size(64);
        let err = uploader
            .upload(&transport, &video(), b"abc")
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::MediaProcessingFailed(_)));
    }

    #[tokio::test]
    async fn test_poll_cap_times_out() {
        // Transport keeps answering InProgress with zero wait forever
        let transport = FakeTransport::new(pending(Some(0)), vec![]);
        let uploader = ChunkedUploader::with_chunk_size(64);
        let err = uploader
            .upload(&transport, &video(), b"abc")
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::MediaProcessingTimeout(_)));

        let polls = transport
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Status(_)))
            .count();
        assert_eq!(polls as u32, MAX_POLLS);
    }

    #[test]
    fn test_phase_transition_pending_increments_polls() {
        let phase = UploadPhase::Finalizing {
            media_id: "m".to_string(),
        };
        let next = phase.on_status(pending(None)).unwrap();
        assert_eq!(
            next,
            UploadPhase::Polling {
                media_id: "m".to_string(),
                polls: 1
            }
        );
    }

    #[test]
    fn test_phase_transition_exhausts_budget() {
        let phase = UploadPhase::Polling {
            media_id: "m".to_string(),
            polls: MAX_POLLS,
        };
        let err = phase.on_status(pending(None)).unwrap_err();
        assert!(matches!(err, PlatformError::MediaProcessingTimeout(_)));
    }
}
