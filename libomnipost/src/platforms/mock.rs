//! Mock publisher for testing
//!
//! Available in all builds so integration tests (and other crates' tests)
//! can drive the full dispatch path without any network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::platforms::{MediaHandle, Publisher};
use crate::types::{ConnectedAccount, Media, MediaKind, PlatformId};

/// What a mock saw at publish time.
#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub owner_id: String,
    pub access_token: String,
    pub text: String,
    pub media_count: usize,
}

pub struct MockPublisher {
    platform: PlatformId,
    image_support: bool,
    video_support: bool,
    /// Errors to return from publish, consumed front to back.
    scripted_failures: Mutex<Vec<PlatformError>>,
    posts: Mutex<Vec<RecordedPost>>,
    upload_calls: AtomicUsize,
    publish_calls: AtomicUsize,
}

impl MockPublisher {
    pub fn new(platform: PlatformId) -> Self {
        Self {
            platform,
            image_support: true,
            video_support: true,
            scripted_failures: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
            upload_calls: AtomicUsize::new(0),
            publish_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_image_support(mut self) -> Self {
        self.image_support = false;
        self
    }

    pub fn without_video_support(mut self) -> Self {
        self.video_support = false;
        self
    }

    /// Queue an error for the next publish call; later calls succeed once
    /// the queue drains.
    pub fn fail_next(self, error: PlatformError) -> Self {
        self.scripted_failures.lock().unwrap().push(error);
        self
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.lock().unwrap().clone()
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn id(&self) -> PlatformId {
        self.platform
    }

    fn supports(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Image => self.image_support,
            MediaKind::Video => self.video_support,
        }
    }

    async fn upload_media(
        &self,
        _account: &ConnectedAccount,
        media: &Media,
    ) -> Result<MediaHandle, PlatformError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MediaHandle::Provider(format!("mock-media-{}", media.id)))
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        text: &str,
        media: &[MediaHandle],
    ) -> Result<String, PlatformError> {
        let call = self.publish_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = self.scripted_failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }

        self.posts.lock().unwrap().push(RecordedPost {
            owner_id: account.owner_id.clone(),
            access_token: account.access_token.clone(),
            text: text.to_string(),
            media_count: media.len(),
        });

        Ok(format!("{}-post-{}", self.platform, call))
    }
}
