//! Retry wrapper for embedding encoders.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;

use vitrine_core::{Error, ImageData, Result};

use crate::encoder::EmbeddingEncoder;

/// Wraps an encoder with exponential-backoff retries on retryable errors.
pub struct RetryingEncoder {
    inner: Arc<dyn EmbeddingEncoder>,
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryingEncoder {
    /// Creates a new retry wrapper with default settings.
    ///
    /// Default settings:
    /// - Max retries: 2
    /// - Initial delay: 100 milliseconds
    /// - Max delay: 2 seconds
    pub fn new(encoder: Arc<dyn EmbeddingEncoder>) -> Self {
        Self {
            inner: encoder,
            max_retries: 2,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }

    /// Sets the maximum number of retries after the first attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the initial delay between retries.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
    }

    fn should_retry(error: &Error) -> bool {
        let retry = error.is_retryable();
        if retry {
            log::debug!("Retrying encoder call after: {error}");
        }
        retry
    }
}

#[async_trait]
impl EmbeddingEncoder for RetryingEncoder {
    async fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        let encoder = self.inner.clone();
        (|| async { encoder.encode_text(text).await })
            .retry(self.backoff())
            .when(Self::should_retry)
            .await
    }

    async fn encode_image(&self, image: &ImageData) -> Result<Vec<f32>> {
        let encoder = self.inner.clone();
        (|| async { encoder.encode_image(image).await })
            .retry(self.backoff())
            .when(Self::should_retry)
            .await
    }

    async fn encode_text_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let encoder = self.inner.clone();
        (|| async { encoder.encode_text_batch(texts).await })
            .retry(self.backoff())
            .when(Self::should_retry)
            .await
    }

    async fn encode_image_batch(&self, images: &[ImageData]) -> Result<Vec<Vec<f32>>> {
        let encoder = self.inner.clone();
        (|| async { encoder.encode_image_batch(images).await })
            .retry(self.backoff())
            .when(Self::should_retry)
            .await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MockEncoder;

    fn fast(encoder: Arc<dyn EmbeddingEncoder>) -> RetryingEncoder {
        RetryingEncoder::new(encoder)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let mock = Arc::new(MockEncoder::new(4).failing(2));
        let retry = fast(mock.clone());

        let embedding = retry.encode_text("shirt").await.unwrap();
        assert_eq!(embedding.len(), 4);
        assert_eq!(mock.text_calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let mock = Arc::new(MockEncoder::new(4).failing(10));
        let retry = fast(mock.clone()).with_max_retries(1);

        let err = retry
            .encode_image(&ImageData::new(vec![1u8, 2]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EncoderFailure(_)));
        assert_eq!(mock.image_calls(), 2);
    }

    #[test]
    fn test_retry_wrapper_builder() {
        let retry = RetryingEncoder::new(Arc::new(MockEncoder::new(4)))
            .with_max_retries(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(30));

        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
        assert_eq!(retry.dimension(), 4);
        assert_eq!(retry.name(), "mock");
    }
}
