use crate::tts::{SpeechAudio, SpeechSynthesizer, SynthesisError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const PRIMARY_COOLDOWN: Duration = Duration::from_secs(300);
const LOG_TARGET: &str = "tts::fallback";

/// Cloud voice first, local voice when it cannot answer.
///
/// A quota failure parks the primary for a cooldown ([`PRIMARY_COOLDOWN`] by
/// default); any other primary failure is served locally for that sentence
/// only.
#[derive(Clone)]
pub struct FallbackSynthesizer<P, L> {
    primary: P,
    local: L,
    cooldown: Duration,
    state: Arc<CooldownState>,
}

struct CooldownState {
    parked: AtomicBool,
    parked_at: Mutex<Option<Instant>>,
}

impl<P, L> FallbackSynthesizer<P, L>
where
    P: SpeechSynthesizer,
    L: SpeechSynthesizer,
{
    pub fn new(primary: P, local: L) -> Self {
        Self {
            primary,
            local,
            cooldown: PRIMARY_COOLDOWN,
            state: Arc::new(CooldownState {
                parked: AtomicBool::new(false),
                parked_at: Mutex::new(None),
            }),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn is_using_local(&self) -> bool {
        self.state.parked.load(Ordering::Relaxed)
    }

    pub async fn reset(&self) {
        self.state.parked.store(false, Ordering::Relaxed);
        *self.state.parked_at.lock().await = None;
    }

    async fn park_primary(&self) {
        self.state.parked.store(true, Ordering::Relaxed);
        *self.state.parked_at.lock().await = Some(Instant::now());
    }

    async fn cooldown_elapsed(&self) -> bool {
        let parked_at = *self.state.parked_at.lock().await;
        parked_at.is_some_and(|t| t.elapsed() >= self.cooldown)
    }

    async fn speak(&self, sentence: String) -> Result<SpeechAudio, SynthesisError> {
        let parked = self.is_using_local();
        if parked && !self.cooldown_elapsed().await {
            return self.local.synthesize(sentence).await;
        }
        if parked {
            tracing::info!(target: LOG_TARGET, "cooldown over, trying primary voice again");
        }

        match self.primary.synthesize(sentence.clone()).await {
            Ok(audio) => {
                if parked {
                    self.reset().await;
                    tracing::info!(target: LOG_TARGET, "primary voice recovered");
                }
                Ok(audio)
            }
            Err(SynthesisError::QuotaExhausted) => {
                tracing::warn!(target: LOG_TARGET, cooldown = ?self.cooldown, "primary quota exhausted, switching to local voice");
                self.park_primary().await;
                self.local.synthesize(sentence).await
            }
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "primary voice failed, using local voice for this sentence");
                self.local.synthesize(sentence).await
            }
        }
    }
}

impl<P, L> SpeechSynthesizer for FallbackSynthesizer<P, L>
where
    P: SpeechSynthesizer,
    L: SpeechSynthesizer,
{
    fn synthesize(&self, sentence: String) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
        self.speak(sentence).boxed()
    }
}
