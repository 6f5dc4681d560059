//! Message converter port.
//!
//! Notification deliveries may transform the payload with a per-observer
//! script. The engine and fan-out depend only on this port; the actual
//! interpreter (a sandboxed scripting engine in full deployments) is
//! supplied by the embedding application. Conversions are fallible and
//! carry no enforced timeout: a hanging script blocks that single
//! notification delivery, never the primary forwarding path.

use async_trait::async_trait;
use bytes::Bytes;
use mov_core::{Error, Result};

/// Port for script-based payload transforms.
#[async_trait]
pub trait MessageConverter: Send + Sync {
    /// Transform `payload` with the given script.
    ///
    /// # Errors
    /// Returns a conversion error if the script fails; the caller skips
    /// the affected delivery only.
    async fn convert(&self, payload: &[u8], code: &str) -> Result<Bytes>;
}

/// Converter that rejects every script.
///
/// The default for deployments without a scripting engine: notifications
/// without a converter still deliver unchanged, notifications with one
/// fail loudly instead of silently passing the payload through.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedConverter;

#[async_trait]
impl MessageConverter for UnsupportedConverter {
    async fn convert(&self, _payload: &[u8], _code: &str) -> Result<Bytes> {
        Err(Error::conversion("no converter engine is configured"))
    }
}

/// Converter backed by a plain closure, for tests and embedding.
pub struct FnConverter<F>(F);

impl<F> FnConverter<F>
where
    F: Fn(&[u8], &str) -> Result<Bytes> + Send + Sync,
{
    /// Wrap a conversion closure.
    pub fn new(convert: F) -> Self {
        Self(convert)
    }
}

#[async_trait]
impl<F> MessageConverter for FnConverter<F>
where
    F: Fn(&[u8], &str) -> Result<Bytes> + Send + Sync,
{
    async fn convert(&self, payload: &[u8], code: &str) -> Result<Bytes> {
        (self.0)(payload, code)
    }
}
