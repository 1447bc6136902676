use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use formats::geojson::FeatureCollection;
use formats::payload::{PayloadDecoder, PayloadError};
use futures_util::future::{AbortHandle, Abortable, LocalBoxFuture};
use tracing::debug;

#[derive(Debug)]
pub enum FetchError {
    /// A newer request for the same URL replaced this one.
    Aborted,
    Transport(String),
    Status(u16),
    Decode(PayloadError),
}

impl FetchError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, FetchError::Aborted)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Aborted => write!(f, "request superseded"),
            FetchError::Transport(msg) => write!(f, "transport error: {msg}"),
            FetchError::Status(code) => write!(f, "unexpected HTTP status {code}"),
            FetchError::Decode(e) => write!(f, "decode failed: {e}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

/// Byte source behind the coordinator.
///
/// Futures are `!Send`; everything runs on one cooperative thread.
pub trait Transport {
    fn get(&self, url: &str) -> LocalBoxFuture<'_, Result<Vec<u8>, FetchError>>;
}

struct InFlight {
    id: u64,
    handle: AbortHandle,
}

/// Issues dataset requests with last-caller-wins semantics per URL.
///
/// A second request for a URL aborts the one still in flight; the earlier
/// caller sees [`FetchError::Aborted`]. Nothing is retried.
pub struct FetchCoordinator {
    transport: Box<dyn Transport>,
    decoder: PayloadDecoder,
    next_id: Cell<u64>,
    inflight: RefCell<HashMap<String, InFlight>>,
}

impl FetchCoordinator {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_decoder(transport, PayloadDecoder::default())
    }

    pub fn with_decoder(transport: Box<dyn Transport>, decoder: PayloadDecoder) -> Self {
        Self {
            transport,
            decoder,
            next_id: Cell::new(1),
            inflight: RefCell::new(HashMap::new()),
        }
    }

    pub fn decoder(&self) -> &PayloadDecoder {
        &self.decoder
    }

    pub fn in_flight(&self, url: &str) -> bool {
        self.inflight.borrow().contains_key(url)
    }

    pub async fn fetch_dataset(&self, url: &str) -> Result<FeatureCollection, FetchError> {
        let bytes = self.fetch_bytes(url).await?;
        let fc = self.decoder.decode_bytes(&bytes).map_err(FetchError::Decode)?;
        debug!(url, features = fc.len(), "dataset decoded");
        Ok(fc)
    }

    /// Fetches `url` outside the per-URL bookkeeping and drops the body.
    ///
    /// Used for best-effort warming, so it never aborts a foreground request.
    pub async fn prefetch(&self, url: &str) -> Result<(), FetchError> {
        self.transport.get(url).await.map(|_| ())
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let (handle, registration) = AbortHandle::new_pair();
        let previous = self
            .inflight
            .borrow_mut()
            .insert(url.to_string(), InFlight { id, handle });
        if let Some(prev) = previous {
            debug!(url, "aborting superseded fetch");
            prev.handle.abort();
        }

        debug!(url, "fetch issued");
        let outcome = Abortable::new(self.transport.get(url), registration).await;

        {
            let mut inflight = self.inflight.borrow_mut();
            if inflight.get(url).is_some_and(|f| f.id == id) {
                inflight.remove(url);
            }
        }

        match outcome {
            Ok(result) => result,
            Err(_aborted) => Err(FetchError::Aborted),
        }
    }
}
