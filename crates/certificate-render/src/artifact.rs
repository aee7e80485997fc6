//! Rendered artifacts and the single live-artifact slot.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Pdf,
    Png,
    Jpeg,
    Text,
}

impl ArtifactKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Png => "image/png",
            ArtifactKind::Jpeg => "image/jpeg",
            ArtifactKind::Text => "text/plain;charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Png => "png",
            ArtifactKind::Jpeg => "jpg",
            ArtifactKind::Text => "txt",
        }
    }
}

/// A finished, exportable document or image
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
    /// Name of the backend that produced it
    pub backend: String,
}

impl RenderedArtifact {
    pub fn new(kind: ArtifactKind, bytes: Vec<u8>, backend: impl Into<String>) -> Self {
        Self {
            kind,
            bytes,
            backend: backend.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }

    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }
}

impl fmt::Debug for RenderedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedArtifact")
            .field("kind", &self.kind)
            .field("bytes", &self.bytes.len())
            .field("backend", &self.backend)
            .finish()
    }
}

/// Host resource tied to an artifact, such as a browser object URL.
///
/// `release` consumes the handle, so a handle can be released at most once.
pub trait ResourceHandle {
    fn describe(&self) -> String;
    fn release(self: Box<Self>);
}

struct LiveArtifact {
    generation: u64,
    artifact: Arc<RenderedArtifact>,
    handles: Vec<Box<dyn ResourceHandle>>,
}

impl LiveArtifact {
    fn release(self) {
        debug!(
            generation = self.generation,
            handles = self.handles.len(),
            "releasing live artifact"
        );
        for handle in self.handles {
            handle.release();
        }
    }
}

/// Holds at most one live artifact per session.
///
/// Every stored artifact gets a new generation number. Delayed releases
/// name the generation they were scheduled for, so a stale timer can never
/// drop a newer capture.
#[derive(Default)]
pub struct ArtifactSlot {
    generation: u64,
    live: Option<LiveArtifact>,
}

impl ArtifactSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `artifact` the live one, releasing whatever was live before
    pub fn store(&mut self, artifact: RenderedArtifact) -> (u64, Arc<RenderedArtifact>) {
        self.release();
        self.generation += 1;
        let artifact = Arc::new(artifact);
        self.live = Some(LiveArtifact {
            generation: self.generation,
            artifact: Arc::clone(&artifact),
            handles: Vec::new(),
        });
        (self.generation, artifact)
    }

    pub fn current(&self) -> Option<Arc<RenderedArtifact>> {
        self.live.as_ref().map(|live| Arc::clone(&live.artifact))
    }

    pub fn live_generation(&self) -> Option<u64> {
        self.live.as_ref().map(|live| live.generation)
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Tie a handle to the artifact of `generation`.
    ///
    /// A handle created for an artifact that is no longer live is released
    /// on the spot and `false` is returned.
    pub fn attach(&mut self, generation: u64, handle: Box<dyn ResourceHandle>) -> bool {
        match self.live.as_mut() {
            Some(live) if live.generation == generation => {
                live.handles.push(handle);
                true
            }
            _ => {
                debug!(generation, handle = %handle.describe(), "releasing handle for stale artifact");
                handle.release();
                false
            }
        }
    }

    /// Release the live artifact, if any
    pub fn release(&mut self) -> bool {
        match self.live.take() {
            Some(live) => {
                live.release();
                true
            }
            None => false,
        }
    }

    /// Release only if `generation` is still the live one
    pub fn release_generation(&mut self, generation: u64) -> bool {
        if self.live_generation() == Some(generation) {
            self.release()
        } else {
            false
        }
    }
}

impl Drop for ArtifactSlot {
    fn drop(&mut self) {
        self.release();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ReleaseLog;
    use super::*;
    use pretty_assertions::assert_eq;

    fn png(tag: u8) -> RenderedArtifact {
        RenderedArtifact::new(ArtifactKind::Png, vec![tag], "test")
    }

    #[test]
    fn test_second_store_releases_first_exactly_once() {
        let log = ReleaseLog::default();
        let mut slot = ArtifactSlot::new();

        let (first, _) = slot.store(png(1));
        assert!(slot.attach(first, log.handle("url-1")));
        let (second, current) = slot.store(png(2));

        assert_eq!(current.bytes, vec![2]);
        assert_eq!(log.released(), vec!["url-1".to_string()]);

        // A late timer for the first capture must not touch the second
        assert!(!slot.release_generation(first));
        assert_eq!(slot.live_generation(), Some(second));
        assert_eq!(log.count("url-1"), 1);
    }

    #[test]
    fn test_stale_handle_released_immediately() {
        let log = ReleaseLog::default();
        let mut slot = ArtifactSlot::new();
        let (first, _) = slot.store(png(1));
        slot.store(png(2));
        assert!(!slot.attach(first, log.handle("late")));
        assert_eq!(log.count("late"), 1);
    }

    #[test]
    fn test_release_generation_and_drop() {
        let log = ReleaseLog::default();
        let mut slot = ArtifactSlot::new();
        let (generation, _) = slot.store(png(1));
        slot.attach(generation, log.handle("a"));
        assert!(slot.release_generation(generation));
        assert!(!slot.release());
        assert!(!slot.is_live());

        let (generation, _) = slot.store(png(2));
        slot.attach(generation, log.handle("b"));
        drop(slot);
        assert_eq!(log.released(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_artifact_metadata() {
        let pdf = RenderedArtifact::new(ArtifactKind::Pdf, b"%PDF".to_vec(), "vector-pdf");
        assert_eq!(pdf.mime_type(), "application/pdf");
        assert_eq!(pdf.extension(), "pdf");
        assert_eq!(pdf.len(), 4);
    }
}
