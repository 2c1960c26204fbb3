//! Decoder-bearing audio resources
//!
//! An [`AudioResource`] is the unit the pool registry owns. It carries the
//! file identity and, once loaded, the decoder whose ring buffer feeds a
//! voice. Sounds refer to it weakly; the registry holds the strong `Arc`.

use crate::audio::decoder::SourceHandle;
use crate::audio::{sniff_reader, ChunkRingBuffer, Decoder, FileType};
use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use polyvox_common::events::LoadState;
use polyvox_common::{MediaKind, ResourceId};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AudioResource {
    id: ResourceId,
    path: PathBuf,
    kind: MediaKind,
    load_state: Mutex<LoadState>,
    decoder: Mutex<Option<Decoder>>,
}

impl AudioResource {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self::with_id(ResourceId::new(), path, kind)
    }

    pub fn with_id(id: ResourceId, path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            id,
            path: path.into(),
            kind,
            load_state: Mutex::new(LoadState::Declared),
            decoder: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state.lock().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.load_state.lock().is_ready()
    }

    /// Open the file at `path` and load it.
    ///
    /// # Errors
    /// I/O, format and decode failures. The resource ends up `Failed` with no
    /// decoder attached.
    pub fn load(&self, config: &DecoderConfig) -> Result<()> {
        self.set_state(LoadState::Loading);
        let result = File::open(&self.path)
            .map_err(Error::from)
            .and_then(|file| self.load_handle(BufReader::new(file), config));
        self.finish_load(result)
    }

    /// Load from an already-open handle instead of the stored path
    pub fn load_from_reader<R>(&self, reader: R, config: &DecoderConfig) -> Result<()>
    where
        R: Read + Seek + Send + Sync + 'static,
    {
        self.set_state(LoadState::Loading);
        let result = self.load_handle(reader, config);
        self.finish_load(result)
    }

    fn load_handle<R>(&self, mut reader: R, config: &DecoderConfig) -> Result<()>
    where
        R: Read + Seek + Send + Sync + 'static,
    {
        let file_type = sniff_reader(&mut reader)?;
        if file_type == FileType::Invalid {
            return Err(Error::Format(format!(
                "Unrecognized audio format: {}",
                self.path.display()
            )));
        }

        let mut decoder = Decoder::new(file_type, *config);
        let handle: Box<dyn SourceHandle> = Box::new(reader);
        decoder.load(handle)?;
        *self.decoder.lock() = Some(decoder);
        Ok(())
    }

    fn finish_load(&self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                debug!(resource = %self.id, path = %self.path.display(), "Resource ready");
                self.set_state(LoadState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!(resource = %self.id, path = %self.path.display(), "Load failed: {}", e);
                *self.decoder.lock() = None;
                self.set_state(LoadState::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn set_state(&self, state: LoadState) {
        *self.load_state.lock() = state;
    }

    /// Run `f` against the decoder, if one is loaded
    pub fn with_decoder<R>(&self, f: impl FnOnce(&mut Decoder) -> R) -> Option<R> {
        self.decoder.lock().as_mut().map(f)
    }

    pub fn ring(&self) -> Option<Arc<ChunkRingBuffer>> {
        self.decoder.lock().as_ref().map(Decoder::ring)
    }

    pub fn is_static(&self) -> bool {
        self.decoder.lock().as_ref().is_some_and(Decoder::is_static)
    }

    pub fn file_type(&self) -> FileType {
        self.decoder
            .lock()
            .as_ref()
            .map(Decoder::file_type)
            .unwrap_or_default()
    }

    /// Drop the decoder and return to `Declared`
    pub fn unload(&self) {
        *self.decoder.lock() = None;
        self.set_state(LoadState::Declared);
    }
}

impl std::fmt::Debug for AudioResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioResource")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("load_state", &*self.load_state.lock())
            .finish()
    }
}
