//! Sound emitters
//!
//! An emitter tags the application object that started a sound. Positional
//! attenuation is not modelled; every emitter reports unit gain.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EMITTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(u64);

impl EmitterId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Owner of a playing sound
#[derive(Debug, Clone, PartialEq)]
pub struct Emitter {
    id: EmitterId,
    label: Option<String>,
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            id: EmitterId(NEXT_EMITTER.fetch_add(1, Ordering::Relaxed)),
            label: None,
        }
    }

    /// Emitter with a name for logging
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new()
        }
    }

    pub fn id(&self) -> EmitterId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Distance/direction attenuation; always 1.0
    pub fn positional_gain(&self) -> f32 {
        1.0
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}
