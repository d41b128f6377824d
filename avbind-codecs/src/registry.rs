//! Codec engine registry.

use crate::pcm::PcmEngine;
use crate::rawvideo::RawVideoEngine;
use crate::traits::CodecEngine;
use avbind_core::{CodecError, CodecId, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds a fresh engine instance.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn CodecEngine> + Send + Sync>;

/// Maps codec identifiers to engine factories.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    factories: HashMap<CodecId, EngineFactory>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in pass-through engines.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(CodecId::PcmS16le, || Box::new(PcmEngine::new(CodecId::PcmS16le)));
        registry.register(CodecId::PcmF32le, || Box::new(PcmEngine::new(CodecId::PcmF32le)));
        registry.register(CodecId::RawVideo, || Box::new(RawVideoEngine::new()));
        registry
    }

    /// Register a factory, replacing any previous one for the codec.
    pub fn register<F>(&mut self, id: CodecId, factory: F)
    where
        F: Fn() -> Box<dyn CodecEngine> + Send + Sync + 'static,
    {
        debug!(codec = %id, "registering codec engine");
        self.factories.insert(id, Arc::new(factory));
    }

    /// Build an engine for the codec.
    pub fn create(&self, id: CodecId) -> Result<Box<dyn CodecEngine>> {
        let factory = self
            .factories
            .get(&id)
            .ok_or_else(|| CodecError::NotRegistered(id.name().to_string()))?;
        Ok(factory())
    }

    pub fn contains(&self, id: CodecId) -> bool {
        self.factories.contains_key(&id)
    }

    /// Registered codecs, in no particular order.
    pub fn codecs(&self) -> impl Iterator<Item = CodecId> + '_ {
        self.factories.keys().copied()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avbind_core::Error;

    #[test]
    fn test_builtin_engines() {
        let registry = CodecRegistry::with_builtin();
        assert!(registry.contains(CodecId::RawVideo));
        let engine = registry.create(CodecId::PcmS16le).unwrap();
        assert_eq!(engine.descriptor().id, CodecId::PcmS16le);
    }

    #[test]
    fn test_unregistered_codec() {
        let registry = CodecRegistry::new();
        let err = registry.create(CodecId::H264).err().unwrap();
        assert!(matches!(err, Error::Codec(CodecError::NotRegistered(_))));
    }
}
