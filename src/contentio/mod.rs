//! Content input/output: codecs, path templates, transform pipelines
//! and the context binding them to a storage.
//!
//! Formats are typed: a [`Codec`] declares the decoded record type it
//! produces, and everything downstream (pipeline, queue, storage) is
//! generic over that type, so incompatible transforms cannot be wired
//! together in the first place.

mod context;
mod path;
mod pipeline;

pub use context::{create_io_context, IoContext};
pub use path::{PathPart, PathSegment, PathTemplate};
pub use pipeline::IoBoundPipeline;

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use crate::error::{ConfigError, Error};

/// Bound required of decoded record types.
pub trait DataRecord: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> DataRecord for T {}

/// Byte-level coder for one registered format.
pub trait Codec<T>: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<T, Error>;
    fn encode(&self, value: &T, writer: &mut dyn Write) -> Result<(), Error>;
}

/// Process-wide format table, built during startup and read-only
/// afterwards.
pub struct CodecRegistry<T> {
    codecs: HashMap<String, Arc<dyn Codec<T>>>,
}

impl<T> Default for CodecRegistry<T> {
    fn default() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }
}

impl<T> CodecRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec under a format name. Registering a name twice
    /// is a configuration error.
    pub fn register(
        &mut self,
        format: &str,
        codec: impl Codec<T> + 'static,
    ) -> Result<(), ConfigError> {
        if self.codecs.contains_key(format) {
            return Err(ConfigError::DuplicateFormat(format.to_string()));
        }
        self.codecs.insert(format.to_string(), Arc::new(codec));
        Ok(())
    }

    pub fn contains(&self, format: &str) -> bool {
        self.codecs.contains_key(format)
    }

    pub fn allowed_formats(&self) -> Vec<&str> {
        self.codecs.keys().map(String::as_str).collect()
    }

    pub fn get(&self, format: &str) -> Result<Arc<dyn Codec<T>>, ConfigError> {
        self.codecs
            .get(format)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownFormat(format.to_string()))
    }

    pub fn decode(&self, format: &str, bytes: &[u8]) -> Result<T, Error> {
        self.get(format)?.decode(bytes)
    }

    pub fn encode_to_vec(&self, format: &str, value: &T) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        self.get(format)?.encode(value, &mut buf)?;
        Ok(buf)
    }
}

impl CodecRegistry<serde_json::Value> {
    /// Registry with the bundled JSON codec under `json`.
    pub fn with_json() -> Self {
        let mut registry = Self::new();
        registry
            .register("json", JsonCodec)
            .expect("empty registry accepts the json codec");
        registry
    }
}

/// Bundled codec for `serde_json::Value` records.
pub struct JsonCodec;

impl Codec<serde_json::Value> for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::Decode {
            format: "json".to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), Error> {
        serde_json::to_writer(writer, value).map_err(|e| Error::Encode {
            format: "json".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Codec assembled from two closures, for formats without a dedicated
/// type ("create a datatype on the fly").
pub struct FnCodec<T> {
    format: String,
    decode: Box<dyn Fn(&[u8]) -> Result<T, String> + Send + Sync>,
    encode: Box<dyn Fn(&T, &mut dyn Write) -> Result<(), String> + Send + Sync>,
}

impl<T> FnCodec<T> {
    pub fn new(
        format: &str,
        decode: impl Fn(&[u8]) -> Result<T, String> + Send + Sync + 'static,
        encode: impl Fn(&T, &mut dyn Write) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            format: format.to_string(),
            decode: Box::new(decode),
            encode: Box::new(encode),
        }
    }
}

impl<T: Send + Sync> Codec<T> for FnCodec<T> {
    fn decode(&self, bytes: &[u8]) -> Result<T, Error> {
        (self.decode)(bytes).map_err(|reason| Error::Decode {
            format: self.format.clone(),
            reason,
        })
    }

    fn encode(&self, value: &T, writer: &mut dyn Write) -> Result<(), Error> {
        (self.encode)(value, writer).map_err(|reason| Error::Encode {
            format: self.format.clone(),
            reason,
        })
    }
}
