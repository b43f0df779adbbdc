//! Binding of formats, storage, path template and pipeline for one
//! request.

use std::sync::Arc;

use crate::contentio::{CodecRegistry, DataRecord, IoBoundPipeline, PathTemplate};
use crate::error::ConfigError;
use crate::storage::FsBlobStorage;

/// Everything a collector needs to turn response bytes into stored
/// objects: input/output formats, the storage handle, an optional
/// output-path template and an optional transform pipeline.
pub struct IoContext<T: DataRecord> {
    in_format: String,
    out_format: String,
    storage: Arc<FsBlobStorage<T>>,
    path_template: Option<PathTemplate>,
    pipeline: Option<IoBoundPipeline<T>>,
}

/// Build a context, verifying both formats against the storage's codec
/// registry. Unknown formats fail here, before any collector runs.
pub fn create_io_context<T: DataRecord>(
    in_format: &str,
    out_format: &str,
    storage: Arc<FsBlobStorage<T>>,
) -> Result<IoContext<T>, ConfigError> {
    for format in [in_format, out_format] {
        if !storage.codecs().contains(format) {
            return Err(ConfigError::UnknownFormat(format.to_string()));
        }
    }
    Ok(IoContext {
        in_format: in_format.to_string(),
        out_format: out_format.to_string(),
        storage,
        path_template: None,
        pipeline: None,
    })
}

impl<T: DataRecord> IoContext<T> {
    pub fn in_format(&self) -> &str {
        &self.in_format
    }

    pub fn out_format(&self) -> &str {
        &self.out_format
    }

    pub fn storage(&self) -> &Arc<FsBlobStorage<T>> {
        &self.storage
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry<T>> {
        self.storage.codecs()
    }

    /// Attach (or return the already attached) output-path template.
    pub fn attach_path_template(&mut self) -> &mut PathTemplate {
        self.path_template.get_or_insert_with(PathTemplate::default)
    }

    /// Attach (or return the already attached) transform pipeline.
    pub fn attach_pipeline(&mut self) -> &mut IoBoundPipeline<T> {
        self.pipeline.get_or_insert_with(IoBoundPipeline::default)
    }

    pub fn path_template(&self) -> Option<&PathTemplate> {
        self.path_template.as_ref()
    }

    pub fn pipeline(&self) -> Option<&IoBoundPipeline<T>> {
        self.pipeline.as_ref()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        String,
        Arc<FsBlobStorage<T>>,
        Option<PathTemplate>,
        Option<IoBoundPipeline<T>>,
    ) {
        (
            self.in_format,
            self.out_format,
            self.storage,
            self.path_template,
            self.pipeline,
        )
    }
}
