//! Static extractor registry and dispatch.
//!
//! Extractors are registered explicitly; each registration indexes the
//! extractor under every file type it declares. Dispatch tries the candidates
//! for a type in registration order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::harvest::formats::{ImageExtractor, PdfExtractor};
use crate::model::ExtractionResult;
use crate::traits::{ExtractionError, MetadataExtractor};

/// How results from several applicable extractors are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// First extractor returning a result wins.
    #[default]
    FirstMatch,
    /// Every applicable extractor runs and results are merged.
    Merge,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No extractor registered for file type '{0}'")]
    NoExtractor(String),

    #[error("Extractor '{extractor}' failed: {source}")]
    Extraction {
        extractor: &'static str,
        #[source]
        source: ExtractionError,
    },
}

#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn MetadataExtractor>>,
    by_type: HashMap<String, Vec<usize>>,
    policy: DispatchPolicy,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in image and PDF extractors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ImageExtractor));
        registry.register(Arc::new(PdfExtractor));
        registry
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    pub fn register(&mut self, extractor: Arc<dyn MetadataExtractor>) {
        let index = self.extractors.len();
        for file_type in extractor.handled_types() {
            self.by_type
                .entry((*file_type).to_string())
                .or_default()
                .push(index);
        }
        self.extractors.push(extractor);
    }

    pub fn supports(&self, file_type: &str) -> bool {
        self.by_type.contains_key(file_type)
    }

    /// Names of the extractors willing to handle `file_type`, in dispatch order.
    pub fn candidates(&self, file_type: &str) -> Vec<&'static str> {
        self.candidates_for(file_type).map(|e| e.name()).collect()
    }

    fn candidates_for<'a>(
        &'a self,
        file_type: &str,
    ) -> impl Iterator<Item = &'a Arc<dyn MetadataExtractor>> + 'a {
        self.by_type
            .get(file_type)
            .into_iter()
            .flatten()
            .filter_map(move |&i| self.extractors.get(i))
    }

    /// Runs the extractors registered for `file_type` against `path`.
    ///
    /// `Ok(None)` means candidates exist but none produced a result. A failing
    /// candidate does not stop the others; its error is returned only when no
    /// candidate produced a result.
    pub fn dispatch(
        &self,
        path: &Path,
        file_type: &str,
    ) -> Result<Option<ExtractionResult>, DispatchError> {
        if !self.supports(file_type) {
            return Err(DispatchError::NoExtractor(file_type.to_string()));
        }

        let mut merged: Option<ExtractionResult> = None;
        let mut first_error = None;

        for extractor in self.candidates_for(file_type) {
            match extractor.parse_data(path, file_type) {
                Ok(Some(result)) => {
                    debug!(extractor = extractor.name(), path = %path.display(), "Extractor produced result");
                    match self.policy {
                        DispatchPolicy::FirstMatch => return Ok(Some(result)),
                        DispatchPolicy::Merge => match merged.as_mut() {
                            Some(acc) => acc.merge(result),
                            None => merged = Some(result),
                        },
                    }
                }
                Ok(None) => {}
                Err(source) => {
                    warn!(extractor = extractor.name(), path = %path.display(), error = %source, "Extractor failed");
                    if first_error.is_none() {
                        first_error = Some(DispatchError::Extraction {
                            extractor: extractor.name(),
                            source,
                        });
                    }
                }
            }
        }

        match (merged, first_error) {
            (Some(result), _) => Ok(Some(result)),
            (None, Some(err)) => Err(err),
            (None, None) => Ok(None),
        }
    }
}
