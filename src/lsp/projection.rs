//! Projection of host positions onto virtual documents.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::ls_types::Position;
use url::Url;

use crate::document::{DocumentSynchronizer, HostDocumentSnapshot, LanguageKind};
use crate::error::RouterResult;

const LOG_TARGET: &str = "razor_router::projection";

/// Answer of the Razor classification service for one host position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageClassification {
    pub kind: LanguageKind,
    /// The position inside the virtual document of `kind`.
    pub position: Position,
    /// Host version the classification was computed against, when known.
    #[serde(default)]
    pub host_document_version: Option<i32>,
}

/// Classifies host positions (the Razor compiler service).
#[async_trait]
pub trait LanguageClassifier: Send + Sync {
    /// `Ok(None)` when the service has no answer for this position.
    async fn classify(
        &self,
        host_uri: &Url,
        position: Position,
    ) -> RouterResult<Option<LanguageClassification>>;
}

/// A host position projected into a synchronized virtual document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionResult {
    pub uri: Url,
    pub kind: LanguageKind,
    pub position: Position,
    pub host_document_version: i32,
}

pub struct ProjectionResolver {
    classifier: Arc<dyn LanguageClassifier>,
    synchronizer: Arc<DocumentSynchronizer>,
}

impl ProjectionResolver {
    pub fn new(classifier: Arc<dyn LanguageClassifier>, synchronizer: Arc<DocumentSynchronizer>) -> Self {
        Self {
            classifier,
            synchronizer,
        }
    }

    /// Project `position` of `host` into the virtual document that owns it.
    ///
    /// Returns `Ok(None)` for Razor positions, missing virtual documents,
    /// failed synchronization and cancellation. Classification transport
    /// failures propagate.
    pub async fn project(
        &self,
        host: &HostDocumentSnapshot,
        position: Position,
        cancel: &CancellationToken,
    ) -> RouterResult<Option<ProjectionResult>> {
        let classification = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            classification = self.classifier.classify(host.uri(), position) => classification?,
        };
        let Some(classification) = classification else {
            log::debug!(target: LOG_TARGET, "No classification for {} at {:?}", host.uri(), position);
            return Ok(None);
        };

        if !classification.kind.is_embedded() {
            log::debug!(target: LOG_TARGET, "{} at {:?} is Razor; not projected", host.uri(), position);
            return Ok(None);
        }

        let Some(virtual_document) = host.virtual_document(classification.kind) else {
            log::debug!(
                target: LOG_TARGET,
                "No {} virtual document for {}",
                classification.kind,
                host.uri()
            );
            return Ok(None);
        };

        let virtual_uri = match classification.host_document_version {
            None => {
                log::warn!(
                    target: LOG_TARGET,
                    "Classification for {} carried no host version; skipping synchronization",
                    host.uri()
                );
                virtual_document.uri().clone()
            }
            Some(_) => {
                let Some(synchronized) = self
                    .synchronizer
                    .synchronize_snapshot(host.version(), virtual_document, cancel)
                    .await
                else {
                    log::debug!(
                        target: LOG_TARGET,
                        "{} for {} did not reach host version {}",
                        classification.kind,
                        host.uri(),
                        host.version()
                    );
                    return Ok(None);
                };
                synchronized.uri().clone()
            }
        };

        Ok(Some(ProjectionResult {
            uri: virtual_uri,
            kind: classification.kind,
            position: classification.position,
            host_document_version: host.version(),
        }))
    }
}
