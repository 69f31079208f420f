//! One-shot reads that bypass the subscription machinery.

use crate::convert::{DecodeOptions, TypeConverter};
use crate::error::Result;
use crate::mapper::{map_document, map_query};
use crate::query::Query;
use crate::store::DocumentStore;
use crate::types::{DocumentRef, DomainRecord};
use std::sync::Arc;
use tracing::debug;

/// Stateless reader: every call is its own round trip to the store and no
/// listener is ever registered.
///
/// Decodes with [`DecodeOptions::default`] (exact server times) unless told
/// otherwise, so a pending server time reads as `null` here while a live
/// binding on the same document sees the local estimate.
#[derive(Clone)]
pub struct Fetcher {
    store: Arc<dyn DocumentStore>,
    options: DecodeOptions,
}

impl Fetcher {
    /// Create a fetcher decoding with exact server times.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            options: DecodeOptions::default(),
        }
    }

    /// Override the decode options used by `fetch_query`/`fetch_document`.
    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Decode options used when none are given per call.
    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    /// Read a query once. An empty result is `None`.
    pub async fn fetch_query<T>(
        &self,
        query: &Query,
        converter: &TypeConverter<T>,
    ) -> Result<Option<Vec<DomainRecord<T>>>> {
        self.fetch_query_with(query, converter, self.options).await
    }

    /// Read a query once, decoding with `options`.
    pub async fn fetch_query_with<T>(
        &self,
        query: &Query,
        converter: &TypeConverter<T>,
        options: DecodeOptions,
    ) -> Result<Option<Vec<DomainRecord<T>>>> {
        let snapshot = self.store.get_query(query).await?;
        debug!(
            path = query.collection_ref().path(),
            entries = snapshot.len(),
            "fetched query"
        );
        map_query(&snapshot, converter, &options)
    }

    /// Read a document once. A missing document is `None`.
    pub async fn fetch_document<T>(
        &self,
        doc: &DocumentRef,
        converter: &TypeConverter<T>,
    ) -> Result<Option<DomainRecord<T>>> {
        self.fetch_document_with(doc, converter, self.options).await
    }

    /// Read a document once, decoding with `options`.
    pub async fn fetch_document_with<T>(
        &self,
        doc: &DocumentRef,
        converter: &TypeConverter<T>,
        options: DecodeOptions,
    ) -> Result<Option<DomainRecord<T>>> {
        let snapshot = self.store.get_document(doc).await?;
        debug!(path = %doc.path(), exists = snapshot.exists(), "fetched document");
        map_document(&snapshot, converter, &options)
    }
}
