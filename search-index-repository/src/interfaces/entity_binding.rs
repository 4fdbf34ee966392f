//! Entity binding trait definition.
//!
//! An index client is generic over the key and value type of the entity kind
//! it indexes. Everything kind-specific is supplied through [`EntityBinding`].

use std::collections::BTreeSet;

use search_index_shared::{Document, QueryOptions, SortField};

/// Entity-kind-specific behavior plugged into an
/// [`IndexClient`](crate::client::IndexClient).
///
/// # Example
///
/// ```ignore
/// struct AccountBinding { cache: Arc<AccountCache> }
///
/// impl EntityBinding<u32, AccountState> for AccountBinding {
///     fn base_name(&self) -> &str { "accounts" }
///     fn key(&self, account: &AccountState) -> u32 { account.id }
///     fn to_document(&self, account: &AccountState) -> Document { account.to_document() }
///     fn from_document(&self, doc: &Document, _: &BTreeSet<String>) -> Option<AccountState> {
///         self.cache.get(doc.integer("id")? as u32)
///     }
///     fn sort_order(&self) -> Vec<SortField> { vec![SortField::asc("id")] }
/// }
/// ```
pub trait EntityBinding<K, V>: Send + Sync {
    /// Base name of the index, before prefix and schema version are applied.
    fn base_name(&self) -> &str;

    /// Key identifying `value`. Its `Display` form is the document id.
    fn key(&self, value: &V) -> K;

    /// Build the document to index for `value`.
    fn to_document(&self, value: &V) -> Document;

    /// Resolve a hit back into a value.
    ///
    /// `fields` are the fields the caller asked for. Returning `None` means the
    /// entity no longer exists in the system of record; the hit is skipped.
    fn from_document(&self, document: &Document, fields: &BTreeSet<String>) -> Option<V>;

    /// Total sort order for queries on this index.
    fn sort_order(&self) -> Vec<SortField>;

    /// Adjust query options before a query runs, e.g. to force fields the
    /// decoder depends on.
    fn filter_options(&self, opts: QueryOptions) -> QueryOptions {
        opts
    }
}
