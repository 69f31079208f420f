//! Live bindings: a descriptor plus a dependency set kept in sync with the
//! store.
//!
//! A binding decodes every snapshot with [`DecodeOptions::estimate`], so
//! pending server times surface as local estimates.
//!
//! # Example
//!
//! ```ignore
//! let mut books: QueryBinding<Book, BookFilter> =
//!     Binding::new(store.clone(), TypeConverter::serde());
//!
//! books.bind(Some(query_for(&filter)), filter.clone())?;
//!
//! // On the owning thread, once per frame/tick:
//! books.poll();
//! let state = books.state();
//! if let Some(err) = state.error {
//!     eprintln!("listener failed: {err}");
//! }
//! ```
//!
//! [`DecodeOptions::estimate`]: crate::convert::DecodeOptions::estimate

mod live;
mod target;

pub use live::{Binding, BindingState, DocumentBinding, QueryBinding};
pub use target::BindTarget;
