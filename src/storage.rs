//! Local storage for the tag.
//!
//! The tag keeps its state in the page's **local storage**: persistent
//! key/value data per origin. This module defines the traits the
//! [`StorageManager`](crate::manager::StorageManager) talks to and the
//! backends that ship with the crate.
//!
//! # Concepts
//!
//! - [`StorageArea`] is one key/value area (the DOM's `Storage`): `get_item`,
//!   `set_item`, `remove_item`, `clear`.
//! - [`LocalStore`] hands out the area for an origin. Two calls with the same
//!   origin share data.
//!
//! # Choosing a backend
//!
//! - For persistence across runs, use [`SqliteLocalStore`] (feature
//!   `sqlite_local_store`, on by default).
//! - For tests or ephemeral hosts, use [`InMemoryLocalStore`].
//! - A host without local storage passes no area at all; the manager then
//!   falls back to cookies.
//!
//! # Example
//!
//! ```rust
//! use tagstore::storage::{InMemoryLocalStore, LocalStore};
//!
//! let store = InMemoryLocalStore::new();
//! let origin = url::Url::parse("https://shop.example.com/").unwrap().origin();
//! let area = store.area(&origin).unwrap();
//! area.set_item("WZRK_G", "\"abc\"").unwrap();
//! assert_eq!(area.get_item("WZRK_G").as_deref(), Some("\"abc\""));
//! ```

/// Storage area module, defining the key/value storage interface.
pub mod area;

/// Local storage backends.
pub mod local {
    /// In-memory local storage implementation.
    pub mod in_memory;
    /// SQLite-backed local storage implementation.
    #[cfg(feature = "sqlite_local_store")]
    pub mod sqlite_store;
}

pub use area::{LocalStore, StorageArea};
pub use local::in_memory::{InMemoryLocalArea, InMemoryLocalStore};
#[cfg(feature = "sqlite_local_store")]
pub use local::sqlite_store::SqliteLocalStore;
