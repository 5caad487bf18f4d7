//! Decode-and-install engine for PlayStation PKG archives.
//!
//! Installs a package archive onto local storage: stitches a
//! multi-part archive into one logical byte stream, parses and
//! validates the container header and metadata, decrypts the entry
//! table, and streams each entry's payload to the destination
//! directory while reporting fractional progress and honoring
//! cooperative cancellation.
//!
//! The whole pipeline is synchronous and single-threaded; the only
//! shared state is the [`AtomicF64`] progress cell, which an external
//! controller may drive negative to request cancellation.

pub mod entry;
pub mod error;
pub mod extract;
pub mod header;
pub mod metadata;
pub mod path;
pub mod progress;
pub mod session;
pub mod stream;

pub use entry::{EntryCategory, PkgEntry};
pub use error::{Error, Result};
pub use extract::Extractor;
pub use header::{PkgExtHeader, PkgHeader, PkgPlatform, PkgType};
pub use metadata::PkgMetadata;
pub use progress::AtomicF64;
pub use session::install;
pub use stream::MultiVolumeStream;
