//! Resolution of a catalog page into a verified download link.
//!
//! Resolution runs in three steps, each with its own type:
//!
//! - [`IsbnResolver`] - scrapes the identifier from the source page
//! - [`CatalogSearch`] - lists the record hashes the metadata index holds for it
//! - [`LinkVerifier`] - probes mirror links and checks their listed ISBN
//!
//! # Example
//!
//! ```no_run
//! use bookrelay_core::resolver::IsbnResolver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = IsbnResolver::new()?;
//! let isbn = resolver.resolve("https://www.goodreads.com/book/show/1").await?;
//! println!("ISBN: {isbn}");
//! # Ok(())
//! # }
//! ```

mod catalog;
mod error;
pub(crate) mod http_client;
mod isbn;
pub(crate) mod utils;
mod verifier;

pub use catalog::{CatalogSearch, RecordHash, extract_record_hashes};
pub use error::ResolveError;
pub use http_client::ClientBuildError;
pub use isbn::{Isbn, IsbnResolver, extract_isbn};
pub use verifier::{BookMetadata, CandidateLink, LinkVerifier};
