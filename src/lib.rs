//! A client library for the MediaWiki Action API.
//!
//! ## Examples
//!
//! To talk to a wiki, build a shared [`WikiClient`] and connect a [`Site`]
//! to its `api.php` endpoint:
//!
//! ```no_run
//! use std::sync::Arc;
//! use mwclient::{CancellationToken, Site, SiteOptions, WikiClient};
//! # tokio_test::block_on(async {
//! let client = Arc::new(WikiClient::new().unwrap());
//! let cancel = CancellationToken::new();
//! let site = Site::connect(
//!     client,
//!     "https://en.wikipedia.org/w/api.php",
//!     SiteOptions::default(),
//!     &cancel,
//! )
//! .await
//! .unwrap();
//! # let _ = site;
//! # });
//! ```
//!
//! Pages are lazy handles; `refresh` pulls their state, mutations go
//! through the usual edit/move/delete calls:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use mwclient::{CancellationToken, Site, SiteOptions, WikiClient};
//! use mwclient::page::PageQueryOptions;
//! # tokio_test::block_on(async {
//! # let client = Arc::new(WikiClient::new().unwrap());
//! # let cancel = CancellationToken::new();
//! # let site = Site::connect(client, "https://en.wikipedia.org/w/api.php", SiteOptions::default(), &cancel).await.unwrap();
//! let mut page = site.page("Sandbox");
//! page.refresh(PageQueryOptions::FETCH_CONTENT, &cancel).await.unwrap();
//! println!("{}", page.content().unwrap_or(""));
//! # });
//! ```
//!
//! Large result sets are paged behind a lazy sequence; drain it through
//! the pull API or as a stream:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use mwclient::{CancellationToken, Site, SiteOptions, WikiClient};
//! use futures_util::TryStreamExt;
//! use mwclient::generators::allpages::AllPages;
//! use mwclient::generators::ListSource;
//! # tokio_test::block_on(async {
//! # let client = Arc::new(WikiClient::new().unwrap());
//! # let cancel = CancellationToken::new();
//! # let site = Site::connect(client, "https://en.wikipedia.org/w/api.php", SiteOptions::default(), &cancel).await.unwrap();
//! let mut source = ListSource::new(site.clone(), AllPages::new());
//! while let Some(page_of_stubs) = source.next_page().await.unwrap() {
//!     for stub in page_of_stubs {
//!         println!("{}", stub.title.unwrap_or_default());
//!     }
//! }
//! # });
//! ```

pub mod error;
pub mod family;
pub mod generators;
pub mod page;
pub mod req;
pub mod res;
pub mod rev;
pub mod site;
pub mod title;
pub mod transport;
pub mod types;
pub mod upload;
pub mod util;

pub use error::{ApiError, Error, Result};
pub use family::WikiFamily;
pub use page::{PageQueryOptions, WikiPage, WikiPageStub};
pub use rev::{FileRevision, Revision};
pub use site::info::{AccountInfo, Namespace, SiteInfo};
pub use site::{AccountAssertion, LoginPolicy, Site, SiteOptions};
pub use title::WikiLink;
pub use transport::{ClientConfig, WikiClient};
pub use types::{AutoWatchBehavior, Direction, Limit, MwTimestamp};
pub use upload::{ChunkedUploadSource, UploadResult, UploadSource};

/// Re-exported cancellation handle; every async operation accepts one.
pub use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;
