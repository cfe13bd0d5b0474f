//! Networking for layout fetches: page URLs, the same-origin check, and a
//! blocking HTTP/1.1 client.

pub mod client;
pub mod fetch;
pub mod http;
pub mod tls;
pub mod transport;
pub mod url;

pub use crate::client::HttpFetcher;
pub use crate::fetch::DirectoryFetcher;
pub use crate::fetch::FetchResponse;
pub use crate::fetch::LayoutFetcher;
pub use crate::fetch::fetch_on_worker;
pub use crate::tls::TlsPolicy;
pub use crate::tls::TrustStoreMode;
pub use crate::url::PageLocation;
pub use crate::url::Scheme;
