pub mod crypto;
pub mod defrost;
pub mod fetcher;
pub mod service;
pub mod stopice;

pub use defrost::DefrostSource;
pub use fetcher::ReqwestFetcher;
pub use service::{Caches, DefaultLookup, build_lookup};
pub use stopice::StopIceSource;
