//! Reverie infrastructure layer.
//!
//! Concrete providers behind the contracts defined in `reverie-core`:
//!
//! - [`JsonFileStore`]: file-per-record JSON persistence with an
//!   in-memory mirror and an entries-by-time index
//! - [`CipherManager`]: password-derived key lifecycle and
//!   authenticated per-record encryption
//! - [`HttpSentimentClient`]: the remote text-analysis collaborator
//!   over HTTP

mod cipher_manager;
mod http_sentiment_client;
mod json_file_store;

pub use cipher_manager::CipherManager;
pub use http_sentiment_client::HttpSentimentClient;
pub use json_file_store::JsonFileStore;
