//! # couch_stream
//!
//! An asynchronous CouchDB client whose view and `_changes` results are parsed while
//! the response is still arriving. A streaming result reads the response header up to
//! the row array, then hands out rows one at a time through a single-use iterator, so
//! a result with millions of rows is processed in constant memory. Metadata that
//! follows the rows on the wire, such as `last_seq`, becomes readable once the last
//! row has been consumed.
//!
//! ## Example
//!
//! ```no_run
//! use couch_stream::{ChangesQuery, ClientConfig, CouchDbClient};
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct Person {
//!     name: String,
//!     age: u32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CouchDbClient::new(ClientConfig::new("http://127.0.0.1:5984/"))?;
//!     let query = ChangesQuery::new().include_docs(true);
//!     let mut changes = client.query_for_streaming_changes("people", &query).await?;
//!
//!     let mut rows = changes.iterator()?;
//!     while rows.has_next().await? {
//!         let change = rows.next_row().await?;
//!         let person: Option<Person> = change.doc_as()?;
//!         println!("{:?} {:?}", change.id(), person);
//!     }
//!     println!("resume from {:?}", changes.last_seq().await?);
//!     changes.close();
//!     Ok(())
//! }
//! ```

#[cfg(test)]
mod tests;

mod body;
pub use body::*;

mod stream_adapter;
pub use stream_adapter::*;

mod scan;

mod token_reader;
pub use token_reader::*;

mod error;
pub use error::*;

mod decoder;
pub use decoder::*;

mod row;
pub use row::*;

mod streaming;

mod row_iter;
pub use row_iter::*;

mod view_result;
pub use view_result::*;

mod changes_result;
pub use changes_result::*;

mod results;
pub use results::*;

mod query;
pub use query::*;

mod config;
pub use config::*;

mod document;
pub use document::*;

#[cfg(feature = "http")]
mod client;
#[cfg(feature = "http")]
pub use client::*;

#[cfg(feature = "metrics")]
mod metrics;
#[cfg(feature = "metrics")]
pub use metrics::*;
