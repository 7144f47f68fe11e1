//! Client side of the spreadsheet that backs the publish service.
//!
//! The publisher only ever talks to a [`TabularStore`]: a grid of cells per tab,
//! addressed with A1 ranges. [`SheetsStore`] speaks to the Google Sheets v4 REST
//! API and [`MemoryStore`] keeps everything in process for tests and local runs.

pub mod auth;
pub mod memory;
pub mod metrics_defs;
pub mod range;
pub mod sheets;
pub mod store;

pub use auth::{CredentialsError, CredentialsSource, TokenProvider, token_provider};
pub use memory::{MemoryStore, StoreCall};
pub use range::{A1Range, Span, a1_col};
pub use sheets::{SheetsConfig, SheetsStore};
pub use store::{Cell, Grid, Row, StoreError, TabularStore, cell_text, is_blank};
