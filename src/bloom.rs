//! Standard Bloom filter with canonical element encoding and exportable state
pub mod config;
pub mod element;
pub mod error;
pub mod filter;
pub mod state;

pub use config::{
    FilterConfig, FilterConfigBuilder, FilterConfigBuilderError, FilterParams,
};
pub use element::{canonical_form, canonical_value};
pub use error::{FilterError, FilterResult};
pub use filter::{BloomFilter, FilterStats};
pub use state::FilterState;
