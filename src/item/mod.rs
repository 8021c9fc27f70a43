//! Item model for extracted records
//!
//! This module provides the schema-constrained records produced by the two
//! crawl phases, along with the field-normalization pipeline every written
//! value passes through.
//!
//! # Components
//!
//! - `RawValue` / `normalize`: the input side of the pipeline (unwrap,
//!   stringify, field transforms, trim)
//! - `take_first`: the default output step collapsing multi-valued
//!   extractions to a single value
//! - `Subject` / `Book`: the two concrete record types

mod processor;
mod record;

pub use processor::{normalize, take_first, OutputStep, RawValue, Transform};
pub use record::{Book, ItemError, RawRecord, Subject};
