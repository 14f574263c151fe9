//! Sales warehouse loader
//!
//! Turns a flat sales export into a star schema: DateDim, ProductDim,
//! RegionDim and PaymentDim, plus FactSales referencing all four through
//! surrogate keys. Stages run strictly forward:
//! source -> dimensions -> resolver -> facts -> sink.

pub mod config;
pub mod dimensions;
pub mod error;
pub mod facts;
pub mod pipeline;
pub mod resolver;
pub mod sink;
pub mod source;
pub mod verify;

pub use config::Config;
pub use error::{EtlError, Result};
pub use pipeline::{plan_load, LoadPlan, RunSummary};
pub use sink::{LoadCounts, Warehouse};
pub use source::{load_source, parse_source, RawRecord};
