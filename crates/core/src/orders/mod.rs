//! Order creation from sheet rows.

pub mod materializer;
pub mod ports;

pub use materializer::{MaterializeError, OrderContext, OrderMaterializer};
pub use ports::{CustomerChange, MaterializationPlan, ProductChange};
