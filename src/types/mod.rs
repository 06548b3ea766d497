//! Core value types shared by the parser, catalog and binder.

mod value;

pub use value::{DataType, Value};
