// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

//! Column descriptors, schemas and the order-preserving key encoding.

mod column;
pub mod keycode;
mod schema;

pub use column::*;
pub use schema::*;
