//! Process Data Object (PDO) engine: mapping-driven gather/scatter between the
//! Object Dictionary and CAN frame payloads (spec section 4.2).

mod types;
pub use types::*;

mod engine;
pub use engine::*;
