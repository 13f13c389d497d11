#![forbid(unsafe_code)]

pub mod composer;
pub mod display;
pub mod error;
pub mod exam_gate;
pub mod grading;
pub mod model;
pub mod rollup;
pub mod stage;
pub mod time;

pub use error::Error;
pub use time::Clock;
