pub mod ease;
pub mod model;
pub mod ops;
