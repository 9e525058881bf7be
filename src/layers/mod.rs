pub mod linear;
pub mod parameter;

pub use linear::Linear;
pub use parameter::Parameter;
