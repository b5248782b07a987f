pub mod ids;
pub mod message;
pub mod validation;
