pub mod photo;
pub mod validation;
