/// Agent level errors.
pub mod errors;
