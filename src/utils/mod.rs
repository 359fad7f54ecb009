pub mod crypto;
pub mod headers;
pub mod redirect_validator;
pub mod responses;
