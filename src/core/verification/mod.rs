// Core verification module - challenge tokens and the captcha flow.

pub mod challenge_token;
pub mod verification_models;
pub mod verification_service;

pub use challenge_token::*;
pub use verification_models::*;
pub use verification_service::*;
