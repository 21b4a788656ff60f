pub mod hcaptcha_client;

pub use hcaptcha_client::HcaptchaClient;
