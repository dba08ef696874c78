pub mod cache;
pub mod capture;
pub mod email;
pub mod paypal;
pub mod repository;
pub mod sanitize;
pub mod subscription;
pub mod webhook;

pub use email::ReceiptMailer;
pub use paypal::PayPalClient;
pub use repository::{DonationStore, MongoDonationStore};
