//! OAuth Device Flow controller and cooldown-store recovery scanner.

mod controller;
mod device_flow;
mod error;
mod recovery;
mod sleeper;
mod transport;

pub use controller::{AddAccountResult, OAuthController, QuotaInfo};
pub use device_flow::{poll_for_authorization, request_device_code, DeviceAuthorization};
pub use error::OAuthError;
pub use recovery::RecoveryScanner;
pub use sleeper::{Sleeper, TokioSleeper};
pub use transport::{OAuthTransport, WreqOAuthTransport};
