pub mod auth;
pub mod device;
pub mod email;
pub mod link;
pub mod otp;

pub use auth::AuthService;
pub use device::DeviceService;
pub use email::{Mailer, ResendMailer};
pub use link::LinkService;
pub use otp::OtpService;
