pub mod device_session;
pub mod link;
pub mod otp;
pub mod user;

pub use device_session::*;
pub use link::*;
pub use otp::*;
pub use user::*;
