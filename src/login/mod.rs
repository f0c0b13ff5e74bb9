// Login module - QR-code web login yielding a credential bundle

pub mod errors;
pub mod models;
pub mod passport;
pub mod qr;
pub mod session;

pub use errors::LoginError;
pub use models::{LoginEvent, LoginState, LoginTicket, PollOutcome, Transition};
pub use passport::{LoginApi, PassportClient};
pub use session::{LoginHandle, LoginSession};
