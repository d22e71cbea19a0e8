//! Snoti wire protocol: newline-delimited JSON envelopes

pub mod envelope;
pub mod event;
pub mod login;
pub mod requests;

pub use envelope::{decode, encode, Command, Envelope, FrameHeader, DELIMITER};
pub use event::EventPush;
pub use login::{check_login_response, login_envelope, split_event_types, LoginData};
pub use requests::{
    remote_control_envelope, subscribe_envelope, unsubscribe_envelope, ControlCmd, ControlData,
    ControlDetail,
};
