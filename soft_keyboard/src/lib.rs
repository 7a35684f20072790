mod error;
mod forwarder;
mod hidden_input;
mod input_method;
mod keyboard;
mod toast;

pub use error::*;
pub use forwarder::{on_soft_keyboard_input, ON_SOFT_KEYBOARD_INPUT};
pub use hidden_input::*;
pub use input_method::*;
pub use keyboard::*;
pub use toast::*;

#[cfg(test)]
mod test_support;
