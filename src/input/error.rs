//! Error definitions for the input module

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    /// A binding has no key code
    #[error("Empty key code for {0}")]
    EmptyKey(String),

    /// The same key code drives two paddle directions
    #[error("Key {0} is bound more than once")]
    DuplicateKey(String),
}
