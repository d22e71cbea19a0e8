/// Type-state markers for the builder pattern
///
/// These types record at compile time whether the configuration and the
/// event handler have been supplied.

use std::marker::PhantomData;

/// Marker trait for config state
pub trait ConfigState {}

/// Config has not been set
pub struct NoConfig;
impl ConfigState for NoConfig {}

/// Config has been set
pub struct HasConfig;
impl ConfigState for HasConfig {}

/// Marker trait for handler state
pub trait HandlerState {}

/// Handler has not been set
pub struct NoHandler;
impl HandlerState for NoHandler {}

/// Handler has been set
pub struct HasHandler;
impl HandlerState for HasHandler {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<C, H> {
    _config: PhantomData<C>,
    _handler: PhantomData<H>,
}

impl<C, H> TypeState<C, H> {
    pub(crate) fn new() -> Self {
        Self {
            _config: PhantomData,
            _handler: PhantomData,
        }
    }
}

impl<C, H> Default for TypeState<C, H> {
    fn default() -> Self {
        Self::new()
    }
}
