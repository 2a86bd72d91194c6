//! Type-state markers for the builder pattern
//!
//! The builder only exposes `build()` once a transport has been supplied.

use std::marker::PhantomData;

/// Marker trait for transport state
pub trait TransportState {}

/// Transport has not been set
pub struct NoTransport;
impl TransportState for NoTransport {}

/// Transport has been set
pub struct HasTransport;
impl TransportState for HasTransport {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<T> {
    _transport: PhantomData<T>,
}

impl<T> TypeState<T> {
    pub(crate) fn new() -> Self {
        Self {
            _transport: PhantomData,
        }
    }
}

impl<T> Default for TypeState<T> {
    fn default() -> Self {
        Self::new()
    }
}
