//! Change feed stream trait.

use futures_core::Stream;

use crate::Result;
use crate::repo::ChangeEvent;

/// Stream of change events for one subscription.
pub trait ChangeFeed: Stream<Item = Result<ChangeEvent>> + Send {}

impl<T> ChangeFeed for T where T: Stream<Item = Result<ChangeEvent>> + Send {}
