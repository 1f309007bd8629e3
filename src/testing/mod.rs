//! In-process accessory implementations for integration tests

mod mock_accessory;

pub use mock_accessory::{MockAccessory, WriteBehavior};
