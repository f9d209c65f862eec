//! Core types shared across the ratline access-control workspace.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ClientId, GroupId, ParseIdError, RatId, RescueId, ShipId, UserId};
