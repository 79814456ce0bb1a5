//! Play stage packets.

pub mod clientbound;
pub mod commands;
pub mod player_info;
pub mod serverbound;

pub use clientbound::{Clientbound, ClientboundKind};
pub use serverbound::{Serverbound, ServerboundKind};
