pub mod client;
pub mod frames;

pub use client::{TransportClient, TransportHandle};
pub use frames::{ClientFrame, ServerFrame};
