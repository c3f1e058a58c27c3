// src/hal/mod.rs
//! Hardware abstraction layer: byte sources and the shield's wire protocol

pub mod protocol;
pub mod serial_driver;
pub mod simulator;
pub mod traits;

pub use protocol::{Frame, FrameParser};
pub use serial_driver::{list_ports, PortDescription, SerialByteSource};
pub use simulator::{MemoryFeed, MemorySource, SimulatedBoard, SimulatorConfig};
pub use traits::{is_transient, ByteSource};
