//! Components E, F, G: the three resource actuators commanded by the main
//! control loop. Each owns its own worker thread(s) and exposes a small
//! set of atomics/locks the control loop writes into every tick; the
//! workers themselves only read.

pub mod cpu;
pub mod memory;
pub mod network;

pub use cpu::CpuActuator;
pub use memory::MemoryActuator;
pub use network::NetworkActuator;
