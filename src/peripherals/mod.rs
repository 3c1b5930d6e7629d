//! Simulated cube peripherals
//!
//! Everything the 8051 talks to: the NOR flash and LCD on the shared
//! parallel bus, the radio behind the on-chip SPI master, the
//! accelerometer behind the I2C master, the ADC, the MDU math coprocessor,
//! the RNG and the neighbor pulse fabric. Peripherals are plain structs
//! with `cycle` (pin-level) and/or `tick` (deadline-level) entry points;
//! the bus wires them to SFR traffic.

pub mod adc;
pub mod flash;
pub mod flash_model;
pub mod flash_storage;
pub mod i2c;
pub mod lcd;
pub mod mdu;
pub mod neighbors;
pub mod radio;
pub mod rng;
pub mod spi;

pub use adc::Adc;
pub use flash::Flash;
pub use flash_storage::FlashStorage;
pub use i2c::I2cBus;
pub use lcd::Lcd;
pub use mdu::Mdu;
pub use neighbors::Neighbors;
pub use radio::Radio;
pub use rng::Rng;
pub use spi::SpiBus;
