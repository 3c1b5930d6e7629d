//! Radio integration tests
//!
//! Exercise the full transmit path firmware uses: SPI master SFRs
//! shifting bytes into the radio, RFCON driving CSN/CE, the network hub
//! carrying packets between cubes, and ACK payloads flowing back.

use crate::cpu::sfr;
use crate::network::NetworkHub;
use crate::peripherals::radio;
use crate::peripherals::FlashStorage;
use crate::system::System;

// nRF24L01 SPI opcodes used by the tests
const CMD_R_REGISTER: u8 = 0x00;
const CMD_W_REGISTER: u8 = 0x20;
const CMD_R_RX_PL_WID: u8 = 0x60;
const CMD_R_RX_PAYLOAD: u8 = 0x61;
const CMD_W_TX_PAYLOAD: u8 = 0xA0;
const CMD_NOP: u8 = 0xFF;

const REG_STATUS: u8 = 0x07;
const REG_RX_ADDR_P0: u8 = 0x0A;

/// 440us receive interval in cycles, with headroom
const RX_INTERVAL_CYCLES: u64 = 8000;

fn two_cubes() -> System {
    let mut sys = System::new();
    sys.add_cube(FlashStorage::new());
    sys.add_cube(FlashStorage::new());
    sys
}

fn rfcon(sys: &mut System, cube: usize, csn_low: bool, ce: bool) {
    let mut value = sfr::RFCON_RFCKEN;
    if !csn_low {
        value |= sfr::RFCON_RFCSN;
    }
    if ce {
        value |= sfr::RFCON_RFCE;
    }
    sys.cube_mut(cube).bus.sfr_write(sfr::REG_RFCON, value);
}

/// Clock one byte through the SPI master and return the MISO byte
fn spi_byte(sys: &mut System, cube: usize, mosi: u8) -> u8 {
    sys.cube_mut(cube).bus.sfr_write(sfr::REG_SPIRDAT, mosi);
    // 16 cycles per byte at the reset divisor
    sys.run(40);
    sys.cube_mut(cube).bus.sfr_read(sfr::REG_SPIRDAT)
}

/// One CSN-framed SPI transaction, keeping CE as given
fn spi_xfer(sys: &mut System, cube: usize, ce: bool, bytes: &[u8]) -> Vec<u8> {
    rfcon(sys, cube, true, ce);
    let miso = bytes
        .iter()
        .map(|&b| spi_byte(sys, cube, b))
        .collect();
    rfcon(sys, cube, false, ce);
    miso
}

fn radio_status(sys: &mut System, cube: usize, ce: bool) -> u8 {
    spi_xfer(sys, cube, ce, &[CMD_NOP])[0]
}

#[test]
fn test_spi_master_reaches_radio() {
    let mut sys = two_cubes();

    // Write and read back the channel register through the real bus
    spi_xfer(&mut sys, 0, false, &[CMD_W_REGISTER | 0x05, 0x4C]);
    let miso = spi_xfer(&mut sys, 0, false, &[CMD_R_REGISTER | 0x05, 0x00]);
    assert_eq!(miso[1], 0x4C);
    assert_eq!(sys.take_exception_count(), 0);
}

#[test]
fn test_packet_and_ack_between_cubes() {
    let mut sys = two_cubes();

    // Cube B listens on its own address
    spi_xfer(
        &mut sys,
        1,
        false,
        &[CMD_W_REGISTER | REG_RX_ADDR_P0, 0x11, 0x22, 0x33, 0x44, 0x55],
    );
    let addr_b = (2u64 << 56) | 0x55_44_33_22_11;

    // Cube A queues its reply payload, then both receivers go live
    spi_xfer(&mut sys, 0, false, &[CMD_W_TX_PAYLOAD, 0xDE, 0xAD]);
    rfcon(&mut sys, 0, false, true);
    rfcon(&mut sys, 1, false, true);

    // A packet arrives for cube A, stamped with B's listen address as
    // its reply address
    let addr_a = (2u64 << 56) | 0xE7_E7_E7_E7_E7;
    sys.hub.tx(addr_a, addr_b, &[0x01]);

    // One receive opportunity on A forwards the ACK payload; one more
    // interval later B has picked it up
    sys.run(RX_INTERVAL_CYCLES);
    sys.run(RX_INTERVAL_CYCLES);

    // A saw its payload acknowledged
    let status_a = radio_status(&mut sys, 0, true);
    assert_ne!(status_a & radio::STATUS_TX_DS, 0);
    assert_ne!(status_a & radio::STATUS_RX_DR, 0); // the inbound poke

    // B received the two ACK bytes
    let status_b = radio_status(&mut sys, 1, true);
    assert_ne!(status_b & radio::STATUS_RX_DR, 0);

    let width = spi_xfer(&mut sys, 1, true, &[CMD_R_RX_PL_WID, 0x00]);
    assert_eq!(width[1], 2);
    let payload = spi_xfer(&mut sys, 1, true, &[CMD_R_RX_PAYLOAD, 0x00, 0x00]);
    assert_eq!(&payload[1..], &[0xDE, 0xAD]);

    assert_eq!(sys.take_exception_count(), 0);
}

#[test]
fn test_payload_round_trip_is_identical() {
    let mut sys = two_cubes();

    let payload: Vec<u8> = (0..32).map(|i| i as u8 ^ 0x5A).collect();
    let mut frame = vec![CMD_W_TX_PAYLOAD];
    frame.extend_from_slice(&payload);
    spi_xfer(&mut sys, 0, false, &frame);

    let addr_a = (2u64 << 56) | 0xE7_E7_E7_E7_E7;
    sys.hub.tx(addr_a, 0x99, &[0x00]);
    rfcon(&mut sys, 0, false, true);
    sys.run(RX_INTERVAL_CYCLES);

    // The hub hands the ACK payload back byte-identical
    let ack = sys.hub.rx(0x99).expect("ack not delivered");
    assert_eq!(ack.bytes(), &payload[..]);
}

#[test]
fn test_status_write_one_to_clear_over_spi() {
    let mut sys = two_cubes();

    let addr_a = (2u64 << 56) | 0xE7_E7_E7_E7_E7;
    sys.hub.tx(addr_a, 0x42, &[0x11]);
    rfcon(&mut sys, 0, false, true);
    sys.run(RX_INTERVAL_CYCLES);

    assert_ne!(radio_status(&mut sys, 0, true) & radio::STATUS_RX_DR, 0);

    // Writing 1 to RX_DR clears it; writing 0 leaves the rest alone
    spi_xfer(
        &mut sys,
        0,
        true,
        &[CMD_W_REGISTER | REG_STATUS, radio::STATUS_RX_DR],
    );
    assert_eq!(radio_status(&mut sys, 0, true) & radio::STATUS_RX_DR, 0);
}

#[test]
fn test_radio_irq_line_fires_rf_interrupt() {
    let mut sys = two_cubes();

    let addr_a = (2u64 << 56) | 0xE7_E7_E7_E7_E7;
    sys.hub.tx(addr_a, 0x42, &[0x11]);
    rfcon(&mut sys, 0, false, true);
    sys.run(RX_INTERVAL_CYCLES);

    // RX_DR asserted the IRQ pin edge, latched into IRCON
    let ircon = sys.cube(0).bus.sfr_peek(sfr::REG_IRCON);
    assert_ne!(ircon & sfr::IRCON_RF, 0);
}

#[test]
fn test_radio_dead_without_clock_enable() {
    let mut sys = two_cubes();

    let addr_a = (2u64 << 56) | 0xE7_E7_E7_E7_E7;
    sys.hub.tx(addr_a, 0x42, &[0x11]);

    // CE high but radio clock disabled: no receive opportunities
    sys.cube_mut(0)
        .bus
        .sfr_write(sfr::REG_RFCON, sfr::RFCON_RFCSN | sfr::RFCON_RFCE);
    sys.run(RX_INTERVAL_CYCLES * 2);

    assert_eq!(sys.hub.pending(addr_a), 1);
}

#[test]
fn test_hub_keeps_addresses_apart() {
    let mut hub = NetworkHub::new();
    hub.tx(1, 0, &[1]);
    hub.tx(2, 0, &[2]);
    assert_eq!(hub.rx(1).unwrap().bytes(), &[1]);
    assert_eq!(hub.rx(2).unwrap().bytes(), &[2]);
}
