//! LCD controller
//!
//! SPFD5414-style controller on an 8-bit parallel bus in 80-system mode:
//! commands and data are strobed in on rising WRX edges, DCX selecting
//! which. Pixels land in a 128x128 RGB-565 framebuffer after COLMOD
//! unpacking and MADCTR mirror/swap, with per-panel-model quirks detected
//! from vendor magic command bytes.

use crate::tracer::Tracer;
use crate::vtime::{TickDeadline, VirtualTime};

pub const WIDTH: usize = 128;
pub const HEIGHT: usize = 128;
pub const FB_SIZE: usize = WIDTH * HEIGHT;
const FB_MASK: usize = FB_SIZE - 1;
const FB_ROW_SHIFT: usize = 7;

// Command set
const CMD_SWRESET: u8 = 0x01;
const CMD_SLPIN: u8 = 0x10;
const CMD_SLPOUT: u8 = 0x11;
const CMD_DISPOFF: u8 = 0x28;
const CMD_DISPON: u8 = 0x29;
const CMD_CASET: u8 = 0x2A;
const CMD_RASET: u8 = 0x2B;
const CMD_RAMWR: u8 = 0x2C;
const CMD_TEOFF: u8 = 0x34;
const CMD_TEON: u8 = 0x35;
const CMD_MADCTR: u8 = 0x36;
const CMD_COLMOD: u8 = 0x3A;

const COLMOD_12: u8 = 3;
const COLMOD_16: u8 = 5;
const COLMOD_18: u8 = 6;

const MADCTR_MY: u8 = 0x80;
const MADCTR_MX: u8 = 0x40;
const MADCTR_MV: u8 = 0x20;

// Vendor-specific bytes used to detect which panel the firmware thinks
// it is driving
const CMD_MAGIC_TRULY: u8 = 0xC4;
const CMD_MAGIC_TIANMA_HX8353: u8 = 0xB9;
const CMD_MAGIC_SANTEK_ST7735R: u8 = 0xF6;
const CMD_MAGIC_WNW_RM68116: u8 = 0xF8;

/// Width of the emulated tearing-effect pulse
const TE_WIDTH_US: u64 = 1000;

/// Pin state presented to [`Lcd::cycle`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LcdPins {
    pub power: bool,
    /// Chip select, active-low
    pub csx_n: bool,
    /// Low = command byte, high = data byte
    pub dcx: bool,
    /// Write strobe, rising edge
    pub wrx: bool,
    /// Read strobe; reads are not modelled
    pub rdx: bool,
    pub data_in: u8,
}

/// MADCTR mirroring applied before or after the row/column swap,
/// depending on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum QuirkOrder {
    #[default]
    MirrorBeforeSwap,
    SwapBeforeMirror,
}

/// Per-panel-model emulation quirks
///
/// These undo the model-specific workarounds the firmware applies, so the
/// framebuffer comes out upright regardless of which panel was detected.
#[derive(Debug, Clone, Copy, Default)]
struct PanelModel {
    madctr_xor: u8,
    row_adj: i8,
    col_adj: i8,
    right_margin: u8,
    left_margin: u8,
    top_margin: u8,
    bottom_margin: u8,
    order: QuirkOrder,
}

pub struct Lcd {
    /// 16-bit RGB 5-6-5
    pub fb_mem: [u16; FB_SIZE],

    frame_count: u32,
    pixel_count: u32,
    te_timestamp: u64,
    te_out: bool,

    prev_wrx: bool,

    current_cmd: u8,
    cmd_bytecount: u8,
    pixel_bytes: [u8; 3],

    xs: u16,
    xe: u16,
    ys: u16,
    ye: u16,
    row: u16,
    col: u16,

    madctr: u8,
    colmod: u8,
    mode_awake: bool,
    mode_display_on: bool,
    mode_te: bool,
    mode_power_on: bool,

    model: PanelModel,
}

impl Lcd {
    pub fn new() -> Self {
        let mut lcd = Self {
            fb_mem: [0; FB_SIZE],
            frame_count: 0,
            pixel_count: 0,
            te_timestamp: 0,
            te_out: false,
            prev_wrx: false,
            current_cmd: 0,
            cmd_bytecount: 0,
            pixel_bytes: [0; 3],
            xs: 0,
            xe: 0,
            ys: 0,
            ye: 0,
            row: 0,
            col: 0,
            madctr: 0,
            colmod: 0,
            mode_awake: false,
            mode_display_on: false,
            mode_te: false,
            mode_power_on: false,
            model: PanelModel::default(),
        };
        lcd.init();
        lcd.mode_power_on = true;
        lcd
    }

    /// Controller reset; panel-model detection survives
    fn init(&mut self) {
        // Framebuffer contents are undefined at power-up; simulate that
        for (i, px) in self.fb_mem.iter_mut().enumerate() {
            *px = (31337u32.wrapping_mul(1 + i as u32)) as u16;
        }

        self.current_cmd = 0;
        self.cmd_bytecount = 0;

        self.xs = 0;
        self.xe = WIDTH as u16 - 1;
        self.ys = 0;
        self.ye = HEIGHT as u16 - 1;
        self.row = 0;
        self.col = 0;

        self.madctr = 0;
        self.colmod = COLMOD_18;

        self.mode_awake = false;
        self.mode_display_on = false;
        self.mode_te = false;
        self.mode_power_on = true;

        self.frame_count = 0;
        self.pixel_count = 0;
    }

    /// One bus cycle: react to pin changes
    pub fn cycle(&mut self, pins: &LcdPins, tracer: &mut Tracer) {
        if pins.power {
            if !self.mode_power_on {
                self.init();
            }

            if !pins.csx_n && pins.wrx && !self.prev_wrx {
                if pins.dcx {
                    self.data(pins.data_in);
                } else {
                    if tracer.enabled() {
                        tracer.log("LCD", &format!("command {:02x}", pins.data_in));
                    }
                    self.command(pins.data_in);
                }
            }
        } else {
            self.mode_display_on = false;
            self.mode_awake = false;
            self.mode_power_on = false;
        }

        self.prev_wrx = pins.wrx;
    }

    /// Estimated frames, counted at the DISPON the firmware issues at the
    /// bottom of each one
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn pixel_count(&self) -> u32 {
        self.pixel_count
    }

    pub fn is_visible(&self) -> bool {
        self.mode_awake && self.mode_display_on
    }

    /// Simulated tearing-effect output level
    pub fn te_active(&self) -> bool {
        self.te_out
    }

    /// Begin a TE pulse, if the panel has TE reporting enabled
    pub fn pulse_te(&mut self, vtime: &VirtualTime) {
        if self.mode_te {
            self.te_timestamp = vtime.clocks + vtime.usec(TE_WIDTH_US);
        }
    }

    /// Drive the TE output until its deadline passes
    pub fn tick(&mut self, deadline: &mut TickDeadline) {
        if deadline.has_passed(self.te_timestamp) {
            self.te_out = false;
        } else {
            self.te_out = true;
            deadline.set(self.te_timestamp);
        }
    }

    fn first_pixel(&mut self) {
        self.row = self.ys;
        self.col = self.xs;
    }

    fn apply_mirroring(flags: u8, row: &mut u16, col: &mut u16) {
        if flags & MADCTR_MY != 0 {
            *row = HEIGHT as u16 - 1 - *row;
        }
        if flags & MADCTR_MX != 0 {
            *col = WIDTH as u16 - 1 - *col;
        }
    }

    fn write_pixel(&mut self, pixel: u16) {
        let mut v_row = self.row;
        let mut v_col = self.col;
        let m = self.madctr ^ self.model.madctr_xor;

        if self.model.order == QuirkOrder::MirrorBeforeSwap {
            Self::apply_mirroring(m, &mut v_row, &mut v_col);
        }

        v_row = v_row.wrapping_add(self.model.row_adj as u16);
        v_col = v_col.wrapping_add(self.model.col_adj as u16);

        if m & MADCTR_MV != 0 {
            std::mem::swap(&mut v_row, &mut v_col);
        }

        if self.model.order == QuirkOrder::SwapBeforeMirror {
            Self::apply_mirroring(m, &mut v_row, &mut v_col);
        }

        let addr = v_col as usize + ((v_row as usize) << FB_ROW_SHIFT);
        self.fb_mem[addr & FB_MASK] = pixel;

        self.col += 1;
        if self.col > self.xe {
            self.col = self.xs;
            self.row += 1;
            if self.row > self.ye {
                self.row = self.ys;
            }
        }

        self.pixel_count += 1;
    }

    fn write_byte(&mut self, byte: u8) {
        self.pixel_bytes[self.cmd_bytecount as usize % 3] = byte;
        self.cmd_bytecount += 1;

        match self.colmod {
            COLMOD_12 => {
                if self.cmd_bytecount == 3 {
                    let r1 = self.pixel_bytes[0] >> 4;
                    let g1 = self.pixel_bytes[0] & 0x0F;
                    let b1 = self.pixel_bytes[1] >> 4;

                    let r2 = self.pixel_bytes[1] & 0x0F;
                    let g2 = self.pixel_bytes[2] >> 4;
                    let b2 = self.pixel_bytes[2] & 0x0F;

                    self.cmd_bytecount = 0;

                    self.write_pixel(
                        ((r1 as u16) << 12)
                            | ((r1 as u16 >> 3) << 11)
                            | ((g1 as u16) << 7)
                            | ((g1 as u16 >> 2) << 5)
                            | ((b1 as u16) << 1)
                            | (b1 as u16 >> 3),
                    );
                    self.write_pixel(
                        ((r2 as u16) << 12)
                            | ((r2 as u16 >> 3) << 11)
                            | ((g2 as u16) << 7)
                            | ((g2 as u16 >> 2) << 5)
                            | ((b2 as u16) << 1)
                            | (b2 as u16 >> 3),
                    );
                }
            }

            COLMOD_16 => {
                if self.cmd_bytecount == 2 {
                    self.cmd_bytecount = 0;
                    self.write_pixel(((self.pixel_bytes[0] as u16) << 8) | self.pixel_bytes[1] as u16);
                }
            }

            COLMOD_18 => {
                if self.cmd_bytecount == 3 {
                    let r = (self.pixel_bytes[0] >> 3) as u16;
                    let g = (self.pixel_bytes[1] >> 2) as u16;
                    let b = (self.pixel_bytes[2] >> 3) as u16;

                    self.cmd_bytecount = 0;
                    self.write_pixel((r << 11) | (g << 5) | b);
                }
            }

            _ => self.cmd_bytecount = 0,
        }
    }

    fn command(&mut self, op: u8) {
        self.current_cmd = op;
        self.cmd_bytecount = 0;

        match op {
            CMD_RAMWR => self.first_pixel(),
            CMD_SWRESET => self.init(),
            CMD_SLPIN => self.mode_awake = false,
            CMD_SLPOUT => self.mode_awake = true,
            CMD_DISPOFF => self.mode_display_on = false,
            CMD_DISPON => {
                self.mode_display_on = true;
                // Firmware issues DISPON at the bottom of every frame, so
                // it doubles as a frame probe even in modes that
                // re-address the panel mid-frame
                self.frame_count += 1;
            }
            CMD_TEOFF => self.mode_te = false,
            CMD_TEON => self.mode_te = true,

            CMD_MAGIC_TRULY => {
                self.model = PanelModel {
                    madctr_xor: MADCTR_MX | MADCTR_MY,
                    top_margin: 32,
                    order: QuirkOrder::SwapBeforeMirror,
                    ..PanelModel::default()
                };
            }
            CMD_MAGIC_TIANMA_HX8353 | CMD_MAGIC_WNW_RM68116 => {
                self.model = PanelModel {
                    madctr_xor: MADCTR_MX | MADCTR_MY,
                    order: QuirkOrder::SwapBeforeMirror,
                    ..PanelModel::default()
                };
            }
            CMD_MAGIC_SANTEK_ST7735R => {
                self.model = PanelModel {
                    madctr_xor: MADCTR_MX | MADCTR_MY,
                    left_margin: 2,
                    right_margin: 2,
                    top_margin: 1,
                    bottom_margin: 33,
                    order: QuirkOrder::SwapBeforeMirror,
                    ..PanelModel::default()
                };
            }

            _ => {}
        }
    }

    fn data(&mut self, byte: u8) {
        match self.current_cmd {
            // Window bytes arrive as 16-bit big-endian pairs; only the low
            // bytes matter on a 128-pixel panel. A 2-byte CASET/RASET
            // collapses the window to a single column/row.
            CMD_CASET => {
                match self.cmd_bytecount {
                    1 => {
                        self.xs = byte as u16;
                        self.xe = byte as u16;
                    }
                    3 => self.xe = byte as u16,
                    _ => {}
                }
                self.cmd_bytecount += 1;
            }
            CMD_RASET => {
                match self.cmd_bytecount {
                    1 => {
                        self.ys = byte as u16;
                        self.ye = byte as u16;
                    }
                    3 => self.ye = byte as u16,
                    _ => {}
                }
                self.cmd_bytecount += 1;
            }

            CMD_MADCTR => {
                self.madctr = byte;
                self.model.row_adj = if self.madctr & MADCTR_MY != 0 {
                    -(self.model.bottom_margin as i8)
                } else {
                    -(self.model.top_margin as i8)
                };
                self.model.col_adj = if self.madctr & MADCTR_MX != 0 {
                    -(self.model.right_margin as i8)
                } else {
                    -(self.model.left_margin as i8)
                };
                if self.madctr & MADCTR_MV != 0 {
                    std::mem::swap(&mut self.model.row_adj, &mut self.model.col_adj);
                }
            }

            CMD_COLMOD => self.colmod = byte,

            CMD_RAMWR => self.write_byte(byte),

            _ => {}
        }
    }
}

impl Default for Lcd {
    fn default() -> Self {
        Self::new()
    }
}
