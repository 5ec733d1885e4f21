//! An in-memory SD card that speaks the SPI protocol byte by byte.
//! One `SimCard` sits behind an `Rc<RefCell<_>>` with separate bus and
//! chip-select handles, the same split the driver sees on hardware.

use sdspi_rs::{
    crc16,
    crc7,
    ChipSelect,
    SdSpi,
    BLOCK_SIZE,
};
use std::cell::RefCell;
use std::collections::{
    HashMap,
    VecDeque,
};
use std::rc::Rc;
use std::sync::atomic::{
    AtomicU32,
    Ordering,
};

/// Monotonic fake millisecond clock; each call is one tick.
pub fn sim_millis() -> u32 {
    static TICKS: AtomicU32 = AtomicU32::new(0);
    TICKS.fetch_add(1, Ordering::Relaxed)
}

#[derive(Default)]
pub struct Faults {
    /// Flip one bit in the CRC trailer of every block read.
    pub corrupt_read_crc: bool,
    /// Never emit the data-start token after a read-class command.
    pub drop_data_token: bool,
    /// Answer every written block with the reject data-response.
    pub reject_writes: bool,
    /// Hold the busy signal forever after a write is accepted.
    pub stay_busy_after_write: bool,
    /// Stop responding entirely; the bus reads back idle.
    pub dead: bool,
    /// ACMD41 never leaves the in-idle state.
    pub never_ready_acmd41: bool,
}

struct WriteState {
    block: u32,
    incoming: Vec<u8>,
}

pub struct SimCard {
    pub faults: Faults,
    pub high_capacity: bool,
    csd: [u8; 16],
    blocks: HashMap<u32, [u8; BLOCK_SIZE]>,
    cs_low: bool,
    app_cmd: bool,
    /// How many times ACMD41 answers in-idle before reporting ready.
    pub acmd41_busy_polls: u32,
    frame: Vec<u8>,
    queue: VecDeque<u8>,
    write: Option<WriteState>,
    busy_hold: bool,
    /// Total byte exchanges seen, fault or not.
    pub transfers: u64,
    /// CMD0/CMD8 frames whose CRC7 did not check out.
    pub bad_crc_frames: u32,
    /// Every rate the driver asked for, in order.
    pub baud_history: Vec<u32>,
    /// Argument of the last CMD16 seen, if any.
    pub cmd16_arg: Option<u32>,
    /// Argument of the last CMD17 seen, if any.
    pub last_read_arg: Option<u32>,
    /// Argument of the last CMD24 seen, if any.
    pub last_write_arg: Option<u32>,
    /// CRC trailer check outcome of the last completed write.
    pub last_write_crc_ok: Option<bool>,
}

impl SimCard {
    pub fn new(high_capacity: bool, csd: [u8; 16]) -> SimCard {
        SimCard {
            faults: Faults::default(),
            high_capacity,
            csd,
            blocks: HashMap::new(),
            cs_low: false,
            app_cmd: false,
            acmd41_busy_polls: 3,
            frame: Vec::new(),
            queue: VecDeque::new(),
            write: None,
            busy_hold: false,
            transfers: 0,
            bad_crc_frames: 0,
            baud_history: Vec::new(),
            cmd16_arg: None,
            last_read_arg: None,
            last_write_arg: None,
            last_write_crc_ok: None,
        }
    }

    /// A standard-capacity card whose CSD v2 encodes the minimum size
    /// field: 1024 blocks.
    pub fn standard_capacity() -> SimCard {
        SimCard::new(false, csd_v2(0))
    }

    /// A high-capacity card with `(c_size + 1) * 1024` blocks.
    pub fn high_capacity(c_size: u32) -> SimCard {
        SimCard::new(true, csd_v2(c_size))
    }

    pub fn block_count(&self) -> u32 {
        let c_size = ((self.csd[7] & 0x3f) as u32) << 16
            | (self.csd[8] as u32) << 8
            | self.csd[9] as u32;
        (c_size + 1) * 1024
    }

    pub fn block(&self, block: u32) -> [u8; BLOCK_SIZE] {
        self.blocks.get(&block).copied().unwrap_or([0; BLOCK_SIZE])
    }

    pub fn set_block(&mut self, block: u32, data: [u8; BLOCK_SIZE]) {
        self.blocks.insert(block, data);
    }

    fn exchange(&mut self, tx: u8) -> u8 {
        self.transfers += 1;
        if !self.cs_low || self.faults.dead {
            return 0xff;
        }
        if let Some(byte) = self.queue.pop_front() {
            return byte;
        }
        if self.busy_hold {
            return 0x00;
        }
        if self.write.is_some() {
            self.feed_write(tx);
            return 0xff;
        }
        // Only a marker byte starts a frame; everything else is the
        // host clocking the bus.
        if self.frame.is_empty() && tx & 0xc0 != 0x40 {
            return 0xff;
        }
        self.frame.push(tx);
        if self.frame.len() == 6 {
            let frame: Vec<u8> = self.frame.drain(..).collect();
            self.execute(&frame);
        }
        0xff
    }

    fn execute(&mut self, frame: &[u8]) {
        let opcode = frame[0] & 0x3f;
        let arg = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
        if (opcode == 0 || opcode == 8) && frame[5] != crc7(&frame[..5]) {
            self.bad_crc_frames += 1;
        }

        // Cards take a couple of clocks before R1 appears.
        self.queue.push_back(0xff);
        self.queue.push_back(0xff);

        let app_cmd = self.app_cmd;
        self.app_cmd = false;
        match opcode {
            0 => self.queue.push_back(0x01),
            8 => {
                self.queue.push_back(0x01);
                self.queue.extend(arg.to_be_bytes().iter().copied());
            },
            55 => {
                self.app_cmd = true;
                self.queue.push_back(0x01);
            },
            41 if app_cmd => {
                if self.faults.never_ready_acmd41 || self.acmd41_busy_polls > 0 {
                    self.acmd41_busy_polls = self.acmd41_busy_polls.saturating_sub(1);
                    self.queue.push_back(0x01);
                } else {
                    self.queue.push_back(0x00);
                }
            },
            58 => {
                self.queue.push_back(0x00);
                let ocr0 = if self.high_capacity { 0xc0 } else { 0x80 };
                self.queue.extend([ocr0, 0xff, 0x80, 0x00].iter().copied());
            },
            9 => {
                self.queue.push_back(0x00);
                if !self.faults.drop_data_token {
                    self.queue.push_back(0xff);
                    self.queue.push_back(0xfe);
                    let csd = self.csd;
                    self.queue.extend(csd.iter().copied());
                    self.queue.extend(crc16(&csd).to_be_bytes().iter().copied());
                }
            },
            16 => {
                self.cmd16_arg = Some(arg);
                self.queue.push_back(0x00);
            },
            17 => {
                self.last_read_arg = Some(arg);
                self.queue.push_back(0x00);
                if !self.faults.drop_data_token {
                    let block = self.arg_to_block(arg);
                    let data = self.block(block);
                    let mut crc = crc16(&data);
                    if self.faults.corrupt_read_crc {
                        crc ^= 0x0001;
                    }
                    self.queue.push_back(0xff);
                    self.queue.push_back(0xfe);
                    self.queue.extend(data.iter().copied());
                    self.queue.extend(crc.to_be_bytes().iter().copied());
                }
            },
            24 => {
                self.last_write_arg = Some(arg);
                self.queue.push_back(0x00);
                let block = self.arg_to_block(arg);
                self.write = Some(WriteState {
                    block,
                    incoming: Vec::new(),
                });
            },
            _ => self.queue.push_back(0x04), // illegal command
        }
    }

    fn feed_write(&mut self, tx: u8) {
        let done = {
            let state = self.write.as_mut().unwrap();
            if state.incoming.is_empty() && tx != 0xfe {
                // Still waiting for the data-start token.
                return;
            }
            state.incoming.push(tx);
            state.incoming.len() == 1 + BLOCK_SIZE + 2
        };
        if !done {
            return;
        }

        let state = self.write.take().unwrap();
        let mut data = [0u8; BLOCK_SIZE];
        data.copy_from_slice(&state.incoming[1..1 + BLOCK_SIZE]);
        let wire_crc =
            u16::from_be_bytes([state.incoming[513], state.incoming[514]]);
        self.last_write_crc_ok = Some(wire_crc == crc16(&data));

        if self.faults.reject_writes {
            self.queue.push_back(0x0d);
            return;
        }
        self.blocks.insert(state.block, data);
        self.queue.push_back(0x05);
        if self.faults.stay_busy_after_write {
            self.busy_hold = true;
        } else {
            // A short programming window, then idle again.
            self.queue.extend([0x00, 0x00, 0x00].iter().copied());
        }
    }

    fn arg_to_block(&self, arg: u32) -> u32 {
        if self.high_capacity {
            arg
        } else {
            arg / BLOCK_SIZE as u32
        }
    }
}

pub fn csd_v2(c_size: u32) -> [u8; 16] {
    let mut csd = [0u8; 16];
    csd[0] = 0x40;
    csd[7] = ((c_size >> 16) & 0x3f) as u8;
    csd[8] = (c_size >> 8) as u8;
    csd[9] = c_size as u8;
    csd
}

pub fn csd_v1(c_size: u16, c_size_mult: u8, read_bl_len: u8) -> [u8; 16] {
    let mut csd = [0u8; 16];
    csd[5] = read_bl_len & 0x0f;
    csd[6] = ((c_size >> 10) & 0x03) as u8;
    csd[7] = (c_size >> 2) as u8;
    csd[8] = ((c_size & 0x03) as u8) << 6;
    csd[9] = (c_size_mult >> 1) & 0x03;
    csd[10] = (c_size_mult & 0x01) << 7;
    csd
}

pub struct SimBus(Rc<RefCell<SimCard>>);

impl SdSpi for SimBus {
    fn transfer(&mut self, byte: u8) -> u8 {
        self.0.borrow_mut().exchange(byte)
    }

    fn set_baud_rate(&mut self, hz: u32) {
        self.0.borrow_mut().baud_history.push(hz);
    }
}

pub struct SimCs(Rc<RefCell<SimCard>>);

impl ChipSelect for SimCs {
    fn assert(&mut self) {
        self.0.borrow_mut().cs_low = true;
    }

    fn deassert(&mut self) {
        let mut card = self.0.borrow_mut();
        card.cs_low = false;
        // Deselecting resets the card's command parser and discards
        // unread response bytes.
        card.frame.clear();
        card.queue.clear();
        card.write = None;
    }
}

/// Splits one simulated card into the bus handle, the chip-select
/// handle, and an inspection handle for assertions.
pub fn rig(card: SimCard) -> (SimBus, SimCs, Rc<RefCell<SimCard>>) {
    let shared = Rc::new(RefCell::new(card));
    (SimBus(shared.clone()), SimCs(shared.clone()), shared)
}
