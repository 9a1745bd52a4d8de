//! The seam between the coordination core and an actual MCU connection.
//!
//! Wire framing, retransmission and ack tracking belong to the serial
//! transport, not here (see spec's out-of-scope note); this module only
//! defines what the core needs from that transport, plus two test/replay
//! doubles that let the rest of the crate be exercised without a real
//! port. Mirrors the seam `mcu.py`'s `MCU` class treats its `SerialReader`
//! object as.

use std::collections::VecDeque;
use std::io::Write;

use mcu_proto::{Dictionary, EncodedCommand};

/// Something the firmware told us about, outside the request/response flow
/// of a single command.
#[derive(Debug, Clone, PartialEq)]
pub enum McuEvent {
    Shutdown { message: String },
    IsShutdown { message: String },
    Stats { count: u32, sum: u64, sumsq: u64 },
    EndStopState { oid: u8, homing: bool },
    /// `value` and `next_clock` are raw, untranslated firmware fields —
    /// the device object applies ADC scaling and clock translation.
    AnalogInState { oid: u8, value: u16, next_clock: u64 },
}

/// The firmware's reply to a `get_config` request during the commit
/// handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigResponse {
    pub is_config: bool,
    pub crc: u32,
    pub move_count: usize,
}

/// Opaque handle grouping a device object's sends for retransmission
/// ordering, mirroring `mcu.alloc_command_queue()`'s `cmd_queue` token.
/// The core never interprets this value, only forwards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandQueueId(u32);

/// What the coordination core needs from a connected MCU.
///
/// Kept synchronous and object-safe: the core's algorithms (step
/// compression, clock mapping) are pure computation, so suspension is
/// reserved for the handshake and idle wait the caller drives explicitly,
/// not buried in every send.
pub trait SerialLink {
    /// The command template dictionary this link negotiated at connect
    /// time.
    fn dictionary(&self) -> &Dictionary;

    /// Allocates a fresh [`CommandQueueId`], mirroring
    /// `mcu.alloc_command_queue()`.
    fn alloc_command_queue(&mut self) -> CommandQueueId;

    /// Sends an already-encoded command. Does not block for an ack.
    ///
    /// `minclock` withholds transmission until at least that MCU clock
    /// (typically the device's own previous scheduled clock); `reqclock`
    /// is the clock the command is meant to execute at, used for
    /// scheduling/ordering; `cq` groups the send with a device object's
    /// other sends for retransmission ordering. Mirrors
    /// `mcu.py`'s `MCU.send(msg, minclock=..., reqclock=..., cq=...)`.
    fn send(
        &mut self,
        command: &EncodedCommand,
        minclock: u64,
        reqclock: u64,
        cq: Option<CommandQueueId>,
    ) -> Result<(), String>;

    /// Flushes whatever is currently ready to send, without sending a new
    /// command. Mirrors the bare `serial.send_flush()` call
    /// `MCU_endstop.home_finalize` makes.
    fn flush_sends(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// The MCU's current clock, as of the last status sample.
    fn get_clock(&self) -> u64;

    /// The most recent clock value the firmware itself reported back
    /// (distinct from `get_clock`, which may be host-estimated between
    /// samples).
    fn get_last_clock(&self) -> u64;

    /// Converts a clock value from another MCU's clock domain into this
    /// MCU's domain, for multi-MCU synchronization. Identity when there is
    /// only one MCU.
    fn translate_clock(&self, foreign_clock: u64) -> u64 {
        foreign_clock
    }

    /// A short human-readable transport state dump, for fatal error
    /// reporting.
    fn dump_debug(&self) -> String;

    /// Drains firmware-originated events accumulated since the last call.
    fn drain_events(&mut self) -> Vec<McuEvent>;

    /// Blocks for one `get_config` round trip, as the commit handshake
    /// loop in `MCU._send_config` does. Offline replay links never call
    /// this (config is a no-op there).
    fn request_config(&mut self) -> Result<ConfigResponse, String>;
}

/// In-memory [`SerialLink`] for tests: records every command sent and lets
/// the test inject events for the core to observe on the next pump.
#[derive(Debug)]
pub struct MockSerialLink {
    dictionary: Dictionary,
    sent: Vec<EncodedCommand>,
    sent_clocks: Vec<(u64, u64, Option<CommandQueueId>)>,
    pending_events: Vec<McuEvent>,
    config_responses: VecDeque<ConfigResponse>,
    clock: u64,
    last_clock: u64,
    next_cq: u32,
    flush_count: u32,
}

impl MockSerialLink {
    pub fn new(dictionary: Dictionary) -> Self {
        Self {
            dictionary,
            sent: Vec::new(),
            sent_clocks: Vec::new(),
            pending_events: Vec::new(),
            config_responses: VecDeque::new(),
            clock: 0,
            last_clock: 0,
            next_cq: 0,
            flush_count: 0,
        }
    }

    /// Every command sent so far, in order.
    pub fn sent(&self) -> &[EncodedCommand] {
        &self.sent
    }

    /// The `(minclock, reqclock, cq)` each [`MockSerialLink::sent`] command
    /// was sent with, in the same order.
    pub fn sent_clocks(&self) -> &[(u64, u64, Option<CommandQueueId>)] {
        &self.sent_clocks
    }

    /// How many times [`SerialLink::flush_sends`] has been called.
    pub fn flush_count(&self) -> u32 {
        self.flush_count
    }

    /// Lets a test simulate the firmware advancing its clock.
    pub fn advance_clock(&mut self, ticks: u64) {
        self.clock += ticks;
        self.last_clock = self.clock;
    }

    /// Queues an event to be returned from the next `drain_events`.
    pub fn push_event(&mut self, event: McuEvent) {
        self.pending_events.push(event);
    }

    /// Queues the response the next `request_config` call will pop.
    pub fn queue_config_response(&mut self, response: ConfigResponse) {
        self.config_responses.push_back(response);
    }
}

impl SerialLink for MockSerialLink {
    fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    fn alloc_command_queue(&mut self) -> CommandQueueId {
        let id = CommandQueueId(self.next_cq);
        self.next_cq += 1;
        id
    }

    fn send(
        &mut self,
        command: &EncodedCommand,
        minclock: u64,
        reqclock: u64,
        cq: Option<CommandQueueId>,
    ) -> Result<(), String> {
        self.sent.push(command.clone());
        self.sent_clocks.push((minclock, reqclock, cq));
        Ok(())
    }

    fn flush_sends(&mut self) -> Result<(), String> {
        self.flush_count += 1;
        Ok(())
    }

    fn get_clock(&self) -> u64 {
        self.clock
    }

    fn get_last_clock(&self) -> u64 {
        self.last_clock
    }

    fn dump_debug(&self) -> String {
        format!("MockSerialLink: {} commands sent, clock={}", self.sent.len(), self.clock)
    }

    fn drain_events(&mut self) -> Vec<McuEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn request_config(&mut self) -> Result<ConfigResponse, String> {
        self.config_responses
            .pop_front()
            .ok_or_else(|| "no config response queued".to_string())
    }
}

/// Backs Offline Replay Mode: every sent command is rendered as a text
/// trace line instead of going to a port, and there is no firmware on the
/// other end to report events.
pub struct OfflineSerialLink<W: Write> {
    dictionary: Dictionary,
    sink: W,
    clock: u64,
    next_cq: u32,
}

impl<W: Write> OfflineSerialLink<W> {
    pub fn new(dictionary: Dictionary, sink: W) -> Self {
        Self { dictionary, sink, clock: 0, next_cq: 0 }
    }

    /// Advances the synthetic clock the replay reports, used by callers
    /// pacing a trace against wall time.
    pub fn set_clock(&mut self, clock: u64) {
        self.clock = clock;
    }
}

impl<W: Write> SerialLink for OfflineSerialLink<W> {
    fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    fn alloc_command_queue(&mut self) -> CommandQueueId {
        let id = CommandQueueId(self.next_cq);
        self.next_cq += 1;
        id
    }

    fn send(
        &mut self,
        command: &EncodedCommand,
        _minclock: u64,
        _reqclock: u64,
        _cq: Option<CommandQueueId>,
    ) -> Result<(), String> {
        writeln!(self.sink, "{command}").map_err(|e| e.to_string())
    }

    fn flush_sends(&mut self) -> Result<(), String> {
        self.sink.flush().map_err(|e| e.to_string())
    }

    fn get_clock(&self) -> u64 {
        self.clock
    }

    fn get_last_clock(&self) -> u64 {
        self.clock
    }

    fn dump_debug(&self) -> String {
        format!("OfflineSerialLink: clock={}", self.clock)
    }

    fn drain_events(&mut self) -> Vec<McuEvent> {
        Vec::new()
    }

    fn request_config(&mut self) -> Result<ConfigResponse, String> {
        // Offline replay never negotiates a config CRC with real firmware;
        // callers should not reach this (see `McuSession::connect_file`).
        Err("offline replay has no firmware to confirm config with".to_string())
    }
}
