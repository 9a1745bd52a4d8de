//! MCU Session: connect, build-config, commit handshake and runtime ops.
//!
//! Grounded on the `MCU` class in `mcu.py`: `create_oid`/`add_config_cmd`,
//! `build_config`/`_send_config`, `create_stepper`/`create_endstop`/
//! `create_digital_out`/`create_pwm`/`create_adc`, and the clock-syncing
//! and stats wrappers. The reactor-driven `send_with_response` polling
//! loop becomes an explicit [`McuSession::commit`] call the owner of the
//! I/O drives itself, since this core has no event loop of its own.

use tracing::{debug, info, warn};

use mcu_proto::{crc32, EncodedCommand};

use crate::clock::ClockMapper;
use crate::config::McuSessionConfig;
use crate::devices::{Adc, DigitalOut, Endstop, Pwm, Stepper};
use crate::error::McuError;
use crate::pins::{IdentityPinMap, PinMap};
use crate::serial_link::{CommandQueueId, ConfigResponse, McuEvent, SerialLink};
use crate::stats::TickStats;
use crate::steppersync::{Dispatch, StepperSynchroniser};

/// One connected MCU and everything built on top of it.
pub struct McuSession<L: SerialLink> {
    link: L,
    config: McuSessionConfig,
    clock: ClockMapper,
    stats: TickStats,
    num_oids: u8,
    config_cmds: Vec<String>,
    config_crc: Option<u32>,
    steppers: Vec<Stepper>,
    endstops: Vec<Endstop>,
    digital_outs: Vec<DigitalOut>,
    pwms: Vec<Pwm>,
    adcs: Vec<Adc>,
    synchroniser: Option<StepperSynchroniser>,
    is_shutdown: bool,
    offline: bool,
    pace: bool,
    pin_map: Box<dyn PinMap>,
}

impl<L: SerialLink> McuSession<L> {
    /// Normal connect: reads `CLOCK_FREQ` out of the link's negotiated
    /// dictionary and prepares for `build_config`/`commit`.
    pub fn connect(link: L, config: McuSessionConfig) -> Result<Self, McuError> {
        Self::new(link, config, false, false)
    }

    /// Offline Replay Mode: `build_config` becomes a no-op that
    /// initializes the Synchroniser with a fixed capacity of 500, skipping
    /// the CRC handshake entirely. When `pace` is false, print-time
    /// tracking is neutered too (`get_print_buffer_time` always returns
    /// 0.25s).
    pub fn connect_file(link: L, config: McuSessionConfig, pace: bool) -> Result<Self, McuError> {
        Self::new(link, config, true, pace)
    }

    fn new(link: L, config: McuSessionConfig, offline: bool, pace: bool) -> Result<Self, McuError> {
        let clock_freq: f64 = link.dictionary().config("CLOCK_FREQ")?.parse().map_err(|_| {
            McuError::LinkIo("CLOCK_FREQ in firmware dictionary is not a number".to_string())
        })?;
        Ok(Self {
            link,
            config,
            clock: ClockMapper::new(clock_freq),
            stats: TickStats::new(),
            num_oids: 0,
            config_cmds: Vec::new(),
            config_crc: None,
            steppers: Vec::new(),
            endstops: Vec::new(),
            digital_outs: Vec::new(),
            pwms: Vec::new(),
            adcs: Vec::new(),
            synchroniser: None,
            is_shutdown: false,
            offline,
            pace,
            pin_map: Box::new(IdentityPinMap),
        })
    }

    /// Installs a symbolic pin-alias table for this session's pin names and
    /// config lines, mirroring `[mcu pin_map]`'s indirection. Defaults to
    /// [`IdentityPinMap`] (no rewriting) when never called.
    pub fn set_pin_map(&mut self, pin_map: Box<dyn PinMap>) {
        self.pin_map = pin_map;
    }

    fn clock_freq(&self) -> f64 {
        self.clock.clock_freq()
    }

    pub fn create_oid(&mut self) -> u8 {
        let oid = self.num_oids;
        self.num_oids += 1;
        oid
    }

    pub fn add_config_cmd(&mut self, cmd: impl Into<String>) {
        self.config_cmds.push(cmd.into());
    }

    // -- Device object factories -------------------------------------

    pub fn create_stepper(
        &mut self,
        step_pin: &str,
        dir_pin: &str,
        min_stop_interval: u32,
        max_error: u32,
    ) -> Result<u8, McuError> {
        let oid = self.create_oid();
        let step_pin = self.pin_map.map_pin(step_pin);
        let dir_pin = self.pin_map.map_pin(dir_pin);
        let (stepper, config_cmd) =
            Stepper::new(oid, &step_pin, &dir_pin, min_stop_interval, max_error, self.link.dictionary())?;
        self.add_config_cmd(config_cmd);
        self.steppers.push(stepper);
        Ok(oid)
    }

    pub fn create_endstop(&mut self, pin: &str, stepper_oid: u8) -> Result<u8, McuError> {
        let oid = self.create_oid();
        let pin = self.pin_map.map_pin(pin);
        let (endstop, config_cmd) =
            Endstop::new(oid, &pin, stepper_oid, self.clock_freq(), self.link.dictionary())?;
        self.add_config_cmd(config_cmd);
        self.endstops.push(endstop);
        Ok(oid)
    }

    pub fn create_digital_out(&mut self, pin: &str, max_duration_secs: f64) -> Result<u8, McuError> {
        let oid = self.create_oid();
        let pin = self.pin_map.map_pin(pin);
        let max_duration = (max_duration_secs * self.clock_freq()) as u32;
        let (dout, config_cmd) = DigitalOut::new(oid, &pin, max_duration, self.link.dictionary())?;
        self.add_config_cmd(config_cmd);
        self.digital_outs.push(dout);
        Ok(oid)
    }

    /// `hard_cycle_ticks == 0` selects a software-cycled PWM at a fixed
    /// 10Hz cycle. The `hard_cycle_ticks < 0` branch below can never run —
    /// the preceding truthiness check already claims every nonzero value,
    /// positive or negative — but the original host keeps it, so it's kept
    /// here too rather than "corrected" away.
    pub fn create_pwm(
        &mut self,
        pin: &str,
        hard_cycle_ticks: i32,
        max_duration_secs: f64,
    ) -> Result<u8, McuError> {
        let pin = self.pin_map.map_pin(pin);
        let max_duration = (max_duration_secs * self.clock_freq()) as u32;
        if hard_cycle_ticks != 0 {
            let oid = self.create_oid();
            let (pwm, config_cmd) = Pwm::new(
                oid,
                &pin,
                hard_cycle_ticks as u32,
                max_duration,
                true,
                self.link.dictionary(),
            )?;
            self.add_config_cmd(config_cmd);
            self.pwms.push(pwm);
            return Ok(oid);
        }
        if hard_cycle_ticks < 0 {
            let oid = self.create_oid();
            let (dout, config_cmd) = DigitalOut::new(oid, &pin, max_duration, self.link.dictionary())?;
            self.add_config_cmd(config_cmd);
            self.digital_outs.push(dout);
            return Ok(oid);
        }
        let oid = self.create_oid();
        let cycle_ticks = (self.clock_freq() / 10.0) as u32;
        let (pwm, config_cmd) =
            Pwm::new(oid, &pin, cycle_ticks, max_duration, false, self.link.dictionary())?;
        self.add_config_cmd(config_cmd);
        self.pwms.push(pwm);
        Ok(oid)
    }

    pub fn create_adc(&mut self, pin: &str) -> Result<u8, McuError> {
        let oid = self.create_oid();
        let pin = self.pin_map.map_pin(pin);
        let (adc, config_cmd) = Adc::new(oid, &pin, self.link.dictionary())?;
        self.add_config_cmd(config_cmd);
        self.adcs.push(adc);
        Ok(oid)
    }

    // -- Configuration phase ------------------------------------------

    /// Appends the `[mcu]` section's raw `custom` lines, ahead of
    /// everything else, mirroring `MCU._add_custom`.
    fn add_custom(&mut self) {
        let lines = self.config.custom_commands();
        for line in lines {
            self.add_config_cmd(line);
        }
    }

    /// Renders the full config command list, computes its CRC, and runs
    /// the commit handshake (or, in offline mode, just initializes the
    /// Synchroniser with a fixed capacity).
    pub fn build_config(&mut self) -> Result<(), McuError> {
        if self.offline {
            self.synchroniser = Some(StepperSynchroniser::new(500));
            debug!("offline replay: synchroniser initialized with capacity 500");
            return Ok(());
        }

        self.add_custom();
        self.config_cmds.insert(0, format!("allocate_oids count={}", self.num_oids));

        let joined = self.rendered_config_cmds().join("\n");
        let crc = crc32(joined.as_bytes());
        self.config_crc = Some(crc);
        self.add_config_cmd(format!("finalize_config crc={crc}"));

        self.commit()
    }

    /// `config_cmds`, each passed through [`PinMap::update_command`] —
    /// what actually gets hashed into the config CRC and sent to the
    /// firmware, mirroring `mcu.py`'s `update_command` rewrite step.
    fn rendered_config_cmds(&self) -> Vec<String> {
        self.config_cmds.iter().map(|c| self.pin_map.update_command(c)).collect()
    }

    /// The request/response loop real Klipper drives through its reactor:
    /// ask the firmware whether it's configured, push config commands if
    /// not, then verify the CRC it reports back matches ours.
    fn commit(&mut self) -> Result<(), McuError> {
        loop {
            let response = self
                .link
                .request_config()
                .map_err(McuError::LinkIo)?;
            if !response.is_config {
                for cmd in self.rendered_config_cmds() {
                    let encoded = mcu_proto::template::create_command(&cmd, 0);
                    self.link.send(&encoded, 0, 0, None).map_err(McuError::LinkIo)?;
                }
                continue;
            }
            let expected = self.config_crc.expect("crc computed before commit runs");
            if expected != response.crc {
                return Err(McuError::ConfigMismatch { expected, got: response.crc });
            }
            info!("mcu configured, move_count={}", response.move_count);
            self.synchroniser = Some(StepperSynchroniser::new(response.move_count));
            return Ok(());
        }
    }

    // -- Runtime --------------------------------------------------------

    /// Folds in every firmware event accumulated since the last call:
    /// shutdown notices, stats reports, endstop/ADC state updates.
    pub fn pump(&mut self) -> Result<(), McuError> {
        let events = self.link.drain_events();
        for event in events {
            match event {
                McuEvent::Shutdown { message } | McuEvent::IsShutdown { message } => {
                    self.handle_shutdown("mcu", &message);
                }
                McuEvent::Stats { count, sum, sumsq } => {
                    self.stats.update(self.clock_freq(), count, sum, sumsq);
                }
                McuEvent::EndStopState { oid, homing } => {
                    if let Some(e) = self.endstops.iter_mut().find(|e| e.oid() == oid) {
                        e.handle_end_stop_state(homing);
                    }
                }
                McuEvent::AnalogInState { oid, value, next_clock } => {
                    let translated = self.link.translate_clock(next_clock);
                    if let Some(a) = self.adcs.iter_mut().find(|a| a.oid() == oid) {
                        a.handle_analog_in_state(value, translated);
                    }
                }
            }
            if self.is_shutdown {
                return Err(McuError::FirmwareShutdown {
                    name: "mcu".to_string(),
                    message: "firmware reported shutdown".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Idempotent: only the first call actually transitions state and
    /// logs.
    pub fn handle_shutdown(&mut self, name: &str, message: &str) {
        if self.is_shutdown {
            return;
        }
        self.is_shutdown = true;
        warn!(mcu = name, message, "mcu shut down");
        debug!(debug = %self.link.dump_debug(), "link state at shutdown");
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    pub fn set_print_start_time(&mut self, current_clock: u64) {
        if self.offline && !self.pace {
            return;
        }
        self.clock.set_print_start_clock(current_clock);
    }

    pub fn get_print_buffer_time(&self, last_move_end: f64) -> f64 {
        if self.offline && !self.pace {
            return 0.250;
        }
        self.clock.buffer_time(last_move_end, self.link.get_clock())
    }

    pub fn get_print_clock(&self, print_time: f64) -> u64 {
        self.clock.print_clock(print_time)
    }

    pub fn get_mcu_freq(&self) -> f64 {
        self.clock_freq()
    }

    pub fn get_last_clock(&self) -> u64 {
        self.link.get_last_clock()
    }

    /// Releases every stepper's ready commands up to the clock `print_time`
    /// maps to, dispatching each to the link in order.
    pub fn flush_moves(&mut self, print_time: f64) -> Result<Vec<Dispatch>, McuError> {
        let move_clock = self.get_print_clock(print_time);
        let synchroniser = self
            .synchroniser
            .as_mut()
            .expect("flush_moves called before build_config/commit completed");
        let dispatch = synchroniser.flush(&mut self.steppers, move_clock);
        for d in &dispatch {
            let encoded = match &d.item {
                crate::stepcompress::QueuedItem::Step { clock: _, interval, count, add } => {
                    mcu_proto::EncodedCommand {
                        msgid: 0,
                        name: "queue_step".to_string(),
                        fields: vec![
                            ("oid".to_string(), d.stepper_oid as i64),
                            ("interval".to_string(), *interval as i64),
                            ("count".to_string(), *count as i64),
                            ("add".to_string(), *add as i64),
                        ],
                    }
                }
                crate::stepcompress::QueuedItem::Raw { command, .. } => command.clone(),
            };
            self.link.send(&encoded, 0, d.item.clock(), None).map_err(McuError::LinkIo)?;
        }
        Ok(dispatch)
    }

    // -- Direct command dispatch ----------------------------------------

    /// Sends an already-encoded command with no clock gating
    /// (`minclock = reqclock = 0`, no command queue).
    pub fn send(&mut self, command: &EncodedCommand) -> Result<(), McuError> {
        self.send_with_clock(command, 0, 0, None)
    }

    /// Sends an already-encoded command, forwarding `minclock`/`reqclock`/
    /// `cq` to the link untouched. Mirrors `MCU.send`.
    pub fn send_with_clock(
        &mut self,
        command: &EncodedCommand,
        minclock: u64,
        reqclock: u64,
        cq: Option<CommandQueueId>,
    ) -> Result<(), McuError> {
        self.link.send(command, minclock, reqclock, cq).map_err(McuError::LinkIo)
    }

    /// Allocates a fresh command-queue handle, mirroring
    /// `mcu.alloc_command_queue()`.
    pub fn alloc_command_queue(&mut self) -> CommandQueueId {
        self.link.alloc_command_queue()
    }

    // -- Device command dispatch -----------------------------------------

    /// Schedules a digital output pin change and sends it, gated by the
    /// output's own previous clock, mirroring `MCU_digital_out.set_digital`'s
    /// `minclock=self._last_clock, reqclock=clock` pattern.
    pub fn set_digital_out(&mut self, oid: u8, clock: u64, value: u8) -> Result<(), McuError> {
        let dout = self
            .digital_outs
            .iter_mut()
            .find(|d| d.oid() == oid)
            .ok_or_else(|| McuError::LinkIo(format!("unknown digital_out oid {oid}")))?;
        let minclock = dout.last_clock();
        let cmd = dout.set_digital(clock, value);
        self.send_with_clock(&cmd, minclock, clock, None)
    }

    /// Schedules a PWM output change and sends it, gated the same way as
    /// [`McuSession::set_digital_out`], mirroring `MCU_pwm.set_pwm`.
    pub fn set_pwm_out(&mut self, oid: u8, clock: u64, value: u16) -> Result<(), McuError> {
        let pwm = self
            .pwms
            .iter_mut()
            .find(|p| p.oid() == oid)
            .ok_or_else(|| McuError::LinkIo(format!("unknown pwm oid {oid}")))?;
        let minclock = pwm.last_clock();
        let cmd = pwm.set_pwm(clock, value);
        self.send_with_clock(&cmd, minclock, clock, None)
    }

    /// Begins a homing move on `oid` and sends the `end_stop_home` command,
    /// mirroring `MCU_endstop.home`.
    pub fn home_endstop(&mut self, oid: u8, clock: u64, rest_ticks: u32) -> Result<(), McuError> {
        let endstop = self
            .endstops
            .iter_mut()
            .find(|e| e.oid() == oid)
            .ok_or_else(|| McuError::LinkIo(format!("unknown endstop oid {oid}")))?;
        let cmd = endstop.home(clock, rest_ticks);
        self.send_with_clock(&cmd, 0, clock, None)
    }

    /// Polls whether `oid` is still homing, sending a liveness
    /// `end_stop_query` if its retry interval has elapsed, mirroring
    /// `MCU_endstop.is_homing`.
    pub fn poll_endstop(&mut self, oid: u8) -> Result<bool, McuError> {
        let last_clock = self.get_last_clock();
        let endstop = self
            .endstops
            .iter_mut()
            .find(|e| e.oid() == oid)
            .ok_or_else(|| McuError::LinkIo(format!("unknown endstop oid {oid}")))?;
        let (homing, query) = endstop.is_homing(last_clock);
        if let Some(query) = query {
            self.send_with_clock(&query, 0, 0, None)?;
        }
        Ok(homing)
    }

    /// Completes a homing move on `endstop_oid`: flushes anything the link
    /// has ready to send and forgets the associated stepper's direction/
    /// move-clock memory, mirroring `MCU_endstop.home_finalize`'s
    /// `serial.send_flush()` + `stepper.note_stepper_stop()` pair. Routed
    /// through the session (rather than `Endstop` itself) since device
    /// objects never hold a reference to one another.
    pub fn home_finalize(&mut self, endstop_oid: u8) -> Result<(), McuError> {
        let stepper_oid = self
            .endstops
            .iter()
            .find(|e| e.oid() == endstop_oid)
            .ok_or_else(|| McuError::LinkIo(format!("unknown endstop oid {endstop_oid}")))?
            .stepper_oid();
        self.link.flush_sends().map_err(McuError::LinkIo)?;
        if let Some(stepper) = self.steppers.iter_mut().find(|s| s.oid() == stepper_oid) {
            stepper.note_stepper_stop();
        }
        Ok(())
    }

    /// Schedules an ADC sample window and sends the `query_analog_in`
    /// command, mirroring `MCU_adc.query_analog_in`.
    pub fn query_adc(&mut self, oid: u8, report_clock: u64) -> Result<(), McuError> {
        let mcu_freq = self.clock_freq();
        let last_clock = self.get_last_clock();
        let adc = self
            .adcs
            .iter_mut()
            .find(|a| a.oid() == oid)
            .ok_or_else(|| McuError::LinkIo(format!("unknown adc oid {oid}")))?;
        let cmd = adc.query_analog_in(report_clock, mcu_freq, last_clock);
        self.send_with_clock(&cmd, 0, 0, None)
    }

    /// Aggregate stats line, mirroring `MCU.stats`'s suffix (the transport
    /// half of that string is the link's own concern).
    pub fn stats_line(&self) -> String {
        let mut line = format!(
            "mcu_task_avg={:.6} mcu_task_stddev={:.6}",
            self.stats.mcu_task_avg(),
            self.stats.mcu_task_stddev()
        );
        let errors: u32 = self.steppers.iter().map(|s| s.get_errors()).sum();
        if errors > 0 {
            line.push_str(&format!(" step_errors={errors}"));
        }
        line
    }

    pub fn steppers(&self) -> &[Stepper] {
        &self.steppers
    }

    pub fn steppers_mut(&mut self) -> &mut [Stepper] {
        &mut self.steppers
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Direct mutable access to the underlying transport, mirroring the
    /// original host exposing its serial reader as a plain attribute.
    /// Runtime code should prefer the session's own methods; this exists
    /// for callers that need to drive or inspect the link itself (test
    /// fixtures priming a mock, diagnostics tooling).
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Computes the CRC the currently pending config commands would get if
    /// `build_config` ran right now, without actually running the commit
    /// handshake. Lets a caller stage the matching [`ConfigResponse`] a
    /// mock firmware should hand back.
    pub fn preview_config_crc(&self) -> u32 {
        let mut cmds = self.config_cmds.clone();
        cmds.extend(self.config.custom_commands());
        cmds.insert(0, format!("allocate_oids count={}", self.num_oids));
        let rendered: Vec<String> = cmds.iter().map(|c| self.pin_map.update_command(c)).collect();
        crc32(rendered.join("\n").as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial_link::MockSerialLink;
    use mcu_proto::Dictionary;

    fn mock_session() -> McuSession<MockSerialLink> {
        let dict = Dictionary::stub(1_000_000, "test-mcu");
        let link = MockSerialLink::new(dict);
        McuSession::connect(link, McuSessionConfig::default()).unwrap()
    }

    #[test]
    fn create_oid_assigns_sequential_ids() {
        let mut s = mock_session();
        assert_eq!(s.create_oid(), 0);
        assert_eq!(s.create_oid(), 1);
    }

    #[test]
    fn build_config_succeeds_when_crc_matches() {
        let mut s = mock_session();
        s.create_stepper("PA0", "PA1", 100, 25).unwrap();
        let expected_crc = s.preview_config_crc();
        s.link.queue_config_response(ConfigResponse { is_config: false, crc: 0, move_count: 0 });
        s.link.queue_config_response(ConfigResponse {
            is_config: true,
            crc: expected_crc,
            move_count: 16,
        });
        s.build_config().unwrap();
        assert_eq!(s.synchroniser.as_ref().unwrap().move_count(), 16);
    }

    #[test]
    fn build_config_rejects_crc_mismatch() {
        let mut s = mock_session();
        s.create_stepper("PA0", "PA1", 100, 25).unwrap();
        s.link.queue_config_response(ConfigResponse { is_config: true, crc: 0xdead_beef, move_count: 1 });
        let err = s.build_config().unwrap_err();
        assert!(matches!(err, McuError::ConfigMismatch { .. }));
    }

    #[test]
    fn offline_build_config_skips_handshake() {
        let dict = Dictionary::stub(1_000_000, "test-mcu");
        let link = MockSerialLink::new(dict);
        let mut s = McuSession::connect_file(link, McuSessionConfig::default(), false).unwrap();
        s.build_config().unwrap();
        assert_eq!(s.synchroniser.as_ref().unwrap().move_count(), 500);
    }

    #[test]
    fn offline_unpaced_buffer_time_is_constant() {
        let dict = Dictionary::stub(1_000_000, "test-mcu");
        let link = MockSerialLink::new(dict);
        let mut s = McuSession::connect_file(link, McuSessionConfig::default(), false).unwrap();
        s.set_print_start_time(12345);
        assert_eq!(s.get_print_buffer_time(99.0), 0.250);
    }

    #[test]
    fn shutdown_event_is_idempotent() {
        let mut s = mock_session();
        s.handle_shutdown("mcu", "overheat");
        assert!(s.is_shutdown());
        s.handle_shutdown("mcu", "overheat again");
        assert!(s.is_shutdown());
    }

    #[test]
    fn pump_applies_stats_event() {
        let mut s = mock_session();
        let link = &mut s.link;
        link.push_event(McuEvent::Stats { count: 100, sum: 100_000, sumsq: 100_000_000 });
        s.pump().unwrap();
        assert!(s.stats_line().contains("mcu_task_avg"));
    }

    #[test]
    fn set_digital_out_dispatches_through_the_link_with_previous_clock_as_minclock() {
        let mut s = mock_session();
        let oid = s.create_digital_out("PC0", 0.0).unwrap();
        s.set_digital_out(oid, 500, 1).unwrap();
        s.set_digital_out(oid, 1500, 0).unwrap();
        let clocks = s.link.sent_clocks();
        assert_eq!(clocks.len(), 2);
        assert_eq!(clocks[0], (0, 500, None));
        assert_eq!(clocks[1], (500, 1500, None));
    }

    #[test]
    fn set_pwm_out_dispatches_through_the_link() {
        let mut s = mock_session();
        let oid = s.create_pwm("PC1", 1000, 0.0).unwrap();
        s.set_pwm_out(oid, 100, 500).unwrap();
        assert_eq!(s.link.sent().len(), 1);
        assert_eq!(s.link.sent()[0].name, "schedule_pwm_out");
    }

    #[test]
    fn home_endstop_and_poll_dispatch_through_the_link() {
        let mut s = mock_session();
        let stepper_oid = s.create_stepper("PA0", "PA1", 0, 25).unwrap();
        let endstop_oid = s.create_endstop("PB3", stepper_oid).unwrap();
        s.home_endstop(endstop_oid, 0, 10).unwrap();
        assert_eq!(s.link.sent()[0].name, "end_stop_home");
        assert!(s.poll_endstop(endstop_oid).unwrap());
    }

    #[test]
    fn home_finalize_flushes_the_link_and_resets_the_stepper() {
        let mut s = mock_session();
        let stepper_oid = s.create_stepper("PA0", "PA1", 0, 25).unwrap();
        let endstop_oid = s.create_endstop("PB3", stepper_oid).unwrap();
        s.steppers_mut()[0].set_next_step_dir(1, 100);
        s.steppers_mut()[0].drain_ready();
        s.home_finalize(endstop_oid).unwrap();
        assert_eq!(s.link.flush_count(), 1);
        // note_stepper_stop cleared direction memory, so requesting the
        // same direction again still emits a fresh command instead of
        // being deduped against the stale `sdir`.
        s.steppers_mut()[0].set_next_step_dir(1, 200);
        let items = s.steppers_mut()[0].drain_ready();
        assert!(items
            .iter()
            .any(|i| matches!(i, crate::stepcompress::QueuedItem::Raw { command, .. } if command.name == "set_next_step_dir")));
    }

    #[test]
    fn query_adc_dispatches_through_the_link() {
        let mut s = mock_session();
        let oid = s.create_adc("PA3").unwrap();
        s.query_adc(oid, 1000).unwrap();
        assert_eq!(s.link.sent()[0].name, "query_analog_in");
    }

    struct UppercasePinMap;

    impl PinMap for UppercasePinMap {
        fn map_pin(&self, name: &str) -> String {
            name.to_uppercase()
        }

        fn update_command(&self, line: &str) -> String {
            line.to_string()
        }
    }

    #[test]
    fn pin_map_rewrites_pin_names_before_they_reach_a_device_object() {
        let mut s = mock_session();
        s.set_pin_map(Box::new(UppercasePinMap));
        s.create_digital_out("pc0", 0.0).unwrap();
        assert_eq!(s.get_print_clock(0.0), 0); // sanity: session still usable
        assert!(s.config_cmds.iter().any(|c| c.contains("pin=PC0")));
    }
}
