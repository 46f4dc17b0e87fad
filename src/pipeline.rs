//! Wires the floor stages onto worker threads.
//!
//! ```text
//! board 0 ─ ingest ─┐
//! board 1 ─ ingest ─┼─▶ assembly ─▶ Processor::tick ─▶ TrackerDelta
//! board n ─ ingest ─┘                    ▲
//!                           ControlCommand
//! ```
//!
//! Each ingestion worker owns its board's transport and [`SlipDecoder`].
//! The assembly stage owns one [`PacketAssembler`] per board. The
//! [`Processor`] is the only place board frames are mutated: on every tick
//! it applies the pending sweeps and control commands, composites the
//! surface, extracts blobs and feeds the tracker, in that order. Queues are
//! bounded, so a slow processor makes the ingestion workers wait.

use crate::assembler::{Assembled, BoardUpdate, PacketAssembler};
use crate::blob::BlobExtractor;
use crate::board_model::BoardModel;
use crate::component::{run_component, Component, StopFlag};
use crate::config::FloorConfig;
use crate::error::FloorError;
use crate::frame_codec::{DecodeStats, SensorPacket, SlipDecoder};
use crate::grid::Grid;
use crate::registry::BoardRegistration;
use crate::surface_mapper::{CalibrationStep, SurfaceMapper};
use crate::tracker::{Tracker, TrackerConfig, TrackerDelta};
use crate::transport::{self, ByteSource};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Size of the buffer each ingestion worker reads into.
const READ_CHUNK: usize = 256;

/// Packets decoded from one read of one board's transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBatch {
    /// The board the bytes came from.
    pub board_id: u16,
    /// The packets, in arrival order.
    pub packets: Vec<SensorPacket>,
}

/// Operator commands for the processing worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Capture every board's idle baseline.
    CaptureLower,
    /// Capture every board's full-press ceiling.
    CaptureUpper,
    /// Derive every board's gains from the captured pair.
    RecomputeGain,
}

impl ControlCommand {
    /// The command bound to a key: `l`, `u` and `x`.
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'l' => Some(Self::CaptureLower),
            'u' => Some(Self::CaptureUpper),
            'x' => Some(Self::RecomputeGain),
            _ => None,
        }
    }
}

impl From<ControlCommand> for CalibrationStep {
    fn from(command: ControlCommand) -> Self {
        match command {
            ControlCommand::CaptureLower => Self::CaptureLower,
            ControlCommand::CaptureUpper => Self::CaptureUpper,
            ControlCommand::RecomputeGain => Self::RecomputeGain,
        }
    }
}

/// Reads one board's transport until it closes or the stop flag is raised,
/// sending each read's packets on `output`. Returns the decoder's totals.
pub fn spawn_ingest(
    board_id: u16,
    mut source: Box<dyn ByteSource + Send>,
    output: SyncSender<PacketBatch>,
    stop: StopFlag,
) -> JoinHandle<DecodeStats> {
    thread::spawn(move || {
        let mut decoder = SlipDecoder::new();
        let mut buf = [0; READ_CHUNK];

        while !stop.is_stopped() {
            let n = match source.read_chunk(&mut buf) {
                Ok(0) => continue,
                Ok(n) => n,
                Err(e) => {
                    warn!("board {} : transport closed : {}.", board_id, e);
                    break;
                }
            };
            let packets = decoder.decode(&buf[..n]);
            if packets.is_empty() {
                continue;
            }
            if output.send(PacketBatch { board_id, packets }).is_err() {
                debug!("board {} : assembly hung up.", board_id);
                break;
            }
        }

        let stats = decoder.stats();
        info!(
            "board {} : ingest terminated after {} packets, {} malformed frames.",
            board_id, stats.packets, stats.malformed
        );
        stats
    })
}

/// Turns packet batches into complete board sweeps.
pub struct Assembly {
    assemblers: HashMap<u16, PacketAssembler>,
}

impl Assembly {
    /// One assembler per registration. Registrations with an unknown model
    /// are skipped.
    pub fn new(registrations: &[BoardRegistration]) -> Self {
        let assemblers = registrations
            .iter()
            .filter_map(|r| match BoardModel::from_version(r.model_version) {
                Ok(model) => Some((
                    r.board_id,
                    PacketAssembler::new(r.board_id, model, r.mode_count),
                )),
                Err(e) => {
                    warn!("board {} : {}", r.board_id, e);
                    None
                }
            })
            .collect();
        Self { assemblers }
    }
}

impl Component for Assembly {
    type InData = PacketBatch;
    type OutData = Vec<BoardUpdate>;

    fn convert(&mut self, input: PacketBatch) -> Vec<BoardUpdate> {
        let Some(assembler) = self.assemblers.get_mut(&input.board_id) else {
            warn!("Assembly : packets from unregistered board {}.", input.board_id);
            return Vec::new();
        };
        input
            .packets
            .iter()
            .filter_map(|p| match assembler.push(p) {
                Some(Assembled::Sweep(update)) => Some(update),
                _ => None,
            })
            .collect()
    }

    fn finalize(&mut self) -> Result<(), FloorError> {
        for assembler in self.assemblers.values() {
            if assembler.dropped() > 0 {
                info!(
                    "board {} : {} packets addressed to missing sensors.",
                    assembler.board_id(),
                    assembler.dropped()
                );
            }
        }
        Ok(())
    }
}

impl ToString for Assembly {
    fn to_string(&self) -> String {
        "Assembly".to_string()
    }
}

/// The processing worker: composites the boards and tracks touches.
pub struct Processor {
    mapper: SurfaceMapper,
    extractor: Box<dyn BlobExtractor + Send>,
    tracker: Tracker,
    updates: Receiver<Vec<BoardUpdate>>,
    control: Receiver<ControlCommand>,
    ticks: u64,
    drained: bool,
}

impl Processor {
    /// Builds the mapper from `registrations` and listens on the two queues.
    pub fn new(
        registrations: &[BoardRegistration],
        extractor: Box<dyn BlobExtractor + Send>,
        tracker: TrackerConfig,
        updates: Receiver<Vec<BoardUpdate>>,
        control: Receiver<ControlCommand>,
    ) -> Self {
        let mut mapper = SurfaceMapper::new();
        let placed = mapper.set_boards(registrations);
        info!("processor : {} of {} boards placed.", placed, registrations.len());
        Self {
            mapper,
            extractor,
            tracker: Tracker::new(tracker),
            updates,
            control,
            ticks: 0,
            drained: false,
        }
    }

    /// The mapper, with every board frame.
    pub fn mapper(&self) -> &SurfaceMapper {
        &self.mapper
    }

    /// The surface composited on the last tick.
    pub fn surface(&self) -> &Grid {
        self.mapper.surface()
    }

    /// The tracker.
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether the upstream stages have finished and every sweep they sent
    /// has been applied.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    /// Applies a command right away, outside the tick cycle.
    pub fn command(&mut self, command: ControlCommand) {
        info!("processor : {:?}.", command);
        self.mapper.calibrate(command.into());
    }

    /// One processing tick.
    pub fn tick(&mut self) -> TrackerDelta {
        loop {
            match self.updates.try_recv() {
                Ok(updates) => {
                    for update in &updates {
                        if let Err(e) = self.mapper.apply(update) {
                            warn!("processor : {}", e);
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.drained = true;
                    break;
                }
            }
        }
        while let Ok(command) = self.control.try_recv() {
            self.command(command);
        }

        let surface = self.mapper.update();
        let points = self.extractor.extract(surface);
        self.tracker.update_all(&points);
        self.tracker.tick();
        self.ticks += 1;
        self.tracker.delta()
    }

    /// Ticks every `period` until the stop flag is raised or the upstream
    /// stages are drained, handing each delta to `on_tick`.
    pub fn run<F>(&mut self, period: Duration, stop: &StopFlag, mut on_tick: F)
    where
        F: FnMut(&Processor, &TrackerDelta),
    {
        while !stop.is_stopped() && !self.drained {
            let started = Instant::now();
            let delta = self.tick();
            on_tick(self, &delta);
            if let Some(rest) = period.checked_sub(started.elapsed()) {
                spin_sleep::sleep(rest);
            }
        }
        info!(
            "processor : terminated after {} ticks, {} detections dropped.",
            self.ticks,
            self.tracker.dropped()
        );
    }
}

/// The running worker threads of a floor.
pub struct Pipeline {
    stop: StopFlag,
    control: SyncSender<ControlCommand>,
    ingest: Vec<JoinHandle<DecodeStats>>,
    assembly: JoinHandle<()>,
}

impl Pipeline {
    /// Opens every configured board's transport and starts the workers.
    /// Boards whose transport cannot be opened are left out.
    pub fn start(
        config: &FloorConfig,
        extractor: Box<dyn BlobExtractor + Send>,
    ) -> Result<(Self, Processor), FloorError> {
        let sources = config
            .boards
            .iter()
            .filter_map(|board| match transport::open(board) {
                Ok(source) => Some((board.board.board_id, source)),
                Err(e) => {
                    warn!("board {} : could not open transport : {}", board.board.board_id, e);
                    None
                }
            })
            .collect();
        Self::with_sources(config, sources, extractor)
    }

    /// Starts the workers on already opened byte sources.
    pub fn with_sources(
        config: &FloorConfig,
        sources: Vec<(u16, Box<dyn ByteSource + Send>)>,
        extractor: Box<dyn BlobExtractor + Send>,
    ) -> Result<(Self, Processor), FloorError> {
        // refuses duplicate board ids
        config.registry()?;
        let registrations = config.registrations();
        let capacity = config.queue_capacity.max(1);
        let stop = StopFlag::new();

        let (packet_tx, packet_rx) = sync_channel(capacity);
        let (update_tx, update_rx) = sync_channel(capacity);
        let (control_tx, control_rx) = sync_channel(capacity);

        let ingest = sources
            .into_iter()
            .map(|(board_id, source)| spawn_ingest(board_id, source, packet_tx.clone(), stop.clone()))
            .collect();
        drop(packet_tx);

        let assembly = run_component(
            Box::new(Assembly::new(&registrations)),
            packet_rx,
            update_tx,
            stop.clone(),
        );

        let processor = Processor::new(&registrations, extractor, config.tracker, update_rx, control_rx);

        Ok((
            Self {
                stop,
                control: control_tx,
                ingest,
                assembly,
            },
            processor,
        ))
    }

    /// The flag that stops every worker.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// A handle for sending commands to the processor.
    pub fn control(&self) -> SyncSender<ControlCommand> {
        self.control.clone()
    }

    /// Stops every worker and waits for them. Returns the combined decoder
    /// totals of the ingestion workers.
    pub fn shutdown(self) -> DecodeStats {
        self.stop.stop();
        let mut total = DecodeStats::default();
        for handle in self.ingest {
            match handle.join() {
                Ok(stats) => {
                    total.packets += stats.packets;
                    total.malformed += stats.malformed;
                }
                Err(_) => warn!("pipeline : an ingest worker panicked."),
            }
        }
        if self.assembly.join().is_err() {
            warn!("pipeline : the assembly worker panicked.");
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::sweep_packets;
    use crate::blob::ThresholdBlobs;
    use crate::config::{BoardConfig, TransportConfig};
    use crate::frame_codec::{encode_packet, FRAME_END};
    use crate::transport::ReplaySource;

    fn v2_board(board_id: u16) -> BoardRegistration {
        BoardRegistration {
            board_id,
            model_version: 2,
            mode_count: 1,
            panel_layout: (0, 0),
        }
    }

    fn sweep_with(level: u16, pressed: &[usize], pressed_level: u16) -> Vec<u16> {
        (0..36)
            .map(|s| if pressed.contains(&s) { pressed_level } else { level })
            .collect()
    }

    fn update(board_id: u16, samples: Vec<u16>) -> Vec<BoardUpdate> {
        vec![BoardUpdate {
            board_id,
            modes: vec![samples],
        }]
    }

    #[test]
    fn control_keys() {
        assert_eq!(ControlCommand::from_key('l'), Some(ControlCommand::CaptureLower));
        assert_eq!(ControlCommand::from_key('u'), Some(ControlCommand::CaptureUpper));
        assert_eq!(ControlCommand::from_key('x'), Some(ControlCommand::RecomputeGain));
        assert_eq!(ControlCommand::from_key('q'), None);
    }

    #[test]
    fn processor_calibrates_and_tracks() {
        let (update_tx, update_rx) = sync_channel(8);
        let (control_tx, control_rx) = sync_channel(8);
        let mut processor = Processor::new(
            &[v2_board(0)],
            Box::new(ThresholdBlobs::default()),
            TrackerConfig::default(),
            update_rx,
            control_rx,
        );

        // nothing calibrated yet, so nothing shows
        update_tx.send(update(0, sweep_with(100, &[20], 5000))).unwrap();
        assert_eq!(processor.tick(), TrackerDelta::default());
        assert_eq!(processor.surface().max(), 0);

        update_tx.send(update(0, sweep_with(100, &[], 0))).unwrap();
        control_tx.send(ControlCommand::CaptureLower).unwrap();
        processor.tick();

        // a span of 257 counts gives a gain of exactly 255
        update_tx.send(update(0, sweep_with(357, &[], 0))).unwrap();
        control_tx.send(ControlCommand::CaptureUpper).unwrap();
        control_tx.send(ControlCommand::RecomputeGain).unwrap();
        processor.tick();
        assert_eq!(processor.surface().max(), u16::MAX);

        update_tx.send(update(0, sweep_with(100, &[20], 357))).unwrap();
        let mut delta = TrackerDelta::default();
        for _ in 0..6 {
            delta = processor.tick();
        }
        assert_eq!(delta.confirmed.len(), 1);
        let touch = delta.confirmed[0];
        assert_eq!(touch.id, 0);
        assert!((touch.position.x - 2.0).abs() < 0.01);
        assert!((touch.position.y - 3.0).abs() < 0.01);

        update_tx.send(update(0, sweep_with(100, &[], 0))).unwrap();
        let mut eliminated = Vec::new();
        for _ in 0..6 {
            eliminated.extend(processor.tick().eliminated);
        }
        assert_eq!(eliminated, vec![0]);

        drop(update_tx);
        processor.tick();
        assert!(processor.is_drained());
        assert_eq!(processor.ticks(), 16);
    }

    #[test]
    fn processor_skips_unknown_boards() {
        let (update_tx, update_rx) = sync_channel(8);
        let (_control_tx, control_rx) = sync_channel(8);
        let mut processor = Processor::new(
            &[v2_board(0)],
            Box::new(ThresholdBlobs::default()),
            TrackerConfig::default(),
            update_rx,
            control_rx,
        );
        update_tx.send(update(9, sweep_with(100, &[], 0))).unwrap();
        processor.tick();
        assert_eq!(processor.mapper().board(0).unwrap().raw(0).unwrap()[0], 0);
    }

    #[test]
    fn replayed_bytes_reach_the_processor() {
        let model = BoardModel::V2;
        let config = FloorConfig {
            queue_capacity: 2,
            boards: vec![BoardConfig {
                board: v2_board(4),
                transport: TransportConfig::Synthetic {
                    touches: 0,
                    noise: 0,
                },
            }],
            ..Default::default()
        };

        let samples = sweep_with(300, &[7], 900);
        let mut bytes = vec![FRAME_END];
        bytes.extend(
            sweep_packets(model, &[samples.clone()])
                .iter()
                .flat_map(encode_packet),
        );
        // a torn frame in the middle of the stream
        bytes.extend_from_slice(&[0x01, 0x02, FRAME_END]);
        let chunks: Vec<Vec<u8>> = bytes.chunks(7).map(<[u8]>::to_vec).collect();
        let source: Box<dyn ByteSource + Send> = Box::new(ReplaySource::new(chunks));

        let (pipeline, mut processor) = Pipeline::with_sources(
            &config,
            vec![(4, source)],
            Box::new(ThresholdBlobs::default()),
        )
        .unwrap();

        processor.run(Duration::from_millis(1), &pipeline.stop_flag(), |_, _| {});
        assert!(processor.is_drained());
        assert_eq!(processor.mapper().board(4).unwrap().raw(0).unwrap(), &samples[..]);

        let stats = pipeline.shutdown();
        assert_eq!(stats.packets, 36);
        assert_eq!(stats.malformed, 1);
    }

    #[test]
    fn duplicate_boards_are_refused() {
        let board = BoardConfig {
            board: v2_board(1),
            transport: TransportConfig::Synthetic {
                touches: 0,
                noise: 0,
            },
        };
        let config = FloorConfig {
            boards: vec![board.clone(), board],
            ..Default::default()
        };
        let res = Pipeline::with_sources(&config, Vec::new(), Box::new(ThresholdBlobs::default()));
        assert!(matches!(res, Err(FloorError::DuplicateBoard(1))));
    }
}
