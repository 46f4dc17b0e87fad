//! Runs the floor without a user interface and logs touches as they come
//! and go.
//!
//! Calibration keys are read from stdin: `l` captures the idle baseline,
//! `u` the full-press ceiling, `x` recomputes the gains and `q` quits.

use clap::Parser;
use log::{debug, error, info, warn};
use std::{
    collections::HashSet,
    io::{self, BufRead},
    sync::mpsc::SyncSender,
    thread,
};
use touchfloor::{
    args::{FloorArgs, FloorCommand, InitCommand, RunCommand},
    board_model::BoardModel,
    component::StopFlag,
    config::{BoardConfig, FloorConfig, TransportConfig},
    dummy_floor::{DummyFloor, DummyFloorHandle},
    gui::{device_selector, MonitorError},
    pipeline::{ControlCommand, Pipeline},
    registry::BoardRegistration,
    transport::{available_ports, ByteSource},
};

// Example:
// cargo run --bin touchfloor -- run --config floor.ron
// cargo run --bin touchfloor -- run --synthetic --ticks 300

/// Ticks between the stages of the synthetic board's calibration.
const SETTLE_TICKS: u64 = 10;

fn main() {
    env_logger::init();
    let args = FloorArgs::parse();

    let res = match args.command {
        FloorCommand::Run(run) => run_floor(run),
        FloorCommand::Ports => list_ports(),
        FloorCommand::Init(init) => write_config(init),
    };

    if let Err(e) = res {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn list_ports() -> Result<(), MonitorError> {
    let ports = available_ports()?;
    println!("Available devices:");
    for port in ports {
        println!("\t{}", port.to_string_lossy());
    }
    Ok(())
}

fn write_config(init: InitCommand) -> Result<(), MonitorError> {
    let config = FloorConfig {
        boards: vec![BoardConfig {
            board: BoardRegistration {
                board_id: 0,
                model_version: 4,
                mode_count: 5,
                panel_layout: (0, 0),
            },
            transport: TransportConfig::Synthetic {
                touches: 1,
                noise: 200,
            },
        }],
        ..Default::default()
    };
    config.to_path(&init.outfile)?;
    info!("wrote {}", init.outfile.display());
    Ok(())
}

fn run_floor(run: RunCommand) -> Result<(), MonitorError> {
    let mut config = match &run.config {
        Some(path) => FloorConfig::from_path(path)?,
        None => FloorConfig::default(),
    };

    let port = if run.select {
        match device_selector(available_ports()?)? {
            Some(port) => Some(port),
            None => {
                info!("no device selected");
                return Ok(());
            }
        }
    } else {
        run.port.clone()
    };

    let mut synthetic = None;
    let (pipeline, mut processor) = if run.synthetic {
        let board = run.board.board_config(TransportConfig::Synthetic {
            touches: 0,
            noise: 200,
        });
        let model = BoardModel::from_version(board.board.model_version)?;
        let floor = DummyFloor::builder(model, board.board.mode_count)
            .touches(0)
            .noise(200)
            .build();
        synthetic = Some(floor.handle());
        config.boards = vec![board];
        let source: Box<dyn ByteSource + Send> = Box::new(floor);
        Pipeline::with_sources(&config, vec![(0, source)], Box::new(config.blobs))?
    } else {
        if let Some(path) = port {
            config.boards = vec![run.board.board_config(TransportConfig::Serial {
                path,
                baud_rate: 115200,
            })];
        }
        if config.boards.is_empty() {
            warn!("no boards configured, nothing to do");
            return Ok(());
        }
        Pipeline::start(&config, Box::new(config.blobs))?
    };

    let stop = pipeline.stop_flag();
    let control = pipeline.control();
    spawn_key_reader(control.clone(), stop.clone());

    let mut down = HashSet::new();
    processor.run(config.tick_period(), &stop, |p, delta| {
        for touch in &delta.confirmed {
            if down.insert(touch.id) {
                info!("touch {} down at {}", touch.id, touch.position);
            } else {
                debug!("touch {} at {}", touch.id, touch.position);
            }
        }
        for id in &delta.eliminated {
            if down.remove(id) {
                info!("touch {} up", id);
            }
        }

        if let Some(floor) = &synthetic {
            synthetic_calibration(p.ticks(), floor, &control);
        }
        if run.ticks.is_some_and(|limit| p.ticks() >= limit) {
            stop.stop();
        }
    });

    // a full update queue would keep the assembly worker from noticing the stop
    drop(processor);
    let stats = pipeline.shutdown();
    info!(
        "decoded {} packets, dropped {} malformed frames",
        stats.packets, stats.malformed
    );
    Ok(())
}

/// Forwards calibration keys typed on stdin to the processor.
fn spawn_key_reader(control: SyncSender<ControlCommand>, stop: StopFlag) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            for key in line.chars() {
                if key == 'q' {
                    stop.stop();
                    return;
                }
                match ControlCommand::from_key(key) {
                    Some(command) => {
                        if control.send(command).is_err() {
                            return;
                        }
                    }
                    None if key.is_whitespace() => {}
                    None => warn!("unknown key {:?}", key),
                }
            }
        }
    });
}

/// Walks the synthetic board through a calibration: idle baseline, then a
/// full press, then the circling touch.
fn synthetic_calibration(tick: u64, floor: &DummyFloorHandle, control: &SyncSender<ControlCommand>) {
    let commands: &[ControlCommand] = match tick / SETTLE_TICKS {
        _ if tick % SETTLE_TICKS != 0 => &[],
        1 => &[ControlCommand::CaptureLower],
        2 => {
            floor.set_flood(true);
            &[]
        }
        3 => &[ControlCommand::CaptureUpper, ControlCommand::RecomputeGain],
        4 => {
            floor.set_flood(false);
            floor.set_touches(1);
            &[]
        }
        _ => &[],
    };
    for &command in commands {
        if control.try_send(command).is_err() {
            warn!("calibration : processor is not taking commands");
        }
    }
}
