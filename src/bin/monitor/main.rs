mod gui;

use clap::Parser;
use log::error;
use touchfloor::args::MonitorArgs;
use touchfloor::board_model::BoardModel;
use touchfloor::config::{FloorConfig, TransportConfig};
use touchfloor::dummy_floor::DummyFloor;
use touchfloor::gui::MonitorError;
use touchfloor::pipeline::Pipeline;
use touchfloor::transport::ByteSource;

use gui::engage_gui;

fn main() {
    env_logger::init();
    let args = MonitorArgs::parse();
    if let Err(e) = monitor(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn monitor(args: MonitorArgs) -> Result<(), MonitorError> {
    let (config, floor, (pipeline, processor)) = match &args.config {
        Some(path) => {
            let config = FloorConfig::from_path(path)?;
            let started = Pipeline::start(&config, Box::new(config.blobs))?;
            (config, None, started)
        }
        None => {
            let board = args.board.board_config(TransportConfig::Synthetic {
                touches: args.touches,
                noise: args.noise,
            });
            let model = BoardModel::from_version(board.board.model_version)?;
            let dummy = DummyFloor::builder(model, board.board.mode_count)
                .touches(args.touches)
                .noise(args.noise)
                .build();
            let handle = dummy.handle();
            let config = FloorConfig {
                boards: vec![board],
                ..Default::default()
            };
            let source: Box<dyn ByteSource + Send> = Box::new(dummy);
            let started = Pipeline::with_sources(&config, vec![(0, source)], Box::new(config.blobs))?;
            (config, Some(handle), started)
        }
    };

    let res = engage_gui(processor, pipeline.control(), floor, config.tick_period());
    pipeline.shutdown();
    res
}
