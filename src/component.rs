//! Defines the Component trait, the common shape of a pipeline stage that
//! runs on its own worker thread. Each component consumes data from the
//! preceding stage, processes it, and passes new data on to the next one
//! over a bounded channel.

use crate::error::FloorError;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often an idle worker checks its [`StopFlag`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared cooperative cancellation. Every worker checks it between units of
/// work; nothing is interrupted mid-operation.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// A flag that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every worker holding this flag to finish.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

///
/// A stage in the floor pipeline. All structs that perform a processing step
/// on a worker thread implement Component, so that they can be chained with
/// [`run_component`].
///
pub trait Component: ToString {
    /// What the stage consumes.
    type InData;
    /// What the stage produces.
    type OutData;

    /// Converts one input into one output.
    fn convert(&mut self, input: Self::InData) -> Self::OutData;

    /// Cleans up at termination of the pipeline.
    fn finalize(&mut self) -> Result<(), FloorError>;
}

/// Runs the given Component on its own thread. On receiving data of type
/// InData on the input channel, the Component converts them to data of type
/// OutData and sends it to the output channel. Sending blocks while the
/// output is full. The thread ends when the stop flag is raised or either
/// neighbour hangs up.
pub fn run_component<C: Component + Send + 'static>(
    mut component: Box<C>,
    input: Receiver<<C as Component>::InData>,
    output: SyncSender<<C as Component>::OutData>,
    stop: StopFlag,
) -> JoinHandle<()>
where
    <C as Component>::InData: Send + 'static,
    <C as Component>::OutData: Send + 'static,
{
    thread::spawn(move || {
        while !stop.is_stopped() {
            match input.recv_timeout(POLL_INTERVAL) {
                Ok(data) => {
                    let out_data = component.convert(data);
                    if let Err(error) = output.send(out_data) {
                        warn!("{} : received error {}.", component.to_string(), error);
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Err(component_error) = component.finalize() {
            warn!(
                "{} : error during terminating : {}.",
                component.to_string(),
                component_error
            );
        }
        info!("{} : terminated.", component.to_string());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    /// Null MockComponent for compilation testing
    struct MockComponent {}

    impl MockComponent {
        fn new() -> Self {
            Self {}
        }
    }

    impl Component for MockComponent {
        type InData = i32;
        type OutData = i32;

        fn convert(&mut self, input: i32) -> i32 {
            input + 1
        }

        fn finalize(&mut self) -> Result<(), FloorError> {
            Ok(())
        }
    }

    impl ToString for MockComponent {
        fn to_string(&self) -> String {
            "MockComponent".to_string()
        }
    }

    /// Checks that writing a value to the Component's input produces that
    /// value, converted, in the Component's output
    #[test]
    fn test_mock_component() {
        let (test_tx, block_rx) = sync_channel::<i32>(1);
        let (block_tx, test_rx) = sync_channel::<i32>(1);

        run_component(Box::new(MockComponent::new()), block_rx, block_tx, StopFlag::new());

        assert_eq!(test_tx.send(0), Ok(()));
        assert_eq!(test_rx.recv(), Ok(1));
    }

    #[test]
    fn test_chained_component() {
        let stop = StopFlag::new();
        let (test_tx, block_a_rx) = sync_channel::<i32>(1);
        let (block_a_tx, block_b_rx) = sync_channel::<i32>(1);
        let (block_b_tx, test_rx) = sync_channel::<i32>(1);

        run_component(Box::new(MockComponent::new()), block_a_rx, block_a_tx, stop.clone());
        run_component(Box::new(MockComponent::new()), block_b_rx, block_b_tx, stop);

        assert_eq!(test_tx.send(0), Ok(()));
        assert_eq!(test_rx.recv(), Ok(2));
    }

    #[test]
    fn stops_on_flag_and_hangup() {
        let stop = StopFlag::new();
        let (_test_tx, block_rx) = sync_channel::<i32>(1);
        let (block_tx, _test_rx) = sync_channel::<i32>(1);
        let handle = run_component(Box::new(MockComponent::new()), block_rx, block_tx, stop.clone());
        stop.stop();
        assert!(handle.join().is_ok());

        let (test_tx, block_rx) = sync_channel::<i32>(1);
        let (block_tx, _test_rx) = sync_channel::<i32>(1);
        let handle = run_component(Box::new(MockComponent::new()), block_rx, block_tx, StopFlag::new());
        drop(test_tx);
        assert!(handle.join().is_ok());
    }
}
