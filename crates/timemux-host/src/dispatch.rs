use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use timemux::clock::CycleCounter;
use timemux::pit::TickSource;
use timemux::{FatalError, Notifier, TimeServer};

use crate::ticker::TickReceiver;

/// How often the dispatch thread checks for shutdown when no tick arrives.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Thread that plays the interrupt handler: one [`TimeServer::on_tick`] per received tick.
#[derive(Debug)]
pub struct Dispatcher {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<Result<u64, FatalError>>,
}

impl Dispatcher {
    pub fn spawn<C, T, N>(server: Arc<TimeServer<C, T, N>>, ticks: TickReceiver) -> io::Result<Self>
    where
        C: CycleCounter + 'static,
        T: TickSource + 'static,
        N: Notifier + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("timemux-dispatch".into())
                .spawn(move || dispatch_loop(&server, &ticks, &stop))?
        };
        Ok(Self { stop, thread })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stops the thread and returns how many ticks it handled, or the fatal error that ended it.
    pub fn shutdown(self) -> Result<u64, FatalError> {
        self.stop.store(true, Ordering::Release);
        match self.thread.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

fn dispatch_loop<C, T, N>(
    server: &TimeServer<C, T, N>,
    ticks: &TickReceiver,
    stop: &AtomicBool,
) -> Result<u64, FatalError>
where
    C: CycleCounter,
    T: TickSource,
    N: Notifier,
{
    let mut handled = 0u64;
    while !stop.load(Ordering::Acquire) {
        match ticks.recv_timeout(SHUTDOWN_POLL) {
            Ok(()) => {
                let report = server.on_tick()?;
                handled += 1;
                if report.fired > 0 {
                    tracing::trace!(now_ns = report.now_ns, fired = report.fired, "tick");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("tick source disconnected");
                break;
            }
        }
    }
    Ok(handled)
}
