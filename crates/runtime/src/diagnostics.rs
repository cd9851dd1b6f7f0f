//! Runtime diagnostics for production debugging
//!
//! Provides a SIGQUIT (kill -3) handler that dumps scheduler statistics to
//! stderr, similar to JVM thread dumps, without stopping the process.
//!
//! ## Usage
//!
//! ```bash
//! kill -3 <pid>
//! ```
//!
//! ## Signal Safety
//!
//! Signal handlers can only safely call async-signal-safe functions, and
//! dumping does I/O and takes locks. So the handler is a dedicated thread
//! that receives signals through signal-hook's iterator API and dumps from
//! ordinary thread context.

use crate::scheduler::{Scheduler, SchedulerStats};
use std::io::Write;
use std::sync::Once;

static SIGNAL_HANDLER_INIT: Once = Once::new();

/// Install the SIGQUIT handler for `scheduler`
///
/// Safe to call multiple times (idempotent); only the first scheduler passed
/// in is reported on.
pub fn install_signal_handler(scheduler: &Scheduler) {
    SIGNAL_HANDLER_INIT.call_once(|| {
        #[cfg(unix)]
        {
            use signal_hook::consts::SIGQUIT;
            use signal_hook::iterator::Signals;

            let mut signals = match Signals::new([SIGQUIT]) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("could not register SIGQUIT handler: {}", e);
                    return;
                }
            };

            let scheduler = scheduler.clone();
            let spawned = std::thread::Builder::new()
                .name("ual-diagnostics".to_string())
                .spawn(move || {
                    for sig in signals.forever() {
                        if sig == SIGQUIT {
                            dump_diagnostics(&scheduler);
                        }
                    }
                });
            if let Err(e) = spawned {
                tracing::warn!("could not start diagnostics thread: {}", e);
            }
        }

        #[cfg(not(unix))]
        {
            // No signals here; dump_diagnostics can still be called directly
            let _ = scheduler;
        }
    });
}

/// Dump scheduler diagnostics to stderr
pub fn dump_diagnostics(scheduler: &Scheduler) {
    let mut out = std::io::stderr().lock();
    let _ = write_report(&mut out, &scheduler.stats(), scheduler.task_faults().len());
}

fn write_report(
    out: &mut impl Write,
    stats: &SchedulerStats,
    unabsorbed_faults: usize,
) -> std::io::Result<()> {
    writeln!(out, "\n=== ual Runtime Diagnostics ===")?;
    writeln!(out, "Uptime: {:.3}s", stats.uptime.as_secs_f64())?;

    writeln!(out, "\n[Tasks]")?;
    writeln!(out, "  Queued:    {}", stats.pending)?;
    writeln!(out, "  Active:    {}", stats.active)?;
    writeln!(out, "  Spawned:   {} (total)", stats.spawned)?;
    writeln!(out, "  Completed: {} (total)", stats.completed)?;
    writeln!(out, "  Peak:      {} (high-water mark)", stats.peak)?;

    // spawned > completed + active means a task was lost outside run_task
    let expected_completed = stats.spawned.saturating_sub(stats.active as u64);
    if stats.completed < expected_completed {
        writeln!(
            out,
            "  WARNING: {} tasks unaccounted for",
            expected_completed - stats.completed
        )?;
    }

    writeln!(out, "\n[Faults]")?;
    writeln!(out, "  Task faults not yet absorbed: {}", unabsorbed_faults)?;

    writeln!(out, "\n=== End Diagnostics ===\n")
}
