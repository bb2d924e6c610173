//! Suspend and hibernate sequencing against the kernel power interfaces.

use crate::alarm::WakeAlarm;
use crate::config::{SleepConfig, Verb};
use crate::error::SleepError;
use crate::hooks;
use crate::resume;
use crate::swap;
use crate::sysfs::{self, PowerFs};
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Message catalog id of the event emitted when a transition starts.
pub const MESSAGE_SLEEP_START: &str = "6bbd95ee977941e497c48be27c254128";
/// Message catalog id of the event emitted when a transition ends.
pub const MESSAGE_SLEEP_STOP: &str = "8811e6df2a8e40f58a94cea26f8ebf14";

/// Kernel interfaces and policy knobs one sleep cycle runs against.
///
/// Production code uses [`SleepEnv::system`]; tests point the paths at fake
/// trees and the alarm at an unprivileged clock.
pub struct SleepEnv {
    pub power: PowerFs,
    pub swaps: PathBuf,
    pub cmdline: PathBuf,
    pub hook_dirs: Vec<PathBuf>,
    pub hook_timeout: Duration,
    pub alarm_clock: libc::clockid_t,
}

impl SleepEnv {
    /// Environment of the running system.
    pub fn system() -> Self {
        Self {
            power: PowerFs::new(),
            swaps: PathBuf::from("/proc/swaps"),
            cmdline: PathBuf::from("/proc/cmdline"),
            hook_dirs: hooks::HOOK_DIRS.iter().map(PathBuf::from).collect(),
            hook_timeout: hooks::DEFAULT_TIMEOUT,
            alarm_clock: libc::CLOCK_BOOTTIME_ALARM,
        }
    }
}

/// Writes `candidates` in order through `write`, stopping at the first
/// success.
///
/// `recover` runs after every failed attempt to put `resource` back into a
/// writable condition before the next candidate; a recovery failure aborts
/// the whole sequence. When every candidate fails, the error of the last
/// one is returned, superseding earlier ones.
fn write_first_successful<R, E, W, C>(
    candidates: &[String],
    resource: &mut R,
    mut write: W,
    mut recover: C,
) -> Result<(), E>
where
    W: FnMut(&mut R, &str) -> Result<(), E>,
    C: FnMut(&mut R) -> Result<(), E>,
{
    let mut last_err = None;
    for candidate in candidates {
        match write(resource, candidate) {
            Ok(()) => return Ok(()),
            Err(err) => last_err = Some(err),
        }
        recover(resource)?;
    }
    match last_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Writes the first accepted hibernation mode to the disk mode control file.
fn write_mode(power: &PowerFs, modes: &[String]) -> Result<(), SleepError> {
    write_first_successful(
        modes,
        &mut (),
        |_, mode| {
            power.write_disk_mode(mode).map_err(|err| {
                debug!(mode, %err, "failed to write hibernation mode");
                SleepError::io("write", power.disk_path(), err)
            })
        },
        |_| Ok(()),
    )
}

/// Writes the first accepted power state to the already open state stream.
///
/// A failed write can leave the kernel side stream unusable, so the stream
/// is closed and reopened before the next candidate; reusing it would
/// silently drop subsequent writes. A failed reopen aborts immediately.
fn write_state(power: &PowerFs, stream: &mut File, states: &[String]) -> Result<(), SleepError> {
    write_first_successful(
        states,
        stream,
        |stream, state| {
            sysfs::write_token(stream, state).map_err(|err| {
                debug!(state, %err, "failed to write power state");
                SleepError::io("write", power.state_path(), err)
            })
        },
        |stream| {
            *stream = power
                .open_state()
                .map_err(|err| SleepError::io("open", power.state_path(), err))?;
            Ok(())
        },
    )
}

/// Runs one full sleep cycle.
///
/// The sequence is: open the state stream, configure the hibernation target
/// and mode if `modes` is non-empty, run the pre hooks, write the power
/// state (control returns here after the machine wakes), run the post hooks.
/// Hook failures never override the transition result.
pub fn execute(
    env: &SleepEnv,
    verb: Verb,
    modes: &[String],
    states: &[String],
) -> Result<(), SleepError> {
    // Opened first so that on failure we abort before modifying any state.
    let mut stream = env
        .power
        .open_state()
        .map_err(|err| SleepError::io("open", env.power.state_path(), err))?;

    // A non-empty mode list means some hibernation variant: the kernel needs
    // the resume target and the image mode before the transition.
    if !modes.is_empty() {
        let location = swap::find_hibernate_location(&env.swaps)?;
        resume::configure_hibernation_target(&env.power, &location, &env.cmdline)?;
        write_mode(&env.power, modes)?;
    }

    hooks::run_hooks(&env.hook_dirs, "pre", verb.as_str(), env.hook_timeout);

    info!(
        message_id = MESSAGE_SLEEP_START,
        sleep = verb.as_str(),
        "Suspending system..."
    );

    let result = write_state(&env.power, &mut stream, states);

    match &result {
        Ok(()) => info!(
            message_id = MESSAGE_SLEEP_STOP,
            sleep = verb.as_str(),
            "System resumed."
        ),
        Err(err) => error!(
            message_id = MESSAGE_SLEEP_STOP,
            sleep = verb.as_str(),
            %err,
            "Failed to suspend system. System resumed again."
        ),
    }

    hooks::run_hooks(&env.hook_dirs, "post", verb.as_str(), env.hook_timeout);

    result
}

/// Suspends, then hibernates if the configured delay elapsed while the
/// machine slept.
///
/// A hardware wake alarm is armed before suspending. On wake, a
/// non-blocking poll decides the race: no event means the machine woke for
/// another reason and the sequence ends without hibernating. If hibernation
/// fails the machine is suspended again rather than left awake; only
/// exhaustion of both paths is a failure.
pub fn execute_suspend_then_hibernate(
    env: &SleepEnv,
    cfg: &SleepConfig,
) -> Result<(), SleepError> {
    let verb = Verb::SuspendThenHibernate;

    let alarm = WakeAlarm::new(env.alarm_clock)
        .map_err(|err| SleepError::io("create", "wake-alarm timerfd", err))?;
    debug!(
        delay_sec = cfg.hibernate_delay.as_secs(),
        "arming wake alarm for hibernation"
    );
    alarm
        .arm(cfg.hibernate_delay)
        .map_err(|err| SleepError::io("arm", "wake-alarm timerfd", err))?;

    execute(env, verb, &cfg.suspend_modes, &cfg.suspend_states)?;

    // Awake again. Did the alarm fire while we slept, or did something else
    // wake the machine before the delay elapsed?
    let fired = alarm
        .fired()
        .map_err(|err| SleepError::io("poll", "wake-alarm timerfd", err))?;
    drop(alarm);
    if !fired {
        return Ok(());
    }

    debug!("wake alarm expired, attempting to hibernate");
    if let Err(err) = execute(env, verb, &cfg.hibernate_modes, &cfg.hibernate_states) {
        warn!(%err, "could not hibernate, trying to suspend again");
        execute(env, verb, &cfg.suspend_modes, &cfg.suspend_states).map_err(|err| {
            error!(%err, "could neither hibernate nor suspend again, giving up");
            err
        })?;
    }

    Ok(())
}
