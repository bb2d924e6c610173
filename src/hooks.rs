//! Execution of the hook programs run before and after a transition.
//!
//! Hooks are best effort: a hook that fails to spawn, exits nonzero or
//! overruns the deadline is logged and otherwise ignored. The result of the
//! sleep transition never depends on hook results.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default hook directories, in masking order.
pub const HOOK_DIRS: [&str; 2] = [
    "/etc/sleepctl/system-sleep",
    "/usr/lib/sleepctl/system-sleep",
];

/// Default deadline for all hooks of one phase.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Runs every hook program with the arguments `[phase, verb]`.
///
/// Hooks from all directories are gathered first: a file name present in an
/// earlier directory masks the same name in later ones. All hooks of the
/// phase are spawned in parallel and waited for together, bounded by
/// `timeout`; a hook still running at the deadline is killed.
pub fn run_hooks(dirs: &[PathBuf], phase: &str, verb: &str, timeout: Duration) {
    let hooks = collect_hooks(dirs);
    if hooks.is_empty() {
        return;
    }

    let mut children: Vec<(PathBuf, Child)> = Vec::new();
    for hook in hooks {
        let spawned = Command::new(&hook)
            .arg(phase)
            .arg(verb)
            .stdin(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => children.push((hook, child)),
            Err(err) => debug!(hook = %hook.display(), %err, "failed to spawn hook"),
        }
    }

    let deadline = Instant::now() + timeout;
    for (hook, mut child) in children {
        reap(&hook, &mut child, deadline);
    }
}

/// Waits for one hook until `deadline`, killing it if it overruns.
fn reap(hook: &Path, child: &mut Child, deadline: Instant) {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    debug!(hook = %hook.display(), %status, "hook failed");
                }
                return;
            }
            Ok(None) if Instant::now() >= deadline => {
                warn!(hook = %hook.display(), "hook timed out, killing it");
                let _ = child.kill();
                let _ = child.wait();
                return;
            }
            Ok(None) => thread::sleep(Duration::from_millis(10)),
            Err(err) => {
                debug!(hook = %hook.display(), %err, "failed to wait for hook");
                return;
            }
        }
    }
}

/// Collects executable hooks sorted by file name, earlier directories
/// masking later ones. Missing directories are skipped.
fn collect_hooks(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut hooks: BTreeMap<OsString, PathBuf> = BTreeMap::new();
    for dir in dirs {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
                continue;
            }
            hooks.entry(entry.file_name()).or_insert_with(|| entry.path());
        }
    }
    hooks.into_values().collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::os::unix::fs::OpenOptionsExt;

    /// Writes an executable shell script appending `marker $1 $2` to `out`.
    fn write_hook(dir: &Path, name: &str, marker: &str, out: &Path) {
        let script = format!("#!/bin/sh\necho \"{marker} $1 $2\" >> {}\n", out.display());
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true).truncate(true).mode(0o755);
        use std::io::Write;
        let mut file = options.open(dir.join(name)).unwrap();
        file.write_all(script.as_bytes()).unwrap();
    }

    #[test]
    fn runs_hooks_with_phase_and_verb() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let hook_dir = dir.path().join("hooks");
        fs::create_dir(&hook_dir).unwrap();
        write_hook(&hook_dir, "10-first", "first", &out);

        run_hooks(&[hook_dir], "pre", "suspend", DEFAULT_TIMEOUT);

        assert_eq!(fs::read_to_string(&out).unwrap(), "first pre suspend\n");
    }

    #[test]
    fn earlier_directory_masks_later_one() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let etc = dir.path().join("etc");
        let lib = dir.path().join("lib");
        fs::create_dir(&etc).unwrap();
        fs::create_dir(&lib).unwrap();
        write_hook(&etc, "50-hook", "etc", &out);
        write_hook(&lib, "50-hook", "lib", &out);

        run_hooks(&[etc, lib], "post", "hibernate", DEFAULT_TIMEOUT);

        assert_eq!(fs::read_to_string(&out).unwrap(), "etc post hibernate\n");
    }

    #[test]
    fn non_executable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let hook_dir = dir.path().join("hooks");
        fs::create_dir(&hook_dir).unwrap();
        fs::write(hook_dir.join("README"), "not a hook").unwrap();

        assert!(collect_hooks(&[hook_dir]).is_empty());
    }

    #[test]
    fn missing_directories_are_skipped() {
        run_hooks(
            &[PathBuf::from("/nonexistent/system-sleep")],
            "pre",
            "suspend",
            DEFAULT_TIMEOUT,
        );
    }

    #[test]
    fn hook_overrunning_the_deadline_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let hook_dir = dir.path().join("hooks");
        fs::create_dir(&hook_dir).unwrap();
        // Sleeps far past the deadline, then would leave a marker. The
        // marker must never appear: the hook gets killed at the deadline.
        let script = format!("#!/bin/sh\nsleep 30\necho done >> {}\n", out.display());
        use std::io::Write;
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true).mode(0o755);
        let mut file = options.open(hook_dir.join("90-slow")).unwrap();
        file.write_all(script.as_bytes()).unwrap();
        drop(file);

        let start = Instant::now();
        run_hooks(&[hook_dir], "pre", "suspend", Duration::from_millis(200));

        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!out.exists());
    }

    #[test]
    fn failing_hooks_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let hook_dir = dir.path().join("hooks");
        fs::create_dir(&hook_dir).unwrap();
        let script = "#!/bin/sh\nexit 1\n";
        use std::io::Write;
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true).mode(0o755);
        let mut file = options.open(hook_dir.join("fail")).unwrap();
        file.write_all(script.as_bytes()).unwrap();
        drop(file);

        // Must not panic or propagate anything.
        run_hooks(&[hook_dir], "pre", "suspend", DEFAULT_TIMEOUT);
    }
}
