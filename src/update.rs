use std::cmp::Ordering;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Stdio};
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::types::ShellError;

pub(crate) const REMOTE_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/splitshell/splitshell/main/splitshell_config.json";
pub(crate) const REMOTE_PAYLOAD_URL: &str =
    "https://raw.githubusercontent.com/splitshell/splitshell/main/splitshell";

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// The helper retries for roughly a minute, which covers the usual case of
/// the main process needing a moment after exit to release its own file.
pub(crate) const HELPER_MAX_ITERS: u32 = 600;
pub(crate) const HELPER_INTERVAL: Duration = Duration::from_millis(100);

/// Destination and staged paths for the two halves of an update bundle. The
/// staged files live beside their destinations with a `.tmp` suffix; their
/// co-presence is the entire "update pending" signal.
#[derive(Debug, Clone)]
pub(crate) struct InstallPaths {
    pub(crate) install_dir: PathBuf,
    pub(crate) program_name: String,
    pub(crate) config_name: String,
    pub(crate) code_dst: PathBuf,
    pub(crate) config_dst: PathBuf,
    pub(crate) code_tmp: PathBuf,
    pub(crate) config_tmp: PathBuf,
}

impl InstallPaths {
    pub(crate) fn new(install_dir: &Path, program_name: &str, config_name: &str) -> Self {
        InstallPaths {
            install_dir: install_dir.to_path_buf(),
            program_name: program_name.to_string(),
            config_name: config_name.to_string(),
            code_dst: install_dir.join(program_name),
            config_dst: install_dir.join(config_name),
            code_tmp: install_dir.join(format!("{program_name}.tmp")),
            config_tmp: install_dir.join(format!("{config_name}.tmp")),
        }
    }
}

/// All decimal digit runs of a version string, in order; `[0]` when the
/// string carries no digits at all.
pub(crate) fn version_tuple(version: &str) -> Vec<u64> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for c in version.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            parts.push(current.parse::<u64>().unwrap_or(u64::MAX));
            current.clear();
        }
    }
    if !current.is_empty() {
        parts.push(current.parse::<u64>().unwrap_or(u64::MAX));
    }
    if parts.is_empty() {
        parts.push(0);
    }
    parts
}

/// Numeric, component-wise comparison; the shorter tuple is zero-padded, so
/// "1.2" == "1.2.0" and a digit-free string equals "0.0.0".
pub(crate) fn compare_versions(a: &str, b: &str) -> Ordering {
    let ta = version_tuple(a);
    let tb = version_tuple(b);
    let len = ta.len().max(tb.len());
    for i in 0..len {
        let va = ta.get(i).copied().unwrap_or(0);
        let vb = tb.get(i).copied().unwrap_or(0);
        match va.cmp(&vb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn fetch_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(FETCH_TIMEOUT)
        .timeout_read(FETCH_TIMEOUT)
        .timeout_write(FETCH_TIMEOUT)
        .build()
}

pub(crate) struct UpdateCheck {
    pub(crate) remote_version: String,
    pub(crate) manifest: Value,
}

/// Fetch the remote manifest and extract its version. Pure read; the single
/// attempt and 15s timeout are the whole retry policy.
pub(crate) fn fetch_manifest(manifest_url: &str) -> Result<UpdateCheck, ShellError> {
    let agent = fetch_agent();
    let manifest: Value = match agent.get(manifest_url).call() {
        Ok(resp) => resp
            .into_json()
            .map_err(|err| ShellError::Network(format!("manifest parse failed: {err}")))?,
        Err(ureq::Error::Status(code, resp)) => {
            let text = resp.into_string().unwrap_or_default();
            return Err(ShellError::Network(format!(
                "manifest fetch failed: {code} {text}"
            )));
        }
        Err(err) => {
            return Err(ShellError::Network(format!("manifest fetch failed: {err}")));
        }
    };
    let remote_version = manifest
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("0.0.0")
        .to_string();
    Ok(UpdateCheck {
        remote_version,
        manifest,
    })
}

/// Download the code payload and serialize the manifest beside the
/// destinations as `.tmp` files. Both writes are attempted; a partial
/// result is left for the next launch's incomplete-bundle discard rather
/// than rolled back here. The payload is not checksummed before staging.
pub(crate) fn stage_update(
    payload_url: &str,
    manifest: &Value,
    paths: &InstallPaths,
) -> Result<(), ShellError> {
    let agent = fetch_agent();
    let resp = match agent.get(payload_url).call() {
        Ok(resp) => resp,
        Err(ureq::Error::Status(code, resp)) => {
            let text = resp.into_string().unwrap_or_default();
            return Err(ShellError::Network(format!(
                "payload download failed: {code} {text}"
            )));
        }
        Err(err) => {
            return Err(ShellError::Network(format!(
                "payload download failed: {err}"
            )));
        }
    };
    let mut payload = Vec::new();
    resp.into_reader()
        .read_to_end(&mut payload)
        .map_err(|err| ShellError::Network(format!("payload download failed: {err}")))?;
    write_bundle(&payload, manifest, paths)
}

/// Both staged writes are attempted even when the first fails; whatever
/// half landed is left for the next launch's incomplete-bundle discard.
pub(crate) fn write_bundle(
    payload: &[u8],
    manifest: &Value,
    paths: &InstallPaths,
) -> Result<(), ShellError> {
    let code = fs::write(&paths.code_tmp, payload);
    let config = serde_json::to_string_pretty(manifest)
        .map_err(ShellError::from)
        .and_then(|doc| Ok(fs::write(&paths.config_tmp, doc)?));
    code?;
    config
}

#[derive(Debug, PartialEq)]
pub(crate) enum ApplyOutcome {
    /// Neither staged file exists; continue startup untouched.
    NoBundle,
    /// Exactly one staged file existed; it was deleted. The user should run
    /// the update check again.
    DiscardedIncomplete,
    /// Both renames succeeded. The running process still carries the old
    /// code; the new pairing is active on the next launch.
    Applied,
    /// The code rename failed (file likely locked by this process). The
    /// caller spawns the helper and exits so the lock is released; the
    /// staged files stay in place.
    SwapDeferred,
}

/// One pass over the bundle: config first, then code, each attempted
/// independently and only while its staged file still exists. Old code
/// against new config is the safer partial state — config is additive,
/// while new code expects its paired schema.
pub(crate) fn try_swap(paths: &InstallPaths) -> bool {
    let mut ok = true;
    if paths.config_tmp.exists() && fs::rename(&paths.config_tmp, &paths.config_dst).is_err() {
        ok = false;
    }
    if paths.code_tmp.exists() && fs::rename(&paths.code_tmp, &paths.code_dst).is_err() {
        ok = false;
    }
    ok
}

/// The startup state machine. Runs first thing in the process, before the
/// config document loads, single-threaded, with no other component holding
/// file handles yet.
pub(crate) fn apply_pending_update(paths: &InstallPaths) -> ApplyOutcome {
    let has_code = paths.code_tmp.exists();
    let has_config = paths.config_tmp.exists();
    if !has_code && !has_config {
        return ApplyOutcome::NoBundle;
    }
    if has_code != has_config {
        // Either payload alone can produce an inconsistent program+config
        // pairing, so a half bundle is never applied.
        let _ = fs::remove_file(&paths.code_tmp);
        let _ = fs::remove_file(&paths.config_tmp);
        return ApplyOutcome::DiscardedIncomplete;
    }
    if try_swap(paths) {
        ApplyOutcome::Applied
    } else {
        ApplyOutcome::SwapDeferred
    }
}

/// The detached helper's retry loop. Communicates with the main process
/// only through the filesystem; each rename is an atomic OS operation, so
/// no further locking is needed. Returns whether a full pass completed
/// within the budget; leftover `.tmp` files are re-evaluated as a complete
/// bundle on the next launch.
pub(crate) fn helper_loop(paths: &InstallPaths, max_iters: u32, interval: Duration) -> bool {
    for _ in 0..max_iters {
        if try_swap(paths) {
            return true;
        }
        thread::sleep(interval);
    }
    false
}

/// Launch this executable as a detached `swap-helper` so the swap can finish
/// once the current process exits and releases its own file.
pub(crate) fn spawn_swap_helper(paths: &InstallPaths) -> Result<(), ShellError> {
    let exe =
        std::env::current_exe().map_err(|err| ShellError::HelperSpawn(err.to_string()))?;
    let mut cmd = ProcessCommand::new(exe);
    cmd.arg("swap-helper")
        .arg("--install-dir")
        .arg(&paths.install_dir)
        .arg("--program-name")
        .arg(&paths.program_name)
        .arg("--config-name")
        .arg(&paths.config_name)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    // Detach: the helper must not die with its parent.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd.spawn()
        .map_err(|err| ShellError::HelperSpawn(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_install(name: &str) -> InstallPaths {
        let dir = std::env::temp_dir().join(format!(
            "splitshell_update_{}_{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        InstallPaths::new(&dir, "splitshell", "splitshell_config.json")
    }

    #[test]
    fn version_compare_is_numeric_not_lexicographic() {
        assert_eq!(compare_versions("1.2.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("1.10.0", "1.2.0"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("v1.2-beta3", "1.2.3"), Ordering::Equal);
        assert_eq!(compare_versions("no digits here", "0.0.0"), Ordering::Equal);
    }

    #[test]
    fn version_compare_is_reflexive() {
        for v in ["0.0.0", "1.2.3", "10.0", "weird-v2"] {
            assert_eq!(compare_versions(v, v), Ordering::Equal);
        }
    }

    #[test]
    fn version_tuple_extracts_digit_runs() {
        assert_eq!(version_tuple("1.24.0-rc7"), vec![1, 24, 0, 7]);
        assert_eq!(version_tuple(""), vec![0]);
        assert_eq!(version_tuple("abc"), vec![0]);
    }

    #[test]
    fn bundle_write_attempts_config_after_code_failure() {
        let paths = temp_install("bundle_write");
        // A directory at the code staging path makes that write fail.
        fs::create_dir_all(&paths.code_tmp).unwrap();
        let manifest = serde_json::json!({"version": "9.9.9"});

        let err = write_bundle(b"new code", &manifest, &paths).unwrap_err();
        assert!(matches!(err, ShellError::Io(_)));
        let staged: Value =
            serde_json::from_str(&fs::read_to_string(&paths.config_tmp).unwrap()).unwrap();
        assert_eq!(staged["version"], "9.9.9");
        fs::remove_dir_all(&paths.install_dir).ok();
    }

    #[test]
    fn no_bundle_is_a_noop() {
        let paths = temp_install("noop");
        fs::write(&paths.code_dst, b"old code").unwrap();
        fs::write(&paths.config_dst, b"old config").unwrap();

        assert_eq!(apply_pending_update(&paths), ApplyOutcome::NoBundle);
        assert_eq!(fs::read(&paths.code_dst).unwrap(), b"old code");
        fs::remove_dir_all(&paths.install_dir).ok();
    }

    #[test]
    fn lone_staged_file_is_discarded_without_swapping() {
        for lone_code in [true, false] {
            let paths = temp_install(if lone_code { "lone_code" } else { "lone_config" });
            fs::write(&paths.code_dst, b"old code").unwrap();
            fs::write(&paths.config_dst, b"old config").unwrap();
            if lone_code {
                fs::write(&paths.code_tmp, b"new code").unwrap();
            } else {
                fs::write(&paths.config_tmp, b"new config").unwrap();
            }

            assert_eq!(apply_pending_update(&paths), ApplyOutcome::DiscardedIncomplete);
            assert!(!paths.code_tmp.exists());
            assert!(!paths.config_tmp.exists());
            assert_eq!(fs::read(&paths.code_dst).unwrap(), b"old code");
            assert_eq!(fs::read(&paths.config_dst).unwrap(), b"old config");
            fs::remove_dir_all(&paths.install_dir).ok();
        }
    }

    #[test]
    fn complete_bundle_swaps_both_destinations() {
        let paths = temp_install("complete");
        fs::write(&paths.code_dst, b"old code").unwrap();
        fs::write(&paths.config_dst, b"old config").unwrap();
        fs::write(&paths.code_tmp, b"new code").unwrap();
        fs::write(&paths.config_tmp, b"new config").unwrap();

        assert_eq!(apply_pending_update(&paths), ApplyOutcome::Applied);
        assert_eq!(fs::read(&paths.code_dst).unwrap(), b"new code");
        assert_eq!(fs::read(&paths.config_dst).unwrap(), b"new config");
        assert!(!paths.code_tmp.exists());
        assert!(!paths.config_tmp.exists());
        fs::remove_dir_all(&paths.install_dir).ok();
    }

    #[test]
    fn locked_code_destination_defers_and_helper_finishes() {
        let paths = temp_install("locked");
        // A non-empty directory at the code destination makes the rename
        // fail, standing in for a locked executable.
        fs::create_dir_all(paths.code_dst.join("block")).unwrap();
        fs::write(paths.code_dst.join("block").join("f"), b"x").unwrap();
        fs::write(&paths.config_dst, b"old config").unwrap();
        fs::write(&paths.code_tmp, b"new code").unwrap();
        fs::write(&paths.config_tmp, b"new config").unwrap();

        assert_eq!(apply_pending_update(&paths), ApplyOutcome::SwapDeferred);
        // Config already swapped, code still staged.
        assert_eq!(fs::read(&paths.config_dst).unwrap(), b"new config");
        assert!(paths.code_tmp.exists());
        assert!(!paths.config_tmp.exists());

        // Helper gives up within its budget while the lock holds...
        assert!(!helper_loop(&paths, 3, Duration::from_millis(1)));
        assert!(paths.code_tmp.exists());

        // ...and completes once the lock is released.
        fs::remove_dir_all(&paths.code_dst).unwrap();
        assert!(helper_loop(&paths, 10, Duration::from_millis(1)));
        assert_eq!(fs::read(&paths.code_dst).unwrap(), b"new code");
        assert!(!paths.code_tmp.exists());
        fs::remove_dir_all(&paths.install_dir).ok();
    }

    #[test]
    fn exhausted_helper_leaves_a_complete_bundle_for_next_launch() {
        let paths = temp_install("stale");
        fs::create_dir_all(paths.code_dst.join("block")).unwrap();
        fs::write(paths.code_dst.join("block").join("f"), b"x").unwrap();
        fs::write(&paths.config_dst, b"old config").unwrap();
        fs::write(&paths.code_tmp, b"new code").unwrap();
        fs::write(&paths.config_tmp, b"new config").unwrap();

        assert_eq!(apply_pending_update(&paths), ApplyOutcome::SwapDeferred);
        assert!(!helper_loop(&paths, 2, Duration::from_millis(1)));

        // Next launch: the lone code .tmp would be discarded as incomplete —
        // except a re-staged config .tmp restores a complete bundle, so the
        // retry is idempotent once the lock clears.
        fs::remove_dir_all(&paths.code_dst).unwrap();
        fs::write(&paths.config_tmp, b"new config").unwrap();
        assert_eq!(apply_pending_update(&paths), ApplyOutcome::Applied);
        assert_eq!(fs::read(&paths.code_dst).unwrap(), b"new code");
        fs::remove_dir_all(&paths.install_dir).ok();
    }
}
