//! Per-host artifact directories: staged configs, diffs and fetched configs.
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Replace the contents of `dir` with one `<id>.<extension>` file per entry.
///
/// The directory is purged first so stale artifacts of hosts no longer in
/// scope never linger next to fresh ones. Each file ends with a newline.
/// Returns the number of files written.
///
/// # Errors
///
/// Returns an error if the directory cannot be recreated or a file cannot be
/// written.
pub fn write_configs_to_dir(
    configs: &BTreeMap<String, String>,
    dir: &Path,
    extension: &str,
) -> io::Result<usize> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)?;
    for (host_id, config) in configs {
        let path = dir.join(format!("{host_id}.{extension}"));
        fs::write(&path, format!("{config}\n"))?;
    }
    Ok(configs.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_file_per_host_with_trailing_newline() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("staged");
        let configs = BTreeMap::from([
            ("core0.lon".to_string(), "set system host-name core0".to_string()),
            ("edge0.par".to_string(), "set system host-name edge0".to_string()),
        ]);
        assert_eq!(write_configs_to_dir(&configs, &dir, "set").unwrap(), 2);
        assert_eq!(
            fs::read_to_string(dir.join("core0.lon.set")).unwrap(),
            "set system host-name core0\n"
        );
    }

    #[test]
    fn purges_stale_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("diffs");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("old.lon.diff.set"), "stale").unwrap();
        let configs = BTreeMap::from([("new.lon".to_string(), "+ x".to_string())]);
        write_configs_to_dir(&configs, &dir, "diff.set").unwrap();
        assert!(!dir.join("old.lon.diff.set").exists());
        assert!(dir.join("new.lon.diff.set").exists());
    }

    #[test]
    fn empty_map_leaves_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("active");
        assert_eq!(write_configs_to_dir(&BTreeMap::new(), &dir, "conf").unwrap(), 0);
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }
}
