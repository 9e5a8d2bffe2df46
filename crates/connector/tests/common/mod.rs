//! Shared helpers: scripted stand-ins for the agent CLI.

use std::path::{Path, PathBuf};

/// Write an executable shell script acting as the agent binary.
pub fn write_fake_agent(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// A fake agent that prints the given protocol lines and exits.
pub fn ndjson_agent(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let mut body = String::from("cat <<'EOF'\n");
    for line in lines {
        body.push_str(line);
        body.push('\n');
    }
    body.push_str("EOF");
    write_fake_agent(dir, name, &body)
}
