use std::process::Command;

fn main() {
    // Git hash for `citymap --version`
    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output();
    let git_hash = match output {
        Ok(o) if o.status.success() => {
            String::from_utf8(o.stdout).map(|s| s.trim().to_string()).unwrap_or_default()
        }
        _ => String::new(),
    };
    let git_hash = if git_hash.is_empty() { "unknown".to_string() } else { git_hash };
    println!("cargo:rustc-env=APP_GIT_HASH={}", git_hash);
    println!("cargo:rerun-if-changed=.git/HEAD");
}
