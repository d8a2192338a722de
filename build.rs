//! Embeds the build metadata read by `src/version.rs`.

use vergen_gitcl::{Build, Emitter, Gitcl};

/// Set to skip git metadata, e.g. when building from a source tarball.
const SKIP_GIT: &str = "GENEXEC_SKIP_GIT_INFO";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-env-changed={SKIP_GIT}");

    let build = Build::builder().build_timestamp(true).build();
    let mut emitter = Emitter::default();
    emitter.add_instructions(&build)?;

    // Without git metadata `BuildInfo` reports "unknown" branch and sha.
    if std::env::var_os(SKIP_GIT).is_none() {
        let gitcl = Gitcl::builder().branch(true).sha(true).dirty(true).build();
        emitter.add_instructions(&gitcl)?;
    }

    emitter.emit()?;
    Ok(())
}
